//! Live audio capture for Reson
//!
//! Bridges a capture device to the pitch detector:
//! - ChunkSource: blocking pull of fixed-size mono i16 chunks
//! - MicSource / open_default_input: cpal-backed default microphone source
//! - CaptureSession: background analysis loop with an explicit
//!   Idle -> Capturing -> Idle lifecycle, publishing the latest detection

mod session;
mod source;

pub use session::CaptureSession;
pub use source::{open_default_input, CaptureError, ChunkSource, MicSource, StreamGuard};
