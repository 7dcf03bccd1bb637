//! Phase-vocoder pitch shifting for Reson
//!
//! This module provides the offline resynthesis pipeline:
//! - Waveform: owned mono samples plus their sample rate
//! - Stft: framed Hann analysis and overlap-add resynthesis
//! - PitchShifter: duration-preserving pitch shift by a semitone offset
//!
//! The shifter works by stretching the STFT frame count by the pitch ratio
//! and declaring the output at a proportionally higher (or lower) sample
//! rate, so the shifted audio plays back in the input's wall-clock duration.

mod shifter;
mod stft;
mod waveform;

pub use shifter::{PitchShifter, ShiftError};
pub use stft::Stft;
pub use waveform::Waveform;
