//! Spectral analysis module for Reson
//!
//! Provides real-time pitch detection over fixed-size audio chunks,
//! whole-buffer dominant-frequency analysis, and mapping of frequencies
//! to equal-temperament note names.

mod detector;
mod notes;

pub use detector::{
    dominant_frequency, Detection, PitchDetector, Spectrum, DEFAULT_CHUNK_SIZE, DEFAULT_THRESHOLD,
};
pub use notes::{semitone_offset, Note, NoteTable};
