//! Windowed-FFT pitch detection
//!
//! One detector instance analyzes fixed-size chunks of mono 16-bit audio:
//! silence gate, Hann window, forward FFT, amplitude scaling to dB, peak
//! pick, and nearest-note mapping. The spectrum that accompanies each
//! detection is normalized to 0..1 for display.

use crate::notes::NoteTable;
use rustfft::{num_complex::Complex, FftPlanner};
use std::cmp::Ordering;
use std::f32::consts::PI;
use std::sync::Arc;
use tracing::trace;

/// Samples per analysis chunk (~93 ms at 44.1 kHz)
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Default noise gate, in full-scale i16 units.
///
/// Chunks whose peak amplitude stays below this are treated as silence and
/// produce no detection.
pub const DEFAULT_THRESHOLD: i16 = 700;

/// Floor for dB conversion, avoids log of zero on silent bins
const AMIN: f32 = 1e-10;

/// Positive-frequency spectrum of one analyzed chunk
#[derive(Debug, Clone)]
pub struct Spectrum {
    /// Bin center frequencies in Hz
    pub frequencies: Vec<f32>,
    /// Bin magnitudes normalized to 0.0 - 1.0
    pub magnitudes: Vec<f32>,
}

/// Result of analyzing one audio chunk
#[derive(Debug, Clone)]
pub struct Detection {
    /// Name of the nearest note, e.g. "A4"
    pub note: String,
    /// Detected fundamental frequency in Hz
    pub frequency: f32,
    /// Normalized spectrum for visualization
    pub spectrum: Spectrum,
}

/// Real-time pitch detector over fixed-size chunks
///
/// The FFT plan, window, and scratch buffer are allocated once at
/// construction; `detect` itself does no per-call allocation beyond the
/// returned spectrum.
pub struct PitchDetector {
    chunk_size: usize,
    sample_rate: u32,
    threshold: i16,
    table: NoteTable,
    fft: Arc<dyn rustfft::Fft<f32>>,
    window: Vec<f32>,
    window_rms: f32,
    /// Pre-allocated FFT buffer to avoid allocation in detect()
    fft_buffer: Vec<Complex<f32>>,
}

impl PitchDetector {
    /// Create a detector for the default chunk size
    pub fn new(sample_rate: u32) -> Self {
        Self::with_chunk_size(sample_rate, DEFAULT_CHUNK_SIZE)
    }

    /// Create a detector for a specific chunk size
    pub fn with_chunk_size(sample_rate: u32, chunk_size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(chunk_size);

        let window = hann(chunk_size);
        let window_rms = rms(&window);

        Self {
            chunk_size,
            sample_rate,
            threshold: DEFAULT_THRESHOLD,
            table: NoteTable::new(),
            fft,
            window,
            window_rms,
            fft_buffer: vec![Complex::new(0.0, 0.0); chunk_size],
        }
    }

    /// Expected chunk length in samples
    #[inline]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Sample rate the detector was configured for
    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Adjust the noise gate (full-scale i16 units)
    #[inline]
    pub fn set_threshold(&mut self, threshold: i16) {
        self.threshold = threshold;
    }

    /// Analyze one chunk of mono 16-bit audio.
    ///
    /// Returns `None` when the chunk is below the noise gate or its length
    /// does not match the configured chunk size (a misconfigured source is
    /// rejected here rather than crashing the analysis thread).
    pub fn detect(&mut self, chunk: &[i16]) -> Option<Detection> {
        if chunk.len() != self.chunk_size {
            return None;
        }

        let peak = chunk.iter().map(|s| (*s as i32).abs()).max().unwrap_or(0);
        if peak < self.threshold as i32 {
            return None;
        }

        // Window into the pre-allocated buffer and transform
        for (buf, (&s, &w)) in self
            .fft_buffer
            .iter_mut()
            .zip(chunk.iter().zip(self.window.iter()))
        {
            *buf = Complex::new(s as f32 * w, 0.0);
        }
        self.fft.process(&mut self.fft_buffer);

        let n = self.chunk_size;
        let bins = n / 2;
        let bin_width = self.sample_rate as f32 / n as f32;

        // Amplitude of the equivalent un-windowed sinusoid per bin, in dB
        let db: Vec<f32> = self.fft_buffer[..bins]
            .iter()
            .map(|c| {
                let amplitude = self.window_rms * 2.0 * c.norm() / n as f32;
                20.0 * amplitude.max(AMIN).log10()
            })
            .collect();

        let peak_bin = argmax(&db)?;
        let frequency = peak_bin as f32 * bin_width;
        let note = self.table.nearest(frequency).name.clone();

        trace!(frequency, note = %note, "detected pitch");

        let frequencies = (0..bins).map(|k| k as f32 * bin_width).collect();
        let magnitudes = normalize_unit(&db);

        Some(Detection {
            note,
            frequency,
            spectrum: Spectrum {
                frequencies,
                magnitudes,
            },
        })
    }
}

/// Dominant frequency of an entire buffer, via a single windowed FFT.
///
/// Unlike the chunked detector this accepts any buffer length; it is used to
/// name the note of a whole recording. The DC bin is excluded so a residual
/// offset cannot win the peak pick. Returns `None` for silent or degenerate
/// input.
pub fn dominant_frequency(samples: &[f32], sample_rate: u32) -> Option<f32> {
    let n = samples.len();
    if n < 4 {
        return None;
    }
    let peak = samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
    if peak < 1e-6 {
        return None;
    }

    let window = hann(n);
    let window_rms = rms(&window);

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(n);
    let mut buffer: Vec<Complex<f32>> = samples
        .iter()
        .zip(window.iter())
        .map(|(&s, &w)| Complex::new(s * w, 0.0))
        .collect();
    fft.process(&mut buffer);

    let bins = n / 2;
    let db: Vec<f32> = buffer[1..bins]
        .iter()
        .map(|c| {
            let amplitude = window_rms * 2.0 * c.norm() / n as f32;
            20.0 * amplitude.max(AMIN).log10()
        })
        .collect();

    let peak_bin = argmax(&db)? + 1;
    Some(peak_bin as f32 * sample_rate as f32 / n as f32)
}

/// Periodic Hann window of length `n`
fn hann(n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / n as f32).cos()))
        .collect()
}

fn rms(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    (values.iter().map(|v| v * v).sum::<f32>() / values.len() as f32).sqrt()
}

fn argmax(values: &[f32]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(Ordering::Equal))
        .map(|(i, _)| i)
}

/// Min-max normalize into 0..1; a flat input maps to all zeros
fn normalize_unit(values: &[f32]) -> Vec<f32> {
    let min = values.iter().copied().fold(f32::INFINITY, f32::min);
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;
    if range <= 0.0 {
        return vec![0.0; values.len()];
    }
    values.iter().map(|v| (v - min) / range).collect()
}
