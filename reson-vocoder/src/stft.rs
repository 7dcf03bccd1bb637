//! Short-Time Fourier Transform over whole buffers
//!
//! Framed Hann analysis producing positive-frequency bins per frame, and the
//! matching overlap-add resynthesis. The synthesis path applies the window a
//! second time and normalizes by the accumulated squared window, so any
//! frame-wise spectral edit between forward and inverse reconstructs cleanly.

use rustfft::{num_complex::Complex, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

/// Framed forward/inverse transform with a fixed window and hop
pub struct Stft {
    fft_size: usize,
    hop: usize,
    window: Vec<f32>,
    forward: Arc<dyn rustfft::Fft<f32>>,
    inverse: Arc<dyn rustfft::Fft<f32>>,
}

impl Stft {
    /// Create a transform for the given FFT size and hop (both non-zero).
    ///
    /// A Hann window with 75% overlap (hop = size / 4) sums to a constant
    /// across frames, which is what the resynthesis normalization expects.
    pub fn new(fft_size: usize, hop: usize) -> Self {
        debug_assert!(fft_size > 0 && hop > 0);
        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(fft_size);
        let inverse = planner.plan_fft_inverse(fft_size);

        // Periodic Hann
        let window = (0..fft_size)
            .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / fft_size as f32).cos()))
            .collect();

        Self {
            fft_size,
            hop,
            window,
            forward,
            inverse,
        }
    }

    #[inline]
    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    #[inline]
    pub fn hop(&self) -> usize {
        self.hop
    }

    /// Positive-frequency bin count per frame (fft_size / 2 + 1)
    #[inline]
    pub fn num_bins(&self) -> usize {
        self.fft_size / 2 + 1
    }

    /// Number of analysis frames a buffer of `len` samples produces
    pub fn num_frames(&self, len: usize) -> usize {
        if len == 0 {
            0
        } else if len <= self.fft_size {
            1
        } else {
            (len - self.fft_size) / self.hop + 1
        }
    }

    /// Analyze a buffer into frames of positive-frequency bins.
    ///
    /// The tail frame is zero-padded. An empty input produces no frames.
    pub fn forward(&self, samples: &[f32]) -> Vec<Vec<Complex<f32>>> {
        let n_frames = self.num_frames(samples.len());
        let bins = self.num_bins();
        let mut frames = Vec::with_capacity(n_frames);
        let mut buffer = vec![Complex::new(0.0, 0.0); self.fft_size];

        for frame in 0..n_frames {
            let start = frame * self.hop;
            for (i, buf) in buffer.iter_mut().enumerate() {
                let sample = samples.get(start + i).copied().unwrap_or(0.0);
                *buf = Complex::new(sample * self.window[i], 0.0);
            }
            self.forward.process(&mut buffer);
            frames.push(buffer[..bins].to_vec());
        }
        frames
    }

    /// Resynthesize a buffer from frames of positive-frequency bins.
    ///
    /// The full spectrum is rebuilt from the positive bins (the input is
    /// real, so the negative half is the conjugate mirror), inverse
    /// transformed, windowed again, and overlap-added. Each output sample is
    /// divided by the squared-window sum that covered it.
    pub fn inverse(&self, frames: &[Vec<Complex<f32>>]) -> Vec<f32> {
        if frames.is_empty() {
            return Vec::new();
        }

        let n = self.fft_size;
        let bins = self.num_bins();
        let out_len = (frames.len() - 1) * self.hop + n;
        let mut out = vec![0.0f32; out_len];
        let mut window_sums = vec![0.0f32; out_len];
        let mut buffer = vec![Complex::new(0.0, 0.0); n];
        let norm = 1.0 / n as f32;

        for (frame_idx, frame) in frames.iter().enumerate() {
            let start = frame_idx * self.hop;

            buffer[..bins].copy_from_slice(&frame[..bins]);
            for f in 1..bins - 1 {
                buffer[n - f] = frame[f].conj();
            }
            self.inverse.process(&mut buffer);

            for i in 0..n {
                let w = self.window[i];
                out[start + i] += buffer[i].re * norm * w;
                window_sums[start + i] += w * w;
            }
        }

        for (sample, &wsum) in out.iter_mut().zip(window_sums.iter()) {
            if wsum > 1e-8 {
                *sample /= wsum;
            }
        }
        out
    }
}
