//! Duration-preserving pitch shift via phase-vocoder resynthesis
//!
//! The pitch ratio for a shift of `s` semitones is `2^(s/12)`. The shifter
//! stretches the analysis frame count by that ratio, rebuilds a coherent
//! phase track over the stretched timeline, resynthesizes, and declares the
//! result at `ratio` times the input rate - so the output plays at the new
//! pitch in the input's wall-clock duration.
//!
//! Phase continuity is the hard part: accumulating interpolated
//! frame-to-frame phase differences keeps sustained tones coherent, but
//! smears attacks. Each bin therefore watches its frame-to-frame magnitude
//! ratio and, on a sharp rise, snaps to the original unaccumulated phase
//! instead of the running sum.

use crate::stft::Stft;
use crate::waveform::Waveform;
use std::f32::consts::PI;
use thiserror::Error;
use tracing::debug;

const TWO_PI: f32 = 2.0 * PI;

/// Errors reported by [`PitchShifter::shift`]
#[derive(Error, Debug)]
pub enum ShiftError {
    #[error("input waveform is empty")]
    EmptyInput,
    #[error("shift of {semitones} semitones leaves no output frames")]
    EmptyOutput { semitones: f32 },
}

/// Offline pitch shifter
///
/// Stateless between calls; one instance may serve concurrent shifts of
/// independent waveforms from multiple threads.
#[derive(Debug, Clone)]
pub struct PitchShifter {
    /// Analysis window / FFT length in samples
    pub fft_size: usize,
    /// Magnitude-rise ratio above which a bin is treated as a transient
    /// onset and takes the original phase. Heuristic, tune to taste.
    pub transient_threshold: f32,
}

impl Default for PitchShifter {
    fn default() -> Self {
        Self {
            fft_size: 4096,
            transient_threshold: 0.5,
        }
    }
}

impl PitchShifter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shift `waveform` by `semitones` (fractional values allowed), keeping
    /// its duration.
    ///
    /// The returned waveform carries a sample rate scaled by the pitch
    /// ratio; played at that rate it lasts as long as the input, within one
    /// analysis frame of rounding.
    pub fn shift(&self, waveform: &Waveform, semitones: f32) -> Result<Waveform, ShiftError> {
        if waveform.is_empty() {
            return Err(ShiftError::EmptyInput);
        }

        let stft = Stft::new(self.fft_size, self.fft_size / 4);
        let frames = stft.forward(&waveform.samples);
        let num_frames = frames.len();
        let bins = stft.num_bins();

        let scaling = 2.0f32.powf(semitones / 12.0);
        let new_num_frames = (num_frames as f32 * scaling).floor() as usize;
        if new_num_frames == 0 {
            return Err(ShiftError::EmptyOutput { semitones });
        }

        debug!(
            semitones,
            scaling, num_frames, new_num_frames, "pitch shift"
        );

        // Magnitude and phase per frame, then wrapped frame-to-frame phase
        // differences (the first frame differenced against zero)
        let magnitude: Vec<Vec<f32>> = frames
            .iter()
            .map(|frame| frame.iter().map(|c| c.norm()).collect())
            .collect();
        let phase: Vec<Vec<f32>> = frames
            .iter()
            .map(|frame| frame.iter().map(|c| c.arg()).collect())
            .collect();
        let mut phase_diffs = Vec::with_capacity(num_frames);
        for t in 0..num_frames {
            let diff: Vec<f32> = (0..bins)
                .map(|f| {
                    let prev = if t == 0 { 0.0 } else { phase[t - 1][f] };
                    (phase[t][f] - prev).rem_euclid(TWO_PI)
                })
                .collect();
            phase_diffs.push(diff);
        }

        // Resample magnitude and phase differences onto the stretched
        // timeline; take the original absolute phase at the rounded frame
        let positions: Vec<f32> = (0..new_num_frames)
            .map(|t| (t as f32 / scaling).min(num_frames as f32 - 1.0))
            .collect();
        let new_magnitude = interpolate_frames(&magnitude, &positions);
        let new_phase_diffs = interpolate_frames(&phase_diffs, &positions);
        let unshifted_phase: Vec<&Vec<f32>> = positions
            .iter()
            .map(|&pos| {
                let idx = (pos.round() as usize).min(num_frames - 1);
                &phase[idx]
            })
            .collect();

        // Accumulate the output phase track frame by frame. The walk is
        // inherently sequential in time; only the per-bin work inside a
        // frame is independent.
        let mut new_phase = vec![vec![0.0f32; bins]; new_num_frames];
        new_phase[0].clone_from(&new_phase_diffs[0]);
        for t in 1..new_num_frames {
            for f in 0..bins {
                let accumulated = new_phase[t - 1][f] + new_phase_diffs[t][f];
                let total = new_magnitude[t][f] + new_magnitude[t - 1][f];
                // A silent bin pair has no onset to preserve
                let transient = if total > 0.0 {
                    (new_magnitude[t][f] - new_magnitude[t - 1][f]) / total
                } else {
                    0.0
                };
                let chosen = if transient >= self.transient_threshold {
                    unshifted_phase[t][f]
                } else {
                    accumulated
                };
                new_phase[t][f] = chosen.rem_euclid(TWO_PI);
            }
        }

        // Recombine and resynthesize with the same window
        let out_frames: Vec<Vec<rustfft::num_complex::Complex<f32>>> = (0..new_num_frames)
            .map(|t| {
                (0..bins)
                    .map(|f| {
                        rustfft::num_complex::Complex::from_polar(
                            new_magnitude[t][f],
                            new_phase[t][f],
                        )
                    })
                    .collect()
            })
            .collect();
        let samples = stft.inverse(&out_frames);

        let sample_rate = (waveform.sample_rate as f32 * scaling).round() as u32;
        Ok(Waveform::new(samples, sample_rate))
    }
}

/// Linearly interpolate frame rows at fractional positions along the time
/// axis. Positions past the last frame clamp to it.
fn interpolate_frames(frames: &[Vec<f32>], positions: &[f32]) -> Vec<Vec<f32>> {
    let last = frames.len() - 1;
    positions
        .iter()
        .map(|&pos| {
            let i0 = pos.floor() as usize;
            let i1 = (i0 + 1).min(last);
            let frac = pos - i0 as f32;
            frames[i0]
                .iter()
                .zip(frames[i1].iter())
                .map(|(&a, &b)| a * (1.0 - frac) + b * frac)
                .collect()
        })
        .collect()
}
