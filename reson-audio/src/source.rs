//! Capture sources: fixed-size chunk pull over a live input device
//!
//! The cpal callback pushes device buffers into an accumulator that emits
//! full chunks over a bounded channel; the session's worker thread pulls
//! them with a blocking read. Dropping the [`StreamGuard`] closes the
//! device, which surfaces on the pull side as a disconnect.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{bounded, Receiver, Sender};
use thiserror::Error;
use tracing::warn;

/// Errors from capture setup and the capture loop
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("no input device available")]
    NoDevice,
    #[error("no supported input configuration")]
    UnsupportedFormat,
    #[error("audio stream error: {0}")]
    Stream(String),
    #[error("capture is already running")]
    AlreadyCapturing,
    #[error("capture source disconnected")]
    Disconnected,
}

/// A blocking producer of fixed-size mono i16 chunks.
///
/// `read_chunk` blocks until a chunk is available and returns
/// [`CaptureError::Disconnected`] once the backing stream has gone away, so
/// a worker loop can treat a device closed mid-read as an ordinary exit.
pub trait ChunkSource: Send {
    /// Sample rate of the produced chunks in Hz
    fn sample_rate(&self) -> u32;

    /// Block until the next chunk of the configured size is available
    fn read_chunk(&mut self) -> Result<Vec<i16>, CaptureError>;
}

/// Owns the live cpal stream.
///
/// This is the capture handle: dropping it stops the callbacks and releases
/// the device. It is deliberately separate from [`MicSource`] because the
/// stream must stay on the thread that opened it while the receiving half
/// moves to the worker.
pub struct StreamGuard {
    _stream: cpal::Stream,
}

/// Receiving half of a microphone capture: yields fixed-size chunks
pub struct MicSource {
    rx: Receiver<Vec<i16>>,
    sample_rate: u32,
}

impl ChunkSource for MicSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read_chunk(&mut self) -> Result<Vec<i16>, CaptureError> {
        self.rx.recv().map_err(|_| CaptureError::Disconnected)
    }
}

/// Accumulates interleaved device buffers into mono chunks of a fixed size
struct ChunkAccumulator {
    buf: Vec<i16>,
    chunk_size: usize,
    channels: usize,
    tx: Sender<Vec<i16>>,
}

impl ChunkAccumulator {
    fn new(chunk_size: usize, channels: usize, tx: Sender<Vec<i16>>) -> Self {
        Self {
            buf: Vec::with_capacity(chunk_size),
            chunk_size,
            channels,
            tx,
        }
    }

    fn push(&mut self, sample: i16) {
        self.buf.push(sample);
        if self.buf.len() == self.chunk_size {
            let chunk = std::mem::replace(&mut self.buf, Vec::with_capacity(self.chunk_size));
            // Consumer lagging: drop the chunk rather than block the callback
            let _ = self.tx.try_send(chunk);
        }
    }

    fn push_i16(&mut self, data: &[i16]) {
        for frame in data.chunks(self.channels) {
            self.push(frame[0]);
        }
    }

    fn push_f32(&mut self, data: &[f32]) {
        for frame in data.chunks(self.channels) {
            self.push((frame[0].clamp(-1.0, 1.0) * i16::MAX as f32) as i16);
        }
    }
}

/// Open the default input device and start streaming chunks of
/// `chunk_size` mono samples.
///
/// Returns the stream guard (keep it alive for as long as capture should
/// run) and the source to hand to a worker. Multi-channel devices are
/// reduced to mono by taking the first channel.
pub fn open_default_input(chunk_size: usize) -> Result<(StreamGuard, MicSource), CaptureError> {
    let host = cpal::default_host();
    let device = host.default_input_device().ok_or(CaptureError::NoDevice)?;
    let config = device
        .default_input_config()
        .map_err(|_| CaptureError::UnsupportedFormat)?;

    let sample_rate = config.sample_rate().0;
    let channels = config.channels() as usize;

    // A few chunks of headroom; at 4096 samples that is ~3/4 s of audio
    let (tx, rx) = bounded(8);
    let err_fn = |err| warn!("audio stream error: {err}");

    let stream = match config.sample_format() {
        cpal::SampleFormat::I16 => {
            let mut acc = ChunkAccumulator::new(chunk_size, channels, tx);
            device.build_input_stream(
                &config.into(),
                move |data: &[i16], _: &cpal::InputCallbackInfo| acc.push_i16(data),
                err_fn,
                None,
            )
        }
        cpal::SampleFormat::F32 => {
            let mut acc = ChunkAccumulator::new(chunk_size, channels, tx);
            device.build_input_stream(
                &config.into(),
                move |data: &[f32], _: &cpal::InputCallbackInfo| acc.push_f32(data),
                err_fn,
                None,
            )
        }
        _ => return Err(CaptureError::UnsupportedFormat),
    }
    .map_err(|e| CaptureError::Stream(e.to_string()))?;

    stream.play().map_err(|e| CaptureError::Stream(e.to_string()))?;

    Ok((
        StreamGuard { _stream: stream },
        MicSource { rx, sample_rate },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulator_emits_fixed_chunks() {
        let (tx, rx) = bounded(8);
        let mut acc = ChunkAccumulator::new(4, 1, tx);

        acc.push_i16(&[1, 2, 3]);
        assert!(rx.try_recv().is_err());

        acc.push_i16(&[4, 5]);
        assert_eq!(rx.try_recv().unwrap(), vec![1, 2, 3, 4]);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_accumulator_takes_first_channel() {
        let (tx, rx) = bounded(8);
        let mut acc = ChunkAccumulator::new(2, 2, tx);

        // Interleaved stereo: left 10/30, right 20/40
        acc.push_i16(&[10, 20, 30, 40]);
        assert_eq!(rx.try_recv().unwrap(), vec![10, 30]);
    }

    #[test]
    fn test_accumulator_converts_f32() {
        let (tx, rx) = bounded(8);
        let mut acc = ChunkAccumulator::new(2, 1, tx);

        acc.push_f32(&[1.0, -1.0]);
        let chunk = rx.try_recv().unwrap();
        assert_eq!(chunk[0], i16::MAX);
        assert_eq!(chunk[1], -i16::MAX);
    }

    #[test]
    fn test_accumulator_drops_when_full() {
        let (tx, rx) = bounded(1);
        let mut acc = ChunkAccumulator::new(1, 1, tx);

        acc.push_i16(&[1, 2, 3]);
        // Only the first chunk fit; the rest were dropped, not queued
        assert_eq!(rx.try_recv().unwrap(), vec![1]);
        assert!(rx.try_recv().is_err());
    }
}
