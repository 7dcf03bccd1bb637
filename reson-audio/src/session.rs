//! Capture session: the background read -> detect -> publish loop
//!
//! Lifecycle is an explicit state machine, Idle -> Capturing -> Idle. While
//! capturing, one worker thread owns the chunk source and the detector; the
//! only shared state is the latest detection, replaced wholesale under a
//! mutex so readers never observe a partial result.

use crate::source::{open_default_input, CaptureError, ChunkSource, StreamGuard};
use parking_lot::Mutex;
use reson_analysis::{Detection, PitchDetector};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::info;

/// A start/stoppable pitch-detection session over a live input.
///
/// `stop` signals the worker, releases the capture handle, joins the worker
/// before returning, and clears the published detection - so once it
/// returns, no read is in flight against a closed device and readers see
/// the idle placeholder again. Stopping an idle session is a no-op.
pub struct CaptureSession {
    running: Arc<AtomicBool>,
    latest: Arc<Mutex<Option<Detection>>>,
    active: Option<ActiveCapture>,
}

struct ActiveCapture {
    /// Keeps the device open while capturing; `None` for external sources
    guard: Option<StreamGuard>,
    worker: JoinHandle<()>,
}

impl CaptureSession {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            latest: Arc::new(Mutex::new(None)),
            active: None,
        }
    }

    /// Whether a capture loop is currently running
    #[inline]
    pub fn is_capturing(&self) -> bool {
        self.active.is_some()
    }

    /// Start capturing from the default input device, analyzing chunks of
    /// `chunk_size` samples.
    pub fn start(&mut self, chunk_size: usize) -> Result<(), CaptureError> {
        if self.active.is_some() {
            return Err(CaptureError::AlreadyCapturing);
        }
        let (guard, source) = open_default_input(chunk_size)?;
        let detector = PitchDetector::with_chunk_size(source.sample_rate(), chunk_size);
        self.spawn_worker(source, detector, Some(guard));
        Ok(())
    }

    /// Start capturing from a caller-supplied source.
    ///
    /// The source's lifetime is the worker's: it is dropped when the loop
    /// exits. The detector's chunk size should match what the source emits;
    /// mismatched chunks simply publish no detection.
    pub fn start_with_source<S>(
        &mut self,
        source: S,
        detector: PitchDetector,
    ) -> Result<(), CaptureError>
    where
        S: ChunkSource + 'static,
    {
        if self.active.is_some() {
            return Err(CaptureError::AlreadyCapturing);
        }
        self.spawn_worker(source, detector, None);
        Ok(())
    }

    fn spawn_worker<S>(&mut self, mut source: S, mut detector: PitchDetector, guard: Option<StreamGuard>)
    where
        S: ChunkSource + 'static,
    {
        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let latest = Arc::clone(&self.latest);

        let worker = thread::spawn(move || {
            while running.load(Ordering::SeqCst) {
                let chunk = match source.read_chunk() {
                    Ok(chunk) => chunk,
                    // The handle can close between the liveness check and
                    // this read; that ends the loop, it is not a failure
                    Err(_) => break,
                };
                *latest.lock() = detector.detect(&chunk);
            }
        });

        self.active = Some(ActiveCapture { guard, worker });
        info!("capture started");
    }

    /// Stop capturing. Idempotent; returns once the worker has exited.
    pub fn stop(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        self.running.store(false, Ordering::SeqCst);
        // Releasing the handle disconnects the source and unblocks any
        // in-flight read
        drop(active.guard);
        let _ = active.worker.join();
        *self.latest.lock() = None;
        info!("capture stopped");
    }

    /// The most recent detection, or `None` while idle / below the noise
    /// gate. Successive calls may observe different results as the worker
    /// replaces the slot.
    pub fn latest(&self) -> Option<Detection> {
        self.latest.lock().clone()
    }
}

impl Default for CaptureSession {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;
    use std::time::Duration;

    const SAMPLE_RATE: u32 = 44100;
    const CHUNK_SIZE: usize = 4096;

    /// Emits a fixed number of sine chunks, then reports a disconnect the
    /// way a closed device would
    struct SineSource {
        freq: f32,
        remaining: usize,
        position: usize,
    }

    impl SineSource {
        fn new(freq: f32, chunks: usize) -> Self {
            Self {
                freq,
                remaining: chunks,
                position: 0,
            }
        }
    }

    impl ChunkSource for SineSource {
        fn sample_rate(&self) -> u32 {
            SAMPLE_RATE
        }

        fn read_chunk(&mut self) -> Result<Vec<i16>, CaptureError> {
            if self.remaining == 0 {
                return Err(CaptureError::Disconnected);
            }
            self.remaining -= 1;
            let chunk = (0..CHUNK_SIZE)
                .map(|i| {
                    let t = (self.position + i) as f32 / SAMPLE_RATE as f32;
                    (10000.0 * (2.0 * PI * self.freq * t).sin()) as i16
                })
                .collect();
            self.position += CHUNK_SIZE;
            // Pace the loop a little so the session has time to observe
            // intermediate results
            thread::sleep(Duration::from_millis(1));
            Ok(chunk)
        }
    }

    fn wait_for_detection(session: &CaptureSession) -> Option<Detection> {
        for _ in 0..500 {
            if let Some(detection) = session.latest() {
                return Some(detection);
            }
            thread::sleep(Duration::from_millis(5));
        }
        None
    }

    #[test]
    fn test_session_publishes_detections() {
        let mut session = CaptureSession::new();
        let detector = PitchDetector::with_chunk_size(SAMPLE_RATE, CHUNK_SIZE);
        session
            .start_with_source(SineSource::new(440.0, 1000), detector)
            .unwrap();
        assert!(session.is_capturing());

        let detection = wait_for_detection(&session).expect("worker should publish");
        assert_eq!(detection.note, "A4");

        session.stop();
        assert!(!session.is_capturing());
        assert!(session.latest().is_none());
    }

    #[test]
    fn test_start_while_capturing_is_rejected() {
        let mut session = CaptureSession::new();
        let detector = PitchDetector::with_chunk_size(SAMPLE_RATE, CHUNK_SIZE);
        session
            .start_with_source(SineSource::new(440.0, 1000), detector)
            .unwrap();

        let second = PitchDetector::with_chunk_size(SAMPLE_RATE, CHUNK_SIZE);
        let result = session.start_with_source(SineSource::new(220.0, 10), second);
        assert!(matches!(result, Err(CaptureError::AlreadyCapturing)));

        session.stop();
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut session = CaptureSession::new();
        session.stop();

        let detector = PitchDetector::with_chunk_size(SAMPLE_RATE, CHUNK_SIZE);
        session
            .start_with_source(SineSource::new(440.0, 1000), detector)
            .unwrap();
        session.stop();
        session.stop();
        assert!(!session.is_capturing());
    }

    #[test]
    fn test_source_disconnect_ends_worker() {
        let mut session = CaptureSession::new();
        let detector = PitchDetector::with_chunk_size(SAMPLE_RATE, CHUNK_SIZE);
        // Source dries up after three chunks, like a device pulled mid-run
        session
            .start_with_source(SineSource::new(440.0, 3), detector)
            .unwrap();

        let detection = wait_for_detection(&session).expect("worker should publish");
        assert_eq!(detection.note, "A4");

        // stop() after the worker already exited must still clean up
        session.stop();
        assert!(session.latest().is_none());

        // And the session is restartable
        let detector = PitchDetector::with_chunk_size(SAMPLE_RATE, CHUNK_SIZE);
        session
            .start_with_source(SineSource::new(440.0, 3), detector)
            .unwrap();
        session.stop();
    }
}
