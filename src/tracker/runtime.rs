//! Inference worker runtime.
//!
//! The host pushes pixel frames from its capture thread; a dedicated
//! worker polls for the newest frame, runs the inference engine on it
//! and hands the resulting detections back through a latest-value slot.
//! Neither side ever blocks on the other.

use std::thread;
use std::time::Duration;

use log::{debug, warn};

use crate::entity::Detection;
use crate::tracker::handoff::Handoff;

/// Worker sleep between polls when no new frame is waiting
const POLL_INTERVAL: Duration = Duration::from_millis(2);

/// One captured image handed to the inference engine.
#[derive(Debug, Clone, Default)]
pub struct PixelFrame {
    pub width: u32,
    pub height: u32,
    /// Interleaved RGB bytes, `width * height * 3`
    pub data: Vec<u8>,
    /// Capture time in microseconds on the host's clock
    pub timestamp_micros: i64,
}

/// All detections produced from one pixel frame.
#[derive(Debug, Clone, Default)]
pub struct DetectionSet {
    pub hands: Vec<Detection>,
    pub faces: Vec<Detection>,
    pub poses: Vec<Detection>,
    /// Timestamp of the source pixel frame
    pub timestamp_micros: i64,
}

/// A detector that turns pixel frames into unidentified detections.
///
/// Implementations wrap whatever inference backend the host uses; the
/// runtime only sees this trait.
pub trait InferenceEngine: Send + 'static {
    fn detect(&mut self, frame: &PixelFrame) -> DetectionSet;
}

impl<F> InferenceEngine for F
where
    F: FnMut(&PixelFrame) -> DetectionSet + Send + 'static,
{
    fn detect(&mut self, frame: &PixelFrame) -> DetectionSet {
        self(frame)
    }
}

/// Owns the worker thread and the two handoff slots.
pub struct Runtime {
    pixels: Handoff<PixelFrame>,
    results: Handoff<DetectionSet>,
    worker: Option<thread::JoinHandle<()>>,
}

impl Runtime {
    /// Spawn the worker around the given engine.
    pub fn spawn<E: InferenceEngine>(mut engine: E) -> Self {
        let pixels: Handoff<PixelFrame> = Handoff::new();
        let results: Handoff<DetectionSet> = Handoff::new();
        let worker_pixels = pixels.clone();
        let worker_results = results.clone();
        let worker = thread::Builder::new()
            .name("limbtrack-infer".into())
            .spawn(move || {
                debug!("inference worker started");
                loop {
                    if worker_pixels.is_exiting() {
                        break;
                    }
                    if let Some(frame) = worker_pixels.take() {
                        // the guard keeps shutdown waiting while the
                        // engine runs
                        if let Some(guard) = worker_results.begin() {
                            let mut set = engine.detect(&frame);
                            set.timestamp_micros = frame.timestamp_micros;
                            guard.publish(set);
                        }
                    } else {
                        thread::sleep(POLL_INTERVAL);
                    }
                }
                debug!("inference worker stopped");
            })
            .ok();
        if worker.is_none() {
            warn!("failed to spawn inference worker");
        }
        Self {
            pixels,
            results,
            worker,
        }
    }

    /// Submit the newest captured frame. An unprocessed previous frame
    /// is silently replaced; frames too small or with the wrong byte
    /// count are rejected before they reach the engine.
    pub fn submit(&self, frame: PixelFrame) {
        if frame.width < 10 || frame.height < 10 {
            warn!("ignoring {}x{} pixel frame", frame.width, frame.height);
            return;
        }
        if frame.data.len() != (frame.width * frame.height * 3) as usize {
            warn!(
                "pixel frame byte count {} does not match {}x{} rgb",
                frame.data.len(),
                frame.width,
                frame.height
            );
            return;
        }
        if !self.pixels.is_exiting() {
            self.pixels.publish(frame);
        }
    }

    /// Newest finished detection set, if the worker produced one since
    /// the last poll.
    pub fn poll(&self) -> Option<DetectionSet> {
        self.results.take()
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some() && !self.pixels.is_exiting()
    }

    /// Stop accepting frames, wait for the in-flight inference to
    /// finish and join the worker.
    pub fn shutdown(&mut self) {
        self.pixels.shutdown();
        self.results.shutdown();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("inference worker panicked");
            }
        }
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.shutdown();
    }
}
