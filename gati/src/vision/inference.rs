//! Time-boxed object detection on a dedicated thread.
//!
//! The model may be slower than the vision budget. Each `detect` call hands
//! the frame to the `vision-infer` thread and waits at most the budget; a
//! frame that misses it yields `None`, and its late result is discarded by
//! sequence number when it finally arrives.

use crate::core::types::{Detection, Frame};
use crate::error::{Error, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, bounded};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Object detection model
pub trait ObjectDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Option<Detection>>;
}

type InferenceResult = (u64, std::result::Result<Option<Detection>, String>);

pub struct InferenceRunner {
    request_tx: Option<Sender<Arc<Frame>>>,
    result_rx: Receiver<InferenceResult>,
    handle: Option<JoinHandle<()>>,
    budget: Duration,
    /// Sequence of a request still running on the inference thread
    in_flight: Option<u64>,
    late_results: u64,
}

impl InferenceRunner {
    pub fn spawn(mut detector: Box<dyn ObjectDetector>, budget: Duration) -> Result<Self> {
        let (request_tx, request_rx) = bounded::<Arc<Frame>>(1);
        let (result_tx, result_rx) = bounded::<InferenceResult>(4);

        let handle = thread::Builder::new()
            .name("vision-infer".to_string())
            .spawn(move || {
                while let Ok(frame) = request_rx.recv() {
                    let result = detector.detect(&frame).map_err(|e| e.to_string());
                    if result_tx.send((frame.sequence, result)).is_err() {
                        break;
                    }
                }
                log::debug!("Inference thread exiting");
            })?;

        Ok(Self {
            request_tx: Some(request_tx),
            result_rx,
            handle: Some(handle),
            budget,
            in_flight: None,
            late_results: 0,
        })
    }

    /// Detect within the budget. `Ok(None)` covers both "nothing found" and
    /// "model too slow"; `Err` means the inference thread is gone.
    pub fn detect(&mut self, frame: Arc<Frame>) -> Result<Option<Detection>> {
        self.drain_late()?;
        if let Some(seq) = self.in_flight {
            log::trace!("Frame {} skipped, inference of {} still running", frame.sequence, seq);
            return Ok(None);
        }

        let sequence = frame.sequence;
        let tx = self.request_tx.as_ref().ok_or_else(terminated)?;
        tx.send(frame).map_err(|_| terminated())?;
        self.in_flight = Some(sequence);

        let deadline = Instant::now() + self.budget;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.result_rx.recv_timeout(remaining) {
                Ok((seq, result)) if seq == sequence => {
                    self.in_flight = None;
                    return match result {
                        Ok(detection) => Ok(detection),
                        Err(e) => {
                            log::warn!("Detector failed on frame {}: {}", seq, e);
                            Ok(None)
                        }
                    };
                }
                Ok((seq, _)) => {
                    self.late_results += 1;
                    log::trace!("Discarding stale detection for frame {}", seq);
                }
                Err(RecvTimeoutError::Timeout) => {
                    log::debug!("Inference for frame {} exceeded budget", sequence);
                    return Ok(None);
                }
                Err(RecvTimeoutError::Disconnected) => return Err(terminated()),
            }
        }
    }

    /// Results that arrived after their frame's budget expired
    pub fn late_results(&self) -> u64 {
        self.late_results
    }

    fn drain_late(&mut self) -> Result<()> {
        loop {
            match self.result_rx.try_recv() {
                Ok((seq, _)) => {
                    if self.in_flight == Some(seq) {
                        self.in_flight = None;
                    }
                    self.late_results += 1;
                }
                Err(TryRecvError::Empty) => return Ok(()),
                Err(TryRecvError::Disconnected) => return Err(terminated()),
            }
        }
    }
}

fn terminated() -> Error {
    Error::Fault("inference thread terminated".to_string())
}

impl Drop for InferenceRunner {
    fn drop(&mut self) {
        // Closing the request channel ends the thread's loop
        self.request_tx.take();
        if let Some(handle) = self.handle.take() {
            if self.in_flight.is_some() {
                log::debug!("Detaching inference thread with a request in flight");
                return;
            }
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::BoundingBox;

    struct SlowDetector {
        delay: Duration,
    }

    impl ObjectDetector for SlowDetector {
        fn detect(&mut self, _frame: &Frame) -> Result<Option<Detection>> {
            thread::sleep(self.delay);
            Ok(Some(Detection::new(
                BoundingBox::new(0.0, 0.0, 10.0, 10.0),
                "box",
                0.9,
            )))
        }
    }

    struct FailingDetector;

    impl ObjectDetector for FailingDetector {
        fn detect(&mut self, _frame: &Frame) -> Result<Option<Detection>> {
            Err(Error::Fault("model error".into()))
        }
    }

    fn frame(seq: u64) -> Arc<Frame> {
        Arc::new(Frame::filled(8, 8, 0, seq))
    }

    #[test]
    fn test_fast_detector_returns_detection() {
        let mut runner = InferenceRunner::spawn(
            Box::new(SlowDetector {
                delay: Duration::ZERO,
            }),
            Duration::from_millis(500),
        )
        .unwrap();
        let d = runner.detect(frame(1)).unwrap();
        assert_eq!(d.map(|d| d.label), Some("box".to_string()));
    }

    #[test]
    fn test_budget_timeout_yields_none_and_drops_late_result() {
        let mut runner = InferenceRunner::spawn(
            Box::new(SlowDetector {
                delay: Duration::from_millis(80),
            }),
            Duration::from_millis(10),
        )
        .unwrap();
        assert!(runner.detect(frame(1)).unwrap().is_none());
        // Still running: the next frame is skipped rather than queued
        assert!(runner.detect(frame(2)).unwrap().is_none());

        thread::sleep(Duration::from_millis(150));
        // Late result for frame 1 is discarded; frame 3 gets a fresh run
        runner.budget = Duration::from_millis(500);
        let d = runner.detect(frame(3)).unwrap();
        assert!(d.is_some());
        assert_eq!(runner.late_results(), 1);
    }

    #[test]
    fn test_detector_error_is_no_detection() {
        let mut runner =
            InferenceRunner::spawn(Box::new(FailingDetector), Duration::from_millis(500)).unwrap();
        assert!(runner.detect(frame(1)).unwrap().is_none());
    }
}
