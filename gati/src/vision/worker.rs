//! Vision worker thread: capture, detect, decode markers, publish.

use super::{Camera, InferenceRunner, ObjectDetector, VisionNavigator};
use crate::config::GatiConfig;
use crate::core::slot::LatestSlot;
use crate::core::types::{Detection, NavigationIntent};
use crate::error::{Error, Result};
use crate::localizer::{self, MarkerDecoder, MarkerSource, StationMarker};
use crossbeam_channel::Receiver;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Consecutive capture failures before the worker gives up
const MAX_CAPTURE_FAILURES: u32 = 20;

/// Requests from the control loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisionControl {
    /// Drop the object lock (station navigation is taking over)
    ResetLock,
}

/// Result of one vision cycle, consumed at most once by the control loop
#[derive(Debug, Clone)]
pub struct VisionOutput {
    pub sequence: u64,
    pub detection: Option<Detection>,
    pub intent: NavigationIntent,
    pub marker: Option<StationMarker>,
    pub produced_at: Instant,
}

pub struct VisionWorker {
    camera: Box<dyn Camera>,
    runner: InferenceRunner,
    decoder: Box<dyn MarkerDecoder>,
    navigator: VisionNavigator,
    slot: Arc<LatestSlot<VisionOutput>>,
    control_rx: Receiver<VisionControl>,
    shutdown: Arc<AtomicBool>,
    interval: Duration,
    marker_prefix: String,
}

impl VisionWorker {
    /// Build the worker around an already opened camera
    pub fn new(
        camera: Box<dyn Camera>,
        detector: Box<dyn ObjectDetector>,
        decoder: Box<dyn MarkerDecoder>,
        config: &GatiConfig,
        slot: Arc<LatestSlot<VisionOutput>>,
        control_rx: Receiver<VisionControl>,
        shutdown: Arc<AtomicBool>,
    ) -> Result<Self> {
        let runner = InferenceRunner::spawn(detector, config.vision.inference_budget())?;
        Ok(Self {
            camera,
            runner,
            decoder,
            navigator: VisionNavigator::new(config.vision.clone()),
            slot,
            control_rx,
            shutdown,
            interval: config.vision.capture_interval(),
            marker_prefix: config.localizer.marker_prefix.clone(),
        })
    }

    /// Run until shutdown. Returns `Err` when the camera or the inference
    /// thread is lost; the control loop treats that as a fault.
    pub fn run(mut self) -> Result<()> {
        log::info!("Vision worker started ({:?} interval)", self.interval);
        let mut failures = 0u32;

        let result = loop {
            if self.shutdown.load(Ordering::Relaxed) {
                break Ok(());
            }
            let started = Instant::now();

            while let Ok(msg) = self.control_rx.try_recv() {
                match msg {
                    VisionControl::ResetLock => {
                        log::debug!("Vision lock reset");
                        self.navigator.reset_lock();
                    }
                }
            }

            match self.cycle() {
                Ok(output) => {
                    failures = 0;
                    self.slot.put(output);
                }
                Err(Error::Fault(reason)) => break Err(Error::Fault(reason)),
                Err(e) => {
                    failures += 1;
                    log::warn!("Vision cycle failed ({}/{}): {}", failures, MAX_CAPTURE_FAILURES, e);
                    if failures >= MAX_CAPTURE_FAILURES {
                        break Err(Error::Fault(format!("camera lost: {}", e)));
                    }
                }
            }

            let elapsed = started.elapsed();
            if elapsed < self.interval {
                std::thread::sleep(self.interval - elapsed);
            }
        };

        self.camera.close();
        match &result {
            Ok(()) => log::info!("Vision worker stopped"),
            Err(e) => log::error!("Vision worker failed: {}", e),
        }
        result
    }

    fn cycle(&mut self) -> Result<VisionOutput> {
        let frame = Arc::new(self.camera.capture()?);
        let marker = localizer::scan(
            MarkerSource::Frame(&frame, self.decoder.as_mut()),
            &self.marker_prefix,
        );
        let detection = self.runner.detect(Arc::clone(&frame))?;
        let now = Instant::now();
        let intent = self.navigator.update(detection.as_ref(), now);

        Ok(VisionOutput {
            sequence: frame.sequence,
            detection,
            intent,
            marker,
            produced_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{BoundingBox, Frame};
    use crossbeam_channel::bounded;
    use std::thread;

    struct CountingCamera {
        seq: u64,
        fail: bool,
    }

    impl Camera for CountingCamera {
        fn open(&mut self) -> Result<()> {
            Ok(())
        }
        fn capture(&mut self) -> Result<Frame> {
            if self.fail {
                return Err(Error::Io(std::io::Error::other("no frame")));
            }
            self.seq += 1;
            Ok(Frame::filled(320, 240, 0, self.seq))
        }
    }

    struct CenteredDetector;

    impl ObjectDetector for CenteredDetector {
        fn detect(&mut self, _frame: &Frame) -> Result<Option<Detection>> {
            Ok(Some(Detection::new(
                BoundingBox::new(100.0, 60.0, 220.0, 180.0),
                "target",
                0.9,
            )))
        }
    }

    struct DockDecoder;

    impl MarkerDecoder for DockDecoder {
        fn decode(&mut self, _frame: &Frame) -> Option<String> {
            Some("STN:dock".into())
        }
    }

    fn config() -> GatiConfig {
        let mut c = GatiConfig::default();
        c.vision.capture_interval_ms = 5;
        c
    }

    #[test]
    fn test_worker_publishes_output() {
        let slot = Arc::new(LatestSlot::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let (_tx, rx) = bounded(4);
        let worker = VisionWorker::new(
            Box::new(CountingCamera { seq: 0, fail: false }),
            Box::new(CenteredDetector),
            Box::new(DockDecoder),
            &config(),
            Arc::clone(&slot),
            rx,
            Arc::clone(&shutdown),
        )
        .unwrap();
        let handle = thread::spawn(move || worker.run());

        let deadline = Instant::now() + Duration::from_secs(2);
        let output = loop {
            if let Some(o) = slot.take() {
                break o;
            }
            assert!(Instant::now() < deadline, "no vision output");
            thread::sleep(Duration::from_millis(5));
        };
        assert_eq!(output.intent, NavigationIntent::Locked);
        assert_eq!(output.marker.map(|m| m.station_id), Some("dock".to_string()));

        shutdown.store(true, Ordering::Relaxed);
        assert!(handle.join().unwrap().is_ok());
    }

    #[test]
    fn test_worker_gives_up_on_dead_camera() {
        let slot = Arc::new(LatestSlot::new());
        let (_tx, rx) = bounded(4);
        let worker = VisionWorker::new(
            Box::new(CountingCamera { seq: 0, fail: true }),
            Box::new(CenteredDetector),
            Box::new(DockDecoder),
            &config(),
            Arc::clone(&slot),
            rx,
            Arc::new(AtomicBool::new(false)),
        )
        .unwrap();
        let result = thread::spawn(move || worker.run()).join().unwrap();
        assert!(matches!(result, Err(Error::Fault(_))));
        assert!(slot.is_empty());
    }
}
