//! Ultrasonic range adapter with moving-average obstacle detection

use super::{AdapterCore, AdapterState, HealthReport, RangeFinder, SampleWindow, Sensor};
use crate::config::UltrasonicConfig;
use crate::core::types::{SampleValue, SensorSample, SensorSource};
use crate::error::{Result, SensorError};

pub struct UltrasonicSensor {
    probe: Box<dyn RangeFinder>,
    core: AdapterCore,
    window: SampleWindow,
    min_cm: f32,
    max_cm: f32,
    stale_samples: u32,
    consecutive_failures: u32,
}

impl UltrasonicSensor {
    pub fn new(probe: Box<dyn RangeFinder>, config: &UltrasonicConfig) -> Self {
        Self {
            probe,
            core: AdapterCore::new(SensorSource::Ultrasonic),
            window: SampleWindow::new(config.window),
            min_cm: config.min_cm,
            max_cm: config.max_cm,
            stale_samples: config.stale_samples.max(1),
            consecutive_failures: 0,
        }
    }

    /// Moving average over the window. `None` before the first good reading
    /// and while the readings are stale.
    pub fn smoothed_cm(&self) -> Option<f32> {
        if self.is_stale() {
            return None;
        }
        self.window.mean()
    }

    /// Obstacle when the smoothed distance is below `threshold_cm`, or when
    /// the distance is no longer known
    pub fn is_obstacle(&self, threshold_cm: f32) -> bool {
        self.is_stale() || self.smoothed_cm().is_some_and(|d| d < threshold_cm)
    }

    /// A ready sensor whose last `stale_samples` reads all failed
    pub fn is_stale(&self) -> bool {
        self.core.state() == AdapterState::Ready
            && self.consecutive_failures >= self.stale_samples
    }

    fn read(&mut self) -> std::result::Result<f32, SensorError> {
        let cm = self.probe.read_cm()?;
        if !cm.is_finite() || cm < self.min_cm || cm > self.max_cm {
            return Err(SensorError::OutOfRange(cm));
        }
        Ok(cm)
    }
}

impl Sensor for UltrasonicSensor {
    fn source(&self) -> SensorSource {
        SensorSource::Ultrasonic
    }

    fn open(&mut self) -> Result<()> {
        let probe = &mut self.probe;
        self.core.open_with(|| probe.open())
    }

    fn sample(&mut self) -> std::result::Result<SensorSample, SensorError> {
        self.core.ensure_ready()?;
        let result = self.read();
        if result.is_err() {
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        }
        let cm = self.core.record(result)?;
        self.consecutive_failures = 0;
        self.window.push(cm);
        Ok(SensorSample::new(
            SensorSource::Ultrasonic,
            SampleValue::Scalar(cm),
        ))
    }

    fn release(&mut self) {
        if self.core.release() {
            self.probe.close();
            self.window.clear();
        }
    }

    fn state(&self) -> AdapterState {
        self.core.state()
    }

    fn health(&self) -> HealthReport {
        self.core.report()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use approx::assert_relative_eq;
    use std::collections::VecDeque;

    struct ScriptedRange {
        readings: VecDeque<std::result::Result<f32, SensorError>>,
        fail_open: bool,
        opens: usize,
    }

    impl ScriptedRange {
        fn new(readings: Vec<std::result::Result<f32, SensorError>>) -> Self {
            Self {
                readings: readings.into(),
                fail_open: false,
                opens: 0,
            }
        }
    }

    impl RangeFinder for ScriptedRange {
        fn open(&mut self) -> Result<()> {
            self.opens += 1;
            if self.fail_open {
                Err(Error::NotInitialized)
            } else {
                Ok(())
            }
        }

        fn read_cm(&mut self) -> std::result::Result<f32, SensorError> {
            self.readings.pop_front().unwrap_or(Err(SensorError::NoData))
        }
    }

    fn sensor(readings: Vec<std::result::Result<f32, SensorError>>) -> UltrasonicSensor {
        let mut s = UltrasonicSensor::new(
            Box::new(ScriptedRange::new(readings)),
            &UltrasonicConfig {
                window: 3,
                stale_samples: 3,
                ..Default::default()
            },
        );
        s.open().unwrap();
        s
    }

    #[test]
    fn test_smoothed_obstacle() {
        let mut s = sensor(vec![Ok(12.0), Ok(8.0), Ok(4.0)]);
        for _ in 0..3 {
            s.sample().unwrap();
        }
        assert_relative_eq!(s.smoothed_cm().unwrap(), 8.0);
        assert!(s.is_obstacle(10.0));
        assert!(!s.is_obstacle(8.0));
    }

    #[test]
    fn test_single_spike_absorbed() {
        let mut s = sensor(vec![Ok(100.0), Ok(100.0), Ok(3.0)]);
        for _ in 0..3 {
            s.sample().unwrap();
        }
        assert!(!s.is_obstacle(10.0));
    }

    #[test]
    fn test_out_of_range_rejected_and_counted() {
        let mut s = sensor(vec![Ok(50.0), Ok(900.0), Ok(0.5)]);
        assert!(s.sample().is_ok());
        assert_eq!(s.sample(), Err(SensorError::OutOfRange(900.0)));
        assert_eq!(s.sample(), Err(SensorError::OutOfRange(0.5)));
        assert_relative_eq!(s.smoothed_cm().unwrap(), 50.0);
        assert_eq!(s.health().total_errors, 2);
    }

    #[test]
    fn test_failing_reads_go_stale() {
        let mut s = sensor(vec![
            Ok(150.0),
            Err(SensorError::Timeout),
            Err(SensorError::Timeout),
            Err(SensorError::Timeout),
            Ok(140.0),
        ]);
        s.sample().unwrap();
        assert!(s.sample().is_err());
        assert!(s.sample().is_err());
        // Two misses are absorbed by the window
        assert!(!s.is_stale());
        assert_relative_eq!(s.smoothed_cm().unwrap(), 150.0);
        assert!(!s.is_obstacle(10.0));

        assert!(s.sample().is_err());
        assert!(s.is_stale());
        assert_eq!(s.smoothed_cm(), None);
        assert!(s.is_obstacle(10.0));

        s.sample().unwrap();
        assert!(!s.is_stale());
        assert!(!s.is_obstacle(10.0));
    }

    #[test]
    fn test_unavailable_after_failed_open() {
        let mut probe = ScriptedRange::new(vec![Ok(50.0)]);
        probe.fail_open = true;
        let mut s = UltrasonicSensor::new(Box::new(probe), &UltrasonicConfig::default());
        assert!(matches!(s.open(), Err(Error::HardwareInit { .. })));
        assert_eq!(s.sample(), Err(SensorError::Unavailable));
        assert_eq!(s.state(), AdapterState::Unavailable);
        assert!(!s.is_obstacle(10.0));
    }

    #[test]
    fn test_release_without_sampling() {
        let mut s = sensor(vec![]);
        s.release();
        s.release();
        assert_eq!(s.state(), AdapterState::Released);
        assert_eq!(s.sample(), Err(SensorError::Unavailable));
    }
}
