//! Sensor adapters
//!
//! Every adapter wraps a hardware probe behind the uniform [`Sensor`]
//! contract:
//!
//! ```text
//! Closed ──open() ok──► Ready ──release()──► Released
//!    │
//!    └──open() err──► Unavailable   (permanent; no hardware retries)
//! ```
//!
//! Per-sample failures are [`SensorError`]s. They are absorbed by the
//! smoothing window and counted in [`SensorHealth`]; they never escalate.

mod imu;
mod light;
mod qr_reader;
mod ring_buffer;
mod ultrasonic;
mod window;

pub use imu::ImuSensor;
pub use light::LightSensor;
pub use qr_reader::QrReader;
pub use ring_buffer::RingBuffer;
pub use ultrasonic::UltrasonicSensor;
pub use window::{SampleWindow, SensorHealth};

use crate::core::types::{SensorSample, SensorSource};
use crate::error::{Error, Result, SensorError};
use serde::{Deserialize, Serialize};

/// Default number of attempts tracked for health
pub const HEALTH_WINDOW: usize = 50;

/// Uniform sensor capability
pub trait Sensor: Send {
    fn source(&self) -> SensorSource;

    /// Open the underlying hardware. Failure is permanent for the process.
    fn open(&mut self) -> Result<()>;

    /// Take one reading
    fn sample(&mut self) -> std::result::Result<SensorSample, SensorError>;

    /// Release the hardware. Idempotent; safe even if never sampled.
    fn release(&mut self);

    fn state(&self) -> AdapterState;

    fn health(&self) -> HealthReport;

    fn name(&self) -> &'static str {
        self.source().name()
    }
}

/// Distance probe (ultrasonic ranger)
pub trait RangeFinder: Send {
    fn open(&mut self) -> Result<()>;
    fn read_cm(&mut self) -> std::result::Result<f32, SensorError>;
    fn close(&mut self) {}
}

/// Raw ambient light probe
pub trait LightProbe: Send {
    fn open(&mut self) -> Result<()>;
    fn read_raw(&mut self) -> std::result::Result<f32, SensorError>;
    fn close(&mut self) {}
}

/// Accelerometer (m/s^2) + gyroscope (rad/s) triples
pub trait InertialProbe: Send {
    fn open(&mut self) -> Result<()>;
    fn read(&mut self) -> std::result::Result<([f32; 3], [f32; 3]), SensorError>;
    fn close(&mut self) {}
}

/// Adapter lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterState {
    Closed,
    Ready,
    Unavailable,
    Released,
}

/// Health snapshot published in status messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub sensor: SensorSource,
    pub state: AdapterState,
    /// Successful samples over recent attempts, 1.0 when nothing attempted
    pub success_ratio: f32,
    pub total_errors: u64,
}

/// Bookkeeping shared by every adapter: lifecycle state and health.
#[derive(Debug)]
pub(crate) struct AdapterCore {
    source: SensorSource,
    state: AdapterState,
    health: SensorHealth,
}

impl AdapterCore {
    pub(crate) fn new(source: SensorSource) -> Self {
        Self {
            source,
            state: AdapterState::Closed,
            health: SensorHealth::new(HEALTH_WINDOW),
        }
    }

    /// Run the hardware open exactly once; later calls only report the
    /// recorded outcome.
    pub(crate) fn open_with(&mut self, open: impl FnOnce() -> Result<()>) -> Result<()> {
        match self.state {
            AdapterState::Ready => return Ok(()),
            AdapterState::Unavailable | AdapterState::Released => {
                return Err(Error::hardware_init(
                    self.source.name(),
                    "adapter is unavailable",
                ));
            }
            AdapterState::Closed => {}
        }
        match open() {
            Ok(()) => {
                self.state = AdapterState::Ready;
                log::info!("Sensor '{}' ready", self.source.name());
                Ok(())
            }
            Err(e) => {
                self.state = AdapterState::Unavailable;
                Err(Error::hardware_init(self.source.name(), e))
            }
        }
    }

    /// Fail fast unless the adapter is ready
    pub(crate) fn ensure_ready(&self) -> std::result::Result<(), SensorError> {
        if self.state == AdapterState::Ready {
            Ok(())
        } else {
            Err(SensorError::Unavailable)
        }
    }

    pub(crate) fn record<T>(
        &mut self,
        result: std::result::Result<T, SensorError>,
    ) -> std::result::Result<T, SensorError> {
        self.health.record(result.is_ok());
        if let Err(e) = &result {
            log::trace!("Sensor '{}' sample failed: {}", self.source.name(), e);
        }
        result
    }

    /// Mark released; returns true only on the first call
    pub(crate) fn release(&mut self) -> bool {
        let was_ready = self.state == AdapterState::Ready;
        if self.state != AdapterState::Unavailable {
            self.state = AdapterState::Released;
        }
        was_ready
    }

    pub(crate) fn state(&self) -> AdapterState {
        self.state
    }

    pub(crate) fn report(&self) -> HealthReport {
        HealthReport {
            sensor: self.source,
            state: self.state,
            success_ratio: self.health.ratio(),
            total_errors: self.health.total_errors(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_failure_is_permanent() {
        let mut core = AdapterCore::new(SensorSource::Light);
        let err = core
            .open_with(|| Err(Error::NotInitialized))
            .unwrap_err();
        assert!(matches!(err, Error::HardwareInit { .. }));
        assert_eq!(core.state(), AdapterState::Unavailable);

        let mut retried = false;
        assert!(
            core.open_with(|| {
                retried = true;
                Ok(())
            })
            .is_err()
        );
        assert!(!retried);
        assert_eq!(core.ensure_ready(), Err(SensorError::Unavailable));
    }

    #[test]
    fn test_release_idempotent() {
        let mut core = AdapterCore::new(SensorSource::Ultrasonic);
        core.open_with(|| Ok(())).unwrap();
        assert!(core.release());
        assert!(!core.release());
        assert_eq!(core.state(), AdapterState::Released);
    }

    #[test]
    fn test_record_counts_health() {
        let mut core = AdapterCore::new(SensorSource::Imu);
        let _ = core.record::<f32>(Ok(1.0));
        let _ = core.record::<f32>(Err(SensorError::Timeout));
        let report = core.report();
        assert_eq!(report.success_ratio, 0.5);
        assert_eq!(report.total_errors, 1);
    }
}
