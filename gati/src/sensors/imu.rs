//! Inertial adapter: smoothed gravity vector and tilt

use super::{AdapterCore, AdapterState, HealthReport, InertialProbe, SampleWindow, Sensor};
use crate::config::ImuConfig;
use crate::core::types::{SampleValue, SensorSample, SensorSource};
use crate::error::{Result, SensorError};

pub struct ImuSensor {
    probe: Box<dyn InertialProbe>,
    core: AdapterCore,
    accel: [SampleWindow; 3],
}

impl ImuSensor {
    pub fn new(probe: Box<dyn InertialProbe>, config: &ImuConfig) -> Self {
        Self {
            probe,
            core: AdapterCore::new(SensorSource::Imu),
            accel: std::array::from_fn(|_| SampleWindow::new(config.window)),
        }
    }

    /// Angle between the smoothed gravity vector and the body z axis
    pub fn tilt_degrees(&self) -> Option<f32> {
        let [x, y, z] = [
            self.accel[0].mean()?,
            self.accel[1].mean()?,
            self.accel[2].mean()?,
        ];
        let norm = (x * x + y * y + z * z).sqrt();
        if norm < f32::EPSILON {
            return None;
        }
        Some((z / norm).clamp(-1.0, 1.0).acos().to_degrees())
    }
}

impl Sensor for ImuSensor {
    fn source(&self) -> SensorSource {
        SensorSource::Imu
    }

    fn open(&mut self) -> Result<()> {
        let probe = &mut self.probe;
        self.core.open_with(|| probe.open())
    }

    fn sample(&mut self) -> std::result::Result<SensorSample, SensorError> {
        self.core.ensure_ready()?;
        let result = self.probe.read();
        let (accel, gyro) = self.core.record(result)?;
        for (window, v) in self.accel.iter_mut().zip(accel) {
            window.push(v);
        }
        Ok(SensorSample::new(
            SensorSource::Imu,
            SampleValue::Inertial { accel, gyro },
        ))
    }

    fn release(&mut self) {
        if self.core.release() {
            self.probe.close();
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
    use approx::assert_relative_eq;

    struct TiltedImu {
        deg: f32,
    }

    impl InertialProbe for TiltedImu {
        fn open(&mut self) -> Result<()> {
            Ok(())
        }
        fn read(&mut self) -> std::result::Result<([f32; 3], [f32; 3]), SensorError> {
            let r = self.deg.to_radians();
            Ok(([0.0, 9.81 * r.sin(), 9.81 * r.cos()], [0.0; 3]))
        }
    }

    #[test]
    fn test_level_robot_has_no_tilt() {
        let mut imu = ImuSensor::new(Box::new(TiltedImu { deg: 0.0 }), &ImuConfig::default());
        imu.open().unwrap();
        assert_eq!(imu.tilt_degrees(), None);
        imu.sample().unwrap();
        assert_relative_eq!(imu.tilt_degrees().unwrap(), 0.0, epsilon = 0.05);
    }

    #[test]
    fn test_tilt_measured() {
        let mut imu = ImuSensor::new(Box::new(TiltedImu { deg: 40.0 }), &ImuConfig::default());
        imu.open().unwrap();
        for _ in 0..5 {
            imu.sample().unwrap();
        }
        assert_relative_eq!(imu.tilt_degrees().unwrap(), 40.0, epsilon = 0.05);
    }
}
