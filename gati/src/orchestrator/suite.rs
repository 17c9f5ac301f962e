//! The adapters the control loop polls

use crate::config::GatiConfig;
use crate::context::HardwareContext;
use crate::localizer::MarkerDecoder;
use crate::motion::Actuator;
use crate::sensors::{
    HealthReport, ImuSensor, InertialProbe, LightProbe, LightSensor, QrReader, RangeFinder,
    Sensor, UltrasonicSensor,
};
use crate::transport::Transport;
use crate::vision::{Camera, ObjectDetector};

pub(crate) struct SensorSuite {
    pub ultrasonic: UltrasonicSensor,
    pub light: Option<LightSensor>,
    pub imu: Option<ImuSensor>,
    pub qr: Option<QrReader>,
}

impl SensorSuite {
    /// Wrap the context's probes; nothing is opened here
    pub fn from_context(
        range_finder: Box<dyn RangeFinder>,
        light: Option<Box<dyn LightProbe>>,
        imu: Option<Box<dyn InertialProbe>>,
        qr: Option<Box<dyn Transport>>,
        config: &GatiConfig,
    ) -> Self {
        let s = &config.sensors;
        Self {
            ultrasonic: UltrasonicSensor::new(range_finder, &s.ultrasonic),
            light: light.map(|p| LightSensor::new(p, &s.light)),
            imu: imu.map(|p| ImuSensor::new(p, &s.imu)),
            qr: qr.map(|t| QrReader::new(t, &s.qr_reader)),
        }
    }

    pub fn all_mut(&mut self) -> Vec<&mut dyn Sensor> {
        let mut all: Vec<&mut dyn Sensor> = vec![&mut self.ultrasonic];
        if let Some(s) = self.light.as_mut() {
            all.push(s);
        }
        if let Some(s) = self.imu.as_mut() {
            all.push(s);
        }
        if let Some(s) = self.qr.as_mut() {
            all.push(s);
        }
        all
    }

    pub fn health(&self) -> Vec<HealthReport> {
        let mut reports = vec![self.ultrasonic.health()];
        reports.extend(self.light.as_ref().map(|s| s.health()));
        reports.extend(self.imu.as_ref().map(|s| s.health()));
        reports.extend(self.qr.as_ref().map(|s| s.health()));
        reports
    }

    pub fn release_all(&mut self) {
        for sensor in self.all_mut() {
            sensor.release();
        }
    }
}

/// Camera-side capabilities waiting for `start()`
pub(crate) struct PendingHardware {
    pub camera: Box<dyn Camera>,
    pub detector: Box<dyn ObjectDetector>,
    pub marker_decoder: Box<dyn MarkerDecoder>,
    pub sensors: SensorSuite,
}

impl PendingHardware {
    /// Split a context; the actuator goes to the caller
    pub fn split(
        context: HardwareContext,
        config: &GatiConfig,
    ) -> (Self, Box<dyn Actuator>) {
        let HardwareContext {
            camera,
            detector,
            marker_decoder,
            range_finder,
            light,
            imu,
            qr_transport,
            actuator,
        } = context;
        (
            Self {
                camera,
                detector,
                marker_decoder,
                sensors: SensorSuite::from_context(range_finder, light, imu, qr_transport, config),
            },
            actuator,
        )
    }
}
