//! Ambient light adapter with linear calibration

use super::{AdapterCore, AdapterState, HealthReport, LightProbe, SampleWindow, Sensor};
use crate::config::LightConfig;
use crate::core::types::{SampleValue, SensorSample, SensorSource};
use crate::error::{Result, SensorError};

pub struct LightSensor {
    probe: Box<dyn LightProbe>,
    core: AdapterCore,
    window: SampleWindow,
    gain: f32,
    offset: f32,
    dark_threshold: f32,
}

impl LightSensor {
    pub fn new(probe: Box<dyn LightProbe>, config: &LightConfig) -> Self {
        Self {
            probe,
            core: AdapterCore::new(SensorSource::Light),
            window: SampleWindow::new(config.window),
            gain: config.gain,
            offset: config.offset,
            dark_threshold: config.dark_threshold,
        }
    }

    /// Smoothed calibrated level
    pub fn level(&self) -> Option<f32> {
        self.window.mean()
    }

    /// False until a reading exists
    pub fn is_dark(&self) -> bool {
        self.level().is_some_and(|l| l < self.dark_threshold)
    }

    fn calibrate(&self, raw: f32) -> f32 {
        raw * self.gain + self.offset
    }
}

impl Sensor for LightSensor {
    fn source(&self) -> SensorSource {
        SensorSource::Light
    }

    fn open(&mut self) -> Result<()> {
        let probe = &mut self.probe;
        self.core.open_with(|| probe.open())
    }

    fn sample(&mut self) -> std::result::Result<SensorSample, SensorError> {
        self.core.ensure_ready()?;
        let result = self.probe.read_raw().and_then(|raw| {
            if raw.is_finite() {
                Ok(raw)
            } else {
                Err(SensorError::OutOfRange(raw))
            }
        });
        let raw = self.core.record(result)?;
        let level = self.calibrate(raw);
        self.window.push(level);
        Ok(SensorSample::new(SensorSource::Light, SampleValue::Scalar(level)))
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
