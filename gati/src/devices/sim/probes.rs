//! Simulated analog probes

use super::{NoiseGenerator, SimWorld};
use crate::error::{Error, Result, SensorError};
use crate::sensors::{InertialProbe, LightProbe, RangeFinder};

const GRAVITY: f32 = 9.81;

pub struct SimRangeFinder {
    world: SimWorld,
    noise: NoiseGenerator,
    stddev_cm: f32,
    dropout: f32,
}

impl SimRangeFinder {
    pub fn new(world: SimWorld, stddev_cm: f32, dropout: f32, noise: NoiseGenerator) -> Self {
        Self {
            world,
            noise,
            stddev_cm,
            dropout,
        }
    }
}

impl RangeFinder for SimRangeFinder {
    fn open(&mut self) -> Result<()> {
        if self.world.is_unavailable("ultrasonic") {
            return Err(Error::hardware_init("ultrasonic", "no echo on trigger"));
        }
        Ok(())
    }

    fn read_cm(&mut self) -> std::result::Result<f32, SensorError> {
        if self.world.range_failing() || self.noise.chance(self.dropout) {
            return Err(SensorError::Timeout);
        }
        Ok(self.world.obstacle_cm() + self.noise.gaussian(self.stddev_cm))
    }
}

pub struct SimLightProbe {
    world: SimWorld,
    noise: NoiseGenerator,
}

impl SimLightProbe {
    pub fn new(world: SimWorld, noise: NoiseGenerator) -> Self {
        Self { world, noise }
    }
}

impl LightProbe for SimLightProbe {
    fn open(&mut self) -> Result<()> {
        if self.world.is_unavailable("light") {
            return Err(Error::hardware_init("light", "ADC not responding"));
        }
        Ok(())
    }

    fn read_raw(&mut self) -> std::result::Result<f32, SensorError> {
        Ok((self.world.light_raw() + self.noise.gaussian(0.5)).max(0.0))
    }
}

/// Gravity tilted about the body x axis by the world's tilt angle
pub struct SimImu {
    world: SimWorld,
    noise: NoiseGenerator,
}

impl SimImu {
    pub fn new(world: SimWorld, noise: NoiseGenerator) -> Self {
        Self { world, noise }
    }
}

impl InertialProbe for SimImu {
    fn open(&mut self) -> Result<()> {
        if self.world.is_unavailable("imu") {
            return Err(Error::hardware_init("imu", "WHO_AM_I mismatch"));
        }
        Ok(())
    }

    fn read(&mut self) -> std::result::Result<([f32; 3], [f32; 3]), SensorError> {
        let tilt = self.world.tilt_deg().to_radians();
        let accel = [
            self.noise.gaussian(0.02),
            GRAVITY * tilt.sin() + self.noise.gaussian(0.02),
            GRAVITY * tilt.cos() + self.noise.gaussian(0.02),
        ];
        let gyro = [
            self.noise.gaussian(0.001),
            self.noise.gaussian(0.001),
            self.noise.gaussian(0.001),
        ];
        Ok((accel, gyro))
    }
}
