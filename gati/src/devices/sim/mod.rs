//! Simulated legged platform
//!
//! Runs the full control stack without hardware:
//!
//! | Component  | Simulation |
//! |------------|------------|
//! | Camera     | Bright square on a dark field, marker barcode on the last row |
//! | Detector   | Brightness blob segmentation |
//! | Ultrasonic | World distance + gaussian noise, random timeouts |
//! | Light, IMU | World values + noise |
//! | Actuator   | Command log with injectable failures |

mod actuator;
mod camera;
mod detector;
mod noise;
mod probes;
mod world;

pub use actuator::{SimActuator, SimActuatorHandle};
pub use camera::{BarcodeDecoder, SimCamera, encode_marker_row};
pub use detector::BlobDetector;
pub use noise::NoiseGenerator;
pub use probes::{SimImu, SimLightProbe, SimRangeFinder};
pub use world::{SimTarget, SimWorld};

use crate::config::GatiConfig;
use crate::context::HardwareContext;
use std::time::Duration;

/// Knobs into a running simulation
#[derive(Clone)]
pub struct SimHandles {
    pub world: SimWorld,
    pub actuator: SimActuatorHandle,
}

/// Fully simulated hardware context (no serial scanner attached)
pub fn build_context(config: &GatiConfig) -> (HardwareContext, SimHandles) {
    let sim = &config.sim;
    let world = SimWorld::new(sim);
    let (actuator, actuator_handle) = SimActuator::new(Duration::from_millis(sim.group_ms));

    let context = HardwareContext {
        camera: Box::new(SimCamera::new(
            world.clone(),
            config.vision.frame_width,
            config.vision.frame_height,
            sim.pixel_noise,
            NoiseGenerator::for_device(sim.seed, 1),
        )),
        detector: Box::new(BlobDetector::default()),
        marker_decoder: Box::new(BarcodeDecoder),
        range_finder: Box::new(SimRangeFinder::new(
            world.clone(),
            sim.range_noise_cm,
            sim.range_dropout,
            NoiseGenerator::for_device(sim.seed, 2),
        )),
        light: Some(Box::new(SimLightProbe::new(
            world.clone(),
            NoiseGenerator::for_device(sim.seed, 3),
        ))),
        imu: Some(Box::new(SimImu::new(
            world.clone(),
            NoiseGenerator::for_device(sim.seed, 4),
        ))),
        qr_transport: None,
        actuator: Box::new(actuator),
    };

    (
        context,
        SimHandles {
            world,
            actuator: actuator_handle,
        },
    )
}
