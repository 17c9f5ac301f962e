//! Hardware handed to the control loop at construction

use crate::localizer::MarkerDecoder;
use crate::motion::Actuator;
use crate::sensors::{InertialProbe, LightProbe, RangeFinder};
use crate::transport::Transport;
use crate::vision::{Camera, ObjectDetector};

/// Every hardware capability the control loop drives. Nothing is opened
/// until [`ControlLoop::start`](crate::orchestrator::ControlLoop::start).
///
/// Optional probes that are absent are simply not sampled.
pub struct HardwareContext {
    pub camera: Box<dyn Camera>,
    pub detector: Box<dyn ObjectDetector>,
    pub marker_decoder: Box<dyn MarkerDecoder>,
    pub range_finder: Box<dyn RangeFinder>,
    pub light: Option<Box<dyn LightProbe>>,
    pub imu: Option<Box<dyn InertialProbe>>,
    pub qr_transport: Option<Box<dyn Transport>>,
    pub actuator: Box<dyn Actuator>,
}

impl HardwareContext {
    /// Attach a line-oriented serial scanner
    pub fn with_qr_transport(mut self, transport: Box<dyn Transport>) -> Self {
        self.qr_transport = Some(transport);
        self
    }
}
