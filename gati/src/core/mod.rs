//! Core types and shared state primitives

pub mod slot;
pub mod state;
pub mod types;

pub use slot::LatestSlot;
pub use state::{MovementState, Pose2D, RobotMotionState};
pub use types::{
    BoundingBox, Detection, Frame, Heading, NavigationIntent, SampleValue, SensorSample,
    SensorSource, Station,
};
