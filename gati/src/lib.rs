//! Gati - navigation and motion control for a legged robot
//!
//! A fixed-rate control loop fuses camera object tracking, station markers
//! and proximity sensing into gait commands, while a separate vision thread
//! keeps inference off the control path.
//!
//! ## Threads
//!
//! - `control`: commands, sensors, arbitration and actuation every tick
//! - `vision` / `vision-infer`: capture, marker decode, object detection
//! - `cmd-listener` and `status-publisher` in the binary

pub mod config;
pub mod context;
pub mod core;
pub mod devices;
pub mod error;
pub mod localizer;
pub mod motion;
pub mod orchestrator;
pub mod routines;
pub mod sensors;
pub mod streaming;
pub mod transport;
pub mod vision;

// Re-export commonly used types
pub use config::GatiConfig;
pub use error::{Error, Result, SensorError};
pub use orchestrator::{CommandRecord, ControlLoop, LifecyclePhase};
