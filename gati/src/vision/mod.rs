//! Vision navigation unit
//!
//! Turns camera frames into [`NavigationIntent`]s:
//!
//! ```text
//! Camera ─► InferenceRunner (vision-infer thread, time-boxed)
//!        └► MarkerDecoder ─────────────┐
//! Detection ─► VisionNavigator ─► VisionOutput ─► LatestSlot ─► control loop
//! ```
//!
//! [`NavigationIntent`]: crate::core::types::NavigationIntent

mod inference;
mod intent;
mod worker;

pub use inference::{InferenceRunner, ObjectDetector};
pub use intent::{LockState, VisionNavigator, derive_intent};
pub use worker::{VisionControl, VisionOutput, VisionWorker};

use crate::core::types::Frame;
use crate::error::Result;

/// Frame source
pub trait Camera: Send {
    fn open(&mut self) -> Result<()>;
    fn capture(&mut self) -> Result<Frame>;
    fn close(&mut self) {}
}
