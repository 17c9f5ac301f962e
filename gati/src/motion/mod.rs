//! Motion executor: gait commands, actuation gate and the movement state
//! machine.

mod actuator;
mod commands;
mod executor;

pub use actuator::{ActuationGate, Actuator};
pub use commands::{MotionCommand, MoveDirection, gait_for_intent};
pub use executor::{GuardDecision, MotionExecutor, RoutineGuard, RoutineOutcome};
