//! Robot motion state shared between the control loop and status readers.

use crate::config::MotionConfig;
use crate::core::types::NavigationIntent;
use crate::motion::MotionCommand;
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

/// Movement sub-state of the motion executor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementState {
    #[default]
    Idle,
    Navigating,
    Following,
    Avoiding,
    Executing,
    Stopped,
}

impl MovementState {
    /// States that drive the legs from perception intents
    pub fn is_intent_driven(&self) -> bool {
        matches!(self, MovementState::Navigating | MovementState::Following)
    }
}

/// Dead-reckoned planar pose (meters, radians)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose2D {
    pub x: f32,
    pub y: f32,
    pub heading: f32,
}

impl Pose2D {
    /// Advance the pose by the nominal displacement of `command` over `dt_s`
    pub fn integrate(&mut self, command: &MotionCommand, dt_s: f32, motion: &MotionConfig) {
        let MotionCommand::Walk {
            forward,
            lateral,
            yaw,
        } = *command
        else {
            return;
        };

        let vx = forward * motion.max_forward_mps;
        let vy = lateral * motion.max_lateral_mps;
        let (sin, cos) = self.heading.sin_cos();
        self.x += (vx * cos - vy * sin) * dt_s;
        self.y += (vx * sin + vy * cos) * dt_s;
        self.heading = normalize_angle(self.heading + yaw * motion.max_yaw_rps * dt_s);
    }
}

/// Normalize angle to [-PI, PI]
pub fn normalize_angle(angle: f32) -> f32 {
    let mut a = angle % (2.0 * PI);
    if a > PI {
        a -= 2.0 * PI;
    } else if a < -PI {
        a += 2.0 * PI;
    }
    a
}

/// Single per-process view of where the robot is and what it is doing.
///
/// Written only by the control thread through the orchestrator's shared
/// state; everyone else reads snapshots.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RobotMotionState {
    /// Last station whose marker was recognized
    pub station_id: Option<String>,
    /// Active station navigation target
    pub target_station: Option<String>,
    pub movement: MovementState,
    pub pose: Pose2D,
    pub obstacle_detected: bool,
    pub obstacle_distance_cm: Option<f32>,
    pub last_qr_payload: Option<String>,
    pub ambient_dark: bool,
    pub tilt_deg: Option<f32>,
    /// Intent applied on the most recent tick
    pub intent: Option<NavigationIntent>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_integrate_forward() {
        let motion = MotionConfig::default();
        let mut pose = Pose2D::default();
        pose.integrate(&MotionCommand::walk(1.0, 0.0, 0.0), 2.0, &motion);
        assert_relative_eq!(pose.x, 2.0 * motion.max_forward_mps, epsilon = 1e-6);
        assert_relative_eq!(pose.y, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_integrate_respects_heading() {
        let motion = MotionConfig::default();
        let mut pose = Pose2D {
            x: 0.0,
            y: 0.0,
            heading: PI / 2.0,
        };
        pose.integrate(&MotionCommand::walk(1.0, 0.0, 0.0), 1.0, &motion);
        assert_relative_eq!(pose.x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(pose.y, motion.max_forward_mps, epsilon = 1e-5);
    }

    #[test]
    fn test_halt_does_not_move() {
        let motion = MotionConfig::default();
        let mut pose = Pose2D::default();
        pose.integrate(&MotionCommand::Halt, 1.0, &motion);
        assert_eq!(pose, Pose2D::default());
    }

    #[test]
    fn test_normalize_angle() {
        assert_relative_eq!(normalize_angle(3.0 * PI / 2.0), -PI / 2.0, epsilon = 1e-5);
        assert_relative_eq!(normalize_angle(-3.0 * PI / 2.0), PI / 2.0, epsilon = 1e-5);
        assert_relative_eq!(normalize_angle(0.5), 0.5);
    }

    #[test]
    fn test_only_navigating_and_following_are_intent_driven() {
        assert!(MovementState::Navigating.is_intent_driven());
        assert!(MovementState::Following.is_intent_driven());
        assert!(!MovementState::Avoiding.is_intent_driven());
        assert!(!MovementState::Executing.is_intent_driven());
    }
}
