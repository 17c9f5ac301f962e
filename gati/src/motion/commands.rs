//! Motion command definitions

use crate::config::MotionConfig;
use crate::core::types::NavigationIntent;
use serde::{Deserialize, Serialize};

/// Gait command sent to the legged platform.
///
/// Walk components are normalized to [-1, 1]; positive yaw turns left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MotionCommand {
    /// Neutral standing pose
    Halt,
    Walk { forward: f32, lateral: f32, yaw: f32 },
}

impl MotionCommand {
    /// Build a walk with every component clamped; non-finite becomes 0
    pub fn walk(forward: f32, lateral: f32, yaw: f32) -> Self {
        Self::Walk {
            forward: clamp_unit(forward),
            lateral: clamp_unit(lateral),
            yaw: clamp_unit(yaw),
        }
    }

    pub fn command_type(&self) -> &'static str {
        match self {
            Self::Halt => "halt",
            Self::Walk { .. } => "walk",
        }
    }

    /// True for Halt and for an all-zero walk
    pub fn is_neutral(&self) -> bool {
        match *self {
            Self::Halt => true,
            Self::Walk {
                forward,
                lateral,
                yaw,
            } => forward == 0.0 && lateral == 0.0 && yaw == 0.0,
        }
    }
}

fn clamp_unit(v: f32) -> f32 {
    if v.is_finite() { v.clamp(-1.0, 1.0) } else { 0.0 }
}

/// Directions accepted by the `move` command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveDirection {
    Forward,
    Backward,
    Left,
    Right,
    TurnLeft,
    TurnRight,
}

impl MoveDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Backward => "backward",
            Self::Left => "left",
            Self::Right => "right",
            Self::TurnLeft => "turn_left",
            Self::TurnRight => "turn_right",
        }
    }

    /// Gait for a manual move
    pub fn gait(&self, motion: &MotionConfig) -> MotionCommand {
        let c = motion.cruise;
        let y = motion.turn_yaw;
        match self {
            Self::Forward => MotionCommand::walk(c, 0.0, 0.0),
            Self::Backward => MotionCommand::walk(-c, 0.0, 0.0),
            Self::Left => MotionCommand::walk(0.0, c, 0.0),
            Self::Right => MotionCommand::walk(0.0, -c, 0.0),
            Self::TurnLeft => MotionCommand::walk(0.0, 0.0, y),
            Self::TurnRight => MotionCommand::walk(0.0, 0.0, -y),
        }
    }
}

/// Gait that carries out a navigation intent.
///
/// Turns keep a small forward component so the robot closes in while
/// steering.
pub fn gait_for_intent(intent: NavigationIntent, motion: &MotionConfig) -> MotionCommand {
    match intent {
        NavigationIntent::Locked => MotionCommand::walk(motion.cruise, 0.0, 0.0),
        NavigationIntent::TurnLeft => MotionCommand::walk(motion.turn_forward, 0.0, motion.turn_yaw),
        NavigationIntent::TurnRight => {
            MotionCommand::walk(motion.turn_forward, 0.0, -motion.turn_yaw)
        }
        NavigationIntent::Scanning => MotionCommand::walk(0.0, 0.0, motion.search_yaw),
        NavigationIntent::Stop => MotionCommand::Halt,
    }
}
