//! Detection to intent policy with lock dwell

use crate::config::VisionConfig;
use crate::core::types::{Detection, NavigationIntent};
use std::time::Instant;

/// Lock bookkeeping carried between inference cycles
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LockState {
    pub is_locked: bool,
    /// When the current intent was first issued
    pub last_action_time: Option<Instant>,
}

/// Pure intent policy.
///
/// A held lock wins until `min_dwell` has elapsed. After that, no usable
/// detection means `Scanning`, a large centered target means `Locked`, and
/// anything else steers toward the target's side of the frame center.
pub fn derive_intent(
    detection: Option<&Detection>,
    prior: &LockState,
    now: Instant,
    config: &VisionConfig,
) -> NavigationIntent {
    if prior.is_locked
        && let Some(since) = prior.last_action_time
        && now.saturating_duration_since(since) < config.min_dwell()
    {
        return NavigationIntent::Locked;
    }

    let Some(detection) = detection.filter(|d| d.confidence >= config.min_confidence) else {
        return NavigationIntent::Scanning;
    };

    let width = config.frame_width as f32;
    let frame_area = width * config.frame_height as f32;
    let frame_cx = width / 2.0;
    let half_zone = config.lock_zone_ratio * width / 2.0;
    let (cx, _) = detection.center();

    if (cx - frame_cx).abs() <= half_zone && detection.area() >= config.lock_area_ratio * frame_area
    {
        NavigationIntent::Locked
    } else if cx < frame_cx {
        NavigationIntent::TurnLeft
    } else {
        NavigationIntent::TurnRight
    }
}

/// Stateful wrapper that maintains the lock across cycles.
///
/// Owns only its own lock state; it never touches the robot motion state.
#[derive(Debug)]
pub struct VisionNavigator {
    config: VisionConfig,
    lock: LockState,
    last_intent: Option<NavigationIntent>,
}

impl VisionNavigator {
    pub fn new(config: VisionConfig) -> Self {
        Self {
            config,
            lock: LockState::default(),
            last_intent: None,
        }
    }

    pub fn update(&mut self, detection: Option<&Detection>, now: Instant) -> NavigationIntent {
        let intent = derive_intent(detection, &self.lock, now, &self.config);
        if self.last_intent != Some(intent) {
            log::debug!("Vision intent {:?} -> {:?}", self.last_intent, intent);
            self.lock.last_action_time = Some(now);
            self.last_intent = Some(intent);
        }
        self.lock.is_locked = intent == NavigationIntent::Locked;
        intent
    }

    /// Drop any held lock, e.g. when station navigation takes over
    pub fn reset_lock(&mut self) {
        self.lock = LockState::default();
        self.last_intent = None;
    }

    pub fn lock_state(&self) -> LockState {
        self.lock
    }
}
