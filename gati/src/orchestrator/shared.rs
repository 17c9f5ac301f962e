//! State shared between the control thread and its observers

use crate::core::state::RobotMotionState;
use crate::core::types::{SensorSample, now_us};
use crate::error::{Error, Result};
use crate::sensors::HealthReport;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Control loop lifecycle
///
/// ```text
/// Created ──start() ok──► Running ◄──clear_fault()── Fault
///    │                       │  └────error/panic/tilt───►│
///    │ mandatory init fails  │ stop()                    │ stop()
///    ▼                       ▼                           ▼
/// FailSafeIdle ──stop()──► Stopped ◄─────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    Created,
    Running,
    Fault,
    FailSafeIdle,
    Stopped,
}

/// One consistent view of the robot for status readers
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub timestamp_us: u64,
    pub phase: LifecyclePhase,
    pub fault: Option<String>,
    pub state: RobotMotionState,
    pub ticks: u64,
    pub overruns: u64,
    pub health: Vec<HealthReport>,
    pub samples: Vec<SensorSample>,
}

#[derive(Debug, Default)]
struct TickRecord {
    motion: RobotMotionState,
    health: Vec<HealthReport>,
    samples: Vec<SensorSample>,
}

#[derive(Debug)]
struct PhaseRecord {
    phase: LifecyclePhase,
    fault: Option<String>,
}

pub struct SharedState {
    tick: Mutex<TickRecord>,
    phase: Mutex<PhaseRecord>,
    ticks: AtomicU64,
    overruns: AtomicU64,
    shutdown: Arc<AtomicBool>,
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            tick: Mutex::new(TickRecord::default()),
            phase: Mutex::new(PhaseRecord {
                phase: LifecyclePhase::Created,
                fault: None,
            }),
            ticks: AtomicU64::new(0),
            overruns: AtomicU64::new(0),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Replace everything a tick produced in one critical section
    pub fn publish_tick(
        &self,
        motion: RobotMotionState,
        health: Vec<HealthReport>,
        samples: Vec<SensorSample>,
    ) {
        *self.tick.lock() = TickRecord {
            motion,
            health,
            samples,
        };
    }

    /// Motion-only update while a routine blocks the tick
    pub fn publish_motion(&self, motion: RobotMotionState) {
        self.tick.lock().motion = motion;
    }

    pub fn motion(&self) -> RobotMotionState {
        self.tick.lock().motion.clone()
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.phase.lock().phase
    }

    pub fn set_phase(&self, phase: LifecyclePhase) {
        let mut record = self.phase.lock();
        if record.phase != phase {
            log::debug!("Lifecycle {:?} -> {:?}", record.phase, phase);
            record.phase = phase;
        }
    }

    pub fn fault_reason(&self) -> Option<String> {
        self.phase.lock().fault.clone()
    }

    /// Enter `Fault` from `Running`. Returns false when already faulted or
    /// not running, so a persisting cause reports once.
    pub fn enter_fault(&self, reason: &str) -> bool {
        let mut record = self.phase.lock();
        if record.phase != LifecyclePhase::Running {
            return false;
        }
        record.phase = LifecyclePhase::Fault;
        record.fault = Some(reason.to_string());
        true
    }

    pub fn clear_fault(&self) -> Result<()> {
        let mut record = self.phase.lock();
        if record.phase != LifecyclePhase::Fault {
            return Err(Error::InvalidCommand(format!(
                "no fault to clear (phase {:?})",
                record.phase
            )));
        }
        record.phase = LifecyclePhase::Running;
        record.fault = None;
        Ok(())
    }

    pub fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn record_overrun(&self) -> u64 {
        self.overruns.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn overruns(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }

    pub fn signal_shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn should_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Flag handed to worker threads
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let (phase, fault) = {
            let record = self.phase.lock();
            (record.phase, record.fault.clone())
        };
        let tick = self.tick.lock();
        StatusSnapshot {
            timestamp_us: now_us(),
            phase,
            fault,
            state: tick.motion.clone(),
            ticks: self.ticks(),
            overruns: self.overruns(),
            health: tick.health.clone(),
            samples: tick.samples.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::MovementState;

    #[test]
    fn test_fault_only_from_running() {
        let shared = SharedState::new();
        assert!(!shared.enter_fault("early"));
        shared.set_phase(LifecyclePhase::Running);
        assert!(shared.enter_fault("tilt"));
        assert!(!shared.enter_fault("tilt again"));
        assert_eq!(shared.fault_reason().as_deref(), Some("tilt"));

        shared.clear_fault().unwrap();
        assert_eq!(shared.phase(), LifecyclePhase::Running);
        assert!(shared.fault_reason().is_none());
        assert!(shared.clear_fault().is_err());
    }

    #[test]
    fn test_snapshot_reflects_published_tick() {
        let shared = SharedState::new();
        let motion = RobotMotionState {
            movement: MovementState::Navigating,
            target_station: Some("dock".into()),
            ..Default::default()
        };
        shared.publish_tick(motion.clone(), Vec::new(), Vec::new());
        shared.record_tick();
        shared.record_overrun();

        let snap = shared.snapshot();
        assert_eq!(snap.state, motion);
        assert_eq!(snap.ticks, 1);
        assert_eq!(snap.overruns, 1);
        assert_eq!(snap.phase, LifecyclePhase::Created);
    }

    #[test]
    fn test_shutdown_flag_is_shared() {
        let shared = SharedState::new();
        let flag = shared.shutdown_flag();
        shared.signal_shutdown();
        assert!(flag.load(Ordering::Relaxed));
    }
}
