//! Motion executor state machine
//!
//! ```text
//!            navigate_to_station            obstacle
//!   Idle ───────────────────────► Navigating ───────► Avoiding ──timeout──► Stopped
//!    │  ▲                          ▲   │ arrived          │ clear
//!    │  └──────────────────────────┼───┘                  │
//!    │ detection (follow_on_idle)  └──────────────────────┤
//!    └─────────────────────────► Following ◄──────────────┘
//!
//!   any ──execute()──► Executing ──► Idle | Stopped
//!   any ──stop()─────► Stopped   (left only by a new directive)
//! ```

use super::{ActuationGate, MotionCommand, gait_for_intent};
use crate::config::{GatiConfig, MotionConfig};
use crate::core::state::MovementState;
use crate::core::types::NavigationIntent;
use crate::error::{Error, Result};
use crate::routines::{MotionStep, Routine};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// What the orchestrator's guard says between routine steps and slices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Continue,
    /// Obstacle present: hold at neutral and poll again
    Hold,
    /// Stop requested
    Cancel,
}

/// Polled by `execute` between steps and between slices of a timed step
pub trait RoutineGuard {
    fn check(&mut self) -> GuardDecision;
}

impl<F: FnMut() -> GuardDecision> RoutineGuard for F {
    fn check(&mut self) -> GuardDecision {
        self()
    }
}

/// How a routine ended when it was not aborted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutineOutcome {
    Completed { steps: usize },
    /// Stopped by request before finishing; `at_step` is 1-based
    Cancelled { at_step: usize },
}

enum StepResult {
    Done,
    Cancelled,
    Blocked,
}

enum Clearance {
    Clear { held: bool },
    Cancelled,
    Blocked,
}

pub struct MotionExecutor {
    gate: Arc<ActuationGate>,
    motion: MotionConfig,
    slice: Duration,
    avoid_timeout: Duration,
    intent_timeout: Duration,
    follow_on_idle: bool,
    known_stations: Vec<String>,

    state: MovementState,
    target: Option<String>,
    resume: Option<MovementState>,
    avoid_since: Option<Instant>,
    last_intent_at: Option<Instant>,
    /// Gate stop epoch this executor has acknowledged
    observed_epoch: u64,
}

impl MotionExecutor {
    pub fn new(gate: Arc<ActuationGate>, config: &GatiConfig) -> Self {
        let observed_epoch = gate.epoch();
        Self {
            gate,
            motion: config.motion.clone(),
            slice: config.control.tick(),
            avoid_timeout: config.control.avoid_timeout(),
            intent_timeout: config.control.intent_timeout(),
            follow_on_idle: config.control.follow_on_idle,
            known_stations: config.stations.iter().map(|s| s.id.clone()).collect(),
            state: MovementState::Idle,
            target: None,
            resume: None,
            avoid_since: None,
            last_intent_at: None,
            observed_epoch,
        }
    }

    pub fn state(&self) -> MovementState {
        self.state
    }

    pub fn target_station(&self) -> Option<&str> {
        self.target.as_deref()
    }

    /// State to return to once an obstacle clears
    pub fn resume_state(&self) -> Option<MovementState> {
        self.resume
    }

    pub fn observed_epoch(&self) -> u64 {
        self.observed_epoch
    }

    /// A station task is active (navigating, or avoiding on the way)
    pub fn station_task_active(&self) -> bool {
        self.state == MovementState::Navigating
            || (self.state == MovementState::Avoiding
                && self.resume == Some(MovementState::Navigating))
    }

    /// Start navigating toward a known station
    pub fn navigate_to_station(&mut self, station_id: &str) -> Result<()> {
        if !self.known_stations.iter().any(|s| s == station_id) {
            return Err(Error::InvalidCommand(format!(
                "unknown station '{}'",
                station_id
            )));
        }
        self.begin_directive()?;
        self.target = Some(station_id.to_string());
        self.resume = None;
        self.avoid_since = None;
        log::info!("Navigating to station '{}'", station_id);
        self.transition(MovementState::Navigating);
        Ok(())
    }

    /// One control tick.
    ///
    /// `obstacle` must be sampled immediately before this call. An obstacle
    /// while navigating or following halts the legs in this same call.
    pub fn step(
        &mut self,
        obstacle: bool,
        intent: Option<NavigationIntent>,
        now: Instant,
    ) -> Result<MovementState> {
        match self.step_inner(obstacle, intent, now) {
            Err(Error::Halted) => {
                // A stop from another thread beat this tick
                self.stop();
                Ok(self.state)
            }
            other => other,
        }
    }

    fn step_inner(
        &mut self,
        obstacle: bool,
        intent: Option<NavigationIntent>,
        now: Instant,
    ) -> Result<MovementState> {
        match self.state {
            MovementState::Navigating | MovementState::Following if obstacle => {
                self.gate.apply(MotionCommand::Halt)?;
                log::warn!("Obstacle detected while {:?}, halting", self.state);
                self.resume = Some(self.state);
                self.avoid_since = Some(now);
                self.transition(MovementState::Avoiding);
            }
            MovementState::Avoiding => {
                if obstacle {
                    let since = *self.avoid_since.get_or_insert(now);
                    if now.saturating_duration_since(since) >= self.avoid_timeout {
                        log::warn!(
                            "Obstacle persisted for {:?}, giving up",
                            self.avoid_timeout
                        );
                        self.gate.apply(MotionCommand::Halt)?;
                        self.target = None;
                        self.resume = None;
                        self.avoid_since = None;
                        self.transition(MovementState::Stopped);
                    }
                } else {
                    self.avoid_since = None;
                    match self.resume.take() {
                        Some(MovementState::Navigating) if self.target.is_some() => {
                            self.transition(MovementState::Navigating);
                        }
                        Some(MovementState::Following) => {
                            self.last_intent_at = Some(now);
                            self.transition(MovementState::Following);
                        }
                        _ => self.transition(MovementState::Idle),
                    }
                }
            }
            MovementState::Navigating => match intent {
                Some(NavigationIntent::Stop) => {
                    self.gate.apply(MotionCommand::Halt)?;
                    log::info!(
                        "Arrived at station '{}'",
                        self.target.as_deref().unwrap_or("?")
                    );
                    self.target = None;
                    self.transition(MovementState::Idle);
                }
                Some(i) => self.gate.apply(gait_for_intent(i, &self.motion))?,
                None => {}
            },
            MovementState::Following => match intent {
                Some(i) if i.is_detection_driven() => {
                    self.last_intent_at = Some(now);
                    self.gate.apply(gait_for_intent(i, &self.motion))?;
                }
                Some(_) => {
                    log::info!("Follow target lost");
                    self.gate.apply(MotionCommand::Halt)?;
                    self.transition(MovementState::Idle);
                }
                None => {
                    let stale = self
                        .last_intent_at
                        .is_none_or(|t| now.saturating_duration_since(t) >= self.intent_timeout);
                    if stale {
                        log::info!("Vision intent stale, stopping follow");
                        self.gate.apply(MotionCommand::Halt)?;
                        self.transition(MovementState::Idle);
                    }
                }
            },
            MovementState::Idle => {
                if let Some(i) = intent
                    && self.follow_on_idle
                    && !obstacle
                    && i.is_detection_driven()
                    && !self.gate.is_halted()
                {
                    self.last_intent_at = Some(now);
                    self.transition(MovementState::Following);
                    self.gate.apply(gait_for_intent(i, &self.motion))?;
                }
            }
            MovementState::Executing | MovementState::Stopped => {}
        }
        Ok(self.state)
    }

    /// Run a routine to completion on the calling thread.
    ///
    /// The guard is polled before every step and between slices of timed
    /// steps. A failing step aborts the rest and leaves the executor
    /// `Stopped`; success leaves it `Idle`.
    pub fn execute(
        &mut self,
        routine: &Routine,
        guard: &mut dyn RoutineGuard,
    ) -> Result<RoutineOutcome> {
        self.begin_directive()?;
        self.target = None;
        self.resume = None;
        self.avoid_since = None;
        self.transition(MovementState::Executing);
        log::info!(
            "Routine '{}' started ({} steps)",
            routine.name,
            routine.steps.len()
        );

        for (i, step) in routine.steps.iter().enumerate() {
            let index = i + 1;
            log::debug!("Routine '{}' step {}: {:?}", routine.name, index, step);
            let reason = match self.run_step(step, guard) {
                Ok(StepResult::Done) => continue,
                Ok(StepResult::Cancelled) | Err(Error::Halted) => {
                    self.stop();
                    log::info!("Routine '{}' cancelled at step {}", routine.name, index);
                    return Ok(RoutineOutcome::Cancelled { at_step: index });
                }
                Ok(StepResult::Blocked) => {
                    format!("obstacle persisted past {:?}", self.avoid_timeout)
                }
                Err(e) => e.to_string(),
            };
            self.stop();
            log::error!(
                "Routine '{}' aborted at step {}: {}",
                routine.name,
                index,
                reason
            );
            return Err(Error::RoutineAborted {
                routine: routine.name.clone(),
                step: index,
                reason,
            });
        }

        if let Err(e) = self.gate.apply(MotionCommand::Halt) {
            self.stop();
            return Err(Error::RoutineAborted {
                routine: routine.name.clone(),
                step: routine.steps.len(),
                reason: e.to_string(),
            });
        }
        log::info!("Routine '{}' completed", routine.name);
        self.transition(MovementState::Idle);
        Ok(RoutineOutcome::Completed {
            steps: routine.steps.len(),
        })
    }

    /// Neutral pose and `Stopped`. Idempotent; safe mid-step.
    pub fn stop(&mut self) {
        if let Err(e) = self.gate.neutral() {
            log::error!("Failed to command neutral pose: {}", e);
        }
        self.observed_epoch = self.gate.epoch();
        self.target = None;
        self.resume = None;
        self.avoid_since = None;
        self.last_intent_at = None;
        self.transition(MovementState::Stopped);
    }

    fn begin_directive(&mut self) -> Result<()> {
        if self.gate.resume(self.observed_epoch) {
            Ok(())
        } else {
            Err(Error::Halted)
        }
    }

    fn transition(&mut self, next: MovementState) {
        if self.state != next {
            log::info!("Motion state {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }

    fn run_step(&mut self, step: &MotionStep, guard: &mut dyn RoutineGuard) -> Result<StepResult> {
        match step {
            MotionStep::Walk {
                forward,
                lateral,
                yaw,
                duration_ms,
            } => self.timed(
                Some(MotionCommand::walk(*forward, *lateral, *yaw)),
                Duration::from_millis(*duration_ms),
                guard,
            ),
            MotionStep::Pause { duration_ms } => {
                self.gate.apply(MotionCommand::Halt)?;
                self.timed(None, Duration::from_millis(*duration_ms), guard)
            }
            MotionStep::Stand => match self.await_clearance(guard)? {
                Clearance::Clear { .. } => {
                    self.gate.apply(MotionCommand::Halt)?;
                    Ok(StepResult::Done)
                }
                Clearance::Cancelled => Ok(StepResult::Cancelled),
                Clearance::Blocked => Ok(StepResult::Blocked),
            },
            MotionStep::Group { name } => match self.await_clearance(guard)? {
                Clearance::Clear { .. } => {
                    self.gate.run_group(name)?;
                    Ok(StepResult::Done)
                }
                Clearance::Cancelled => Ok(StepResult::Cancelled),
                Clearance::Blocked => Ok(StepResult::Blocked),
            },
        }
    }

    /// Hold `command` for `duration` in slices of one tick
    fn timed(
        &mut self,
        command: Option<MotionCommand>,
        duration: Duration,
        guard: &mut dyn RoutineGuard,
    ) -> Result<StepResult> {
        let mut remaining = duration;
        let mut applied = false;
        while !remaining.is_zero() {
            match self.await_clearance(guard)? {
                Clearance::Clear { held } => applied &= !held,
                Clearance::Cancelled => return Ok(StepResult::Cancelled),
                Clearance::Blocked => return Ok(StepResult::Blocked),
            }
            if !applied {
                if let Some(c) = command {
                    self.gate.apply(c)?;
                }
                applied = true;
            }
            let dt = remaining.min(self.slice);
            thread::sleep(dt);
            remaining -= dt;
        }
        Ok(StepResult::Done)
    }

    /// Poll the guard, holding at neutral while it says `Hold`
    fn await_clearance(&mut self, guard: &mut dyn RoutineGuard) -> Result<Clearance> {
        let mut held_since: Option<Instant> = None;
        loop {
            match guard.check() {
                GuardDecision::Continue => {
                    return Ok(Clearance::Clear {
                        held: held_since.is_some(),
                    });
                }
                GuardDecision::Cancel => return Ok(Clearance::Cancelled),
                GuardDecision::Hold => {
                    let since = match held_since {
                        Some(t) => t,
                        None => {
                            self.gate.apply(MotionCommand::Halt)?;
                            log::warn!("Routine holding for obstacle");
                            let t = Instant::now();
                            held_since = Some(t);
                            t
                        }
                    };
                    if since.elapsed() >= self.avoid_timeout {
                        return Ok(Clearance::Blocked);
                    }
                    thread::sleep(self.slice);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::sim::{SimActuator, SimActuatorHandle};

    fn config() -> GatiConfig {
        let mut c = GatiConfig::default();
        c.control.tick_ms = 2;
        c.control.avoid_timeout_ms = 100;
        c.control.intent_timeout_ms = 100;
        c
    }

    fn executor() -> (MotionExecutor, SimActuatorHandle) {
        let (actuator, handle) = SimActuator::new(Duration::ZERO);
        let gate = Arc::new(ActuationGate::new(Box::new(actuator)));
        (MotionExecutor::new(gate, &config()), handle)
    }

    fn walk(ms: u64) -> MotionStep {
        MotionStep::Walk {
            forward: 0.5,
            lateral: 0.0,
            yaw: 0.0,
            duration_ms: ms,
        }
    }

    fn routine(steps: Vec<MotionStep>) -> Routine {
        Routine {
            name: "test".into(),
            description: String::new(),
            steps,
        }
    }

    #[test]
    fn test_navigate_unknown_station_leaves_state() {
        let (mut ex, _) = executor();
        let err = ex.navigate_to_station("unknown_id").unwrap_err();
        assert!(matches!(err, Error::InvalidCommand(_)));
        assert_eq!(ex.state(), MovementState::Idle);
    }

    #[test]
    fn test_obstacle_halts_navigation_same_tick() {
        let (mut ex, act) = executor();
        let t0 = Instant::now();
        ex.navigate_to_station("dock").unwrap();
        ex.step(false, Some(NavigationIntent::Locked), t0).unwrap();
        assert!(!act.is_neutral());

        let state = ex.step(true, Some(NavigationIntent::Locked), t0).unwrap();
        assert_eq!(state, MovementState::Avoiding);
        assert!(act.is_neutral());
        assert!(ex.station_task_active());
    }

    #[test]
    fn test_avoiding_resumes_when_clear() {
        let (mut ex, _) = executor();
        let t0 = Instant::now();
        ex.navigate_to_station("dock").unwrap();
        ex.step(true, None, t0).unwrap();
        let state = ex.step(false, None, t0 + Duration::from_millis(10)).unwrap();
        assert_eq!(state, MovementState::Navigating);
        assert_eq!(ex.target_station(), Some("dock"));
    }

    #[test]
    fn test_avoiding_times_out_to_stopped() {
        let (mut ex, act) = executor();
        let t0 = Instant::now();
        ex.navigate_to_station("dock").unwrap();
        ex.step(true, None, t0).unwrap();
        ex.step(true, None, t0 + Duration::from_millis(50)).unwrap();
        assert_eq!(ex.state(), MovementState::Avoiding);
        let state = ex.step(true, None, t0 + Duration::from_millis(100)).unwrap();
        assert_eq!(state, MovementState::Stopped);
        assert!(act.is_neutral());
        assert_eq!(ex.target_station(), None);
    }

    #[test]
    fn test_arrival_goes_idle() {
        let (mut ex, act) = executor();
        ex.navigate_to_station("shelf_a").unwrap();
        let state = ex
            .step(false, Some(NavigationIntent::Stop), Instant::now())
            .unwrap();
        assert_eq!(state, MovementState::Idle);
        assert!(act.is_neutral());
    }

    #[test]
    fn test_idle_starts_following_on_detection() {
        let (mut ex, _) = executor();
        let t0 = Instant::now();
        assert_eq!(
            ex.step(false, Some(NavigationIntent::Scanning), t0).unwrap(),
            MovementState::Idle
        );
        assert_eq!(
            ex.step(true, Some(NavigationIntent::TurnLeft), t0).unwrap(),
            MovementState::Idle
        );
        assert_eq!(
            ex.step(false, Some(NavigationIntent::TurnLeft), t0).unwrap(),
            MovementState::Following
        );
    }

    #[test]
    fn test_following_stops_on_stale_intent() {
        let (mut ex, act) = executor();
        let t0 = Instant::now();
        ex.step(false, Some(NavigationIntent::Locked), t0).unwrap();
        ex.step(false, None, t0 + Duration::from_millis(50)).unwrap();
        assert_eq!(ex.state(), MovementState::Following);
        ex.step(false, None, t0 + Duration::from_millis(150)).unwrap();
        assert_eq!(ex.state(), MovementState::Idle);
        assert!(act.is_neutral());
    }

    #[test]
    fn test_routine_success_ends_idle() {
        let (mut ex, act) = executor();
        let r = routine(vec![
            walk(4),
            MotionStep::Group { name: "wave".into() },
            MotionStep::Pause { duration_ms: 2 },
            MotionStep::Stand,
        ]);
        let mut guard = || GuardDecision::Continue;
        let outcome = ex.execute(&r, &mut guard).unwrap();
        assert_eq!(outcome, RoutineOutcome::Completed { steps: 4 });
        assert_eq!(ex.state(), MovementState::Idle);
        assert_eq!(act.groups(), vec!["wave".to_string()]);
        assert!(act.is_neutral());
    }

    #[test]
    fn test_failing_step_aborts_remaining() {
        let (mut ex, act) = executor();
        act.fail_group("jam");
        let r = routine(vec![
            walk(2),
            walk(2),
            MotionStep::Group { name: "jam".into() },
            MotionStep::Group { name: "after".into() },
            walk(2),
        ]);
        let mut guard = || GuardDecision::Continue;
        let err = ex.execute(&r, &mut guard).unwrap_err();
        assert!(matches!(err, Error::RoutineAborted { step: 3, .. }));
        assert_eq!(ex.state(), MovementState::Stopped);
        assert!(!act.groups().contains(&"after".to_string()));
        assert!(act.is_neutral());
    }

    #[test]
    fn test_cancel_mid_routine_stops_at_neutral() {
        for cancel_at in 1..=3 {
            let (mut ex, act) = executor();
            let r = routine(vec![walk(4), walk(4), walk(4)]);
            let mut polls = 0;
            // Each walk polls the guard twice (4 ms in 2 ms slices)
            let mut guard = || {
                polls += 1;
                if polls > (cancel_at - 1) * 2 {
                    GuardDecision::Cancel
                } else {
                    GuardDecision::Continue
                }
            };
            let outcome = ex.execute(&r, &mut guard).unwrap();
            assert_eq!(outcome, RoutineOutcome::Cancelled { at_step: cancel_at });
            assert_eq!(ex.state(), MovementState::Stopped);
            assert!(act.is_neutral());

            ex.stop();
            assert_eq!(ex.state(), MovementState::Stopped);
            assert!(act.is_neutral());
        }
    }

    #[test]
    fn test_persistent_obstacle_aborts_routine() {
        let (mut ex, act) = executor();
        let r = routine(vec![walk(4), walk(4)]);
        let mut polls = 0;
        let mut guard = || {
            polls += 1;
            if polls > 1 {
                GuardDecision::Hold
            } else {
                GuardDecision::Continue
            }
        };
        let err = ex.execute(&r, &mut guard).unwrap_err();
        assert!(matches!(err, Error::RoutineAborted { step: 1, .. }));
        assert_eq!(ex.state(), MovementState::Stopped);
        assert!(act.is_neutral());
    }

    #[test]
    fn test_external_halt_refuses_new_directive_until_acknowledged() {
        let (mut ex, _) = executor();
        ex.gate.halt();
        assert!(matches!(
            ex.navigate_to_station("dock"),
            Err(Error::Halted)
        ));
        ex.stop();
        assert!(ex.navigate_to_station("dock").is_ok());
        assert_eq!(ex.state(), MovementState::Navigating);
    }
}
