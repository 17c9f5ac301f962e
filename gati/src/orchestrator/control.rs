//! Body of the `control` thread: one fixed-cadence cycle per tick

use super::arbiter::arbitrate;
use super::directive::Task;
use super::shared::{LifecyclePhase, SharedState};
use super::suite::SensorSuite;
use crate::config::{GatiConfig, MotionConfig};
use crate::core::slot::LatestSlot;
use crate::core::state::{MovementState, RobotMotionState};
use crate::core::types::{SampleValue, SensorSample};
use crate::error::{Error, Result};
use crate::localizer::{self, StationLocalizer};
use crate::motion::{ActuationGate, GuardDecision, MotionExecutor, RoutineGuard, RoutineOutcome};
use crate::routines::{Routine, RoutineLibrary};
use crate::sensors::{Sensor, UltrasonicSensor};
use crate::streaming::StatusMessage;
use crate::vision::{VisionControl, VisionOutput};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Log every Nth overrun after the first
const OVERRUN_LOG_EVERY: u64 = 100;

/// Accepted task tagged with the stop epoch it was submitted under
#[derive(Debug)]
pub(crate) struct QueuedTask {
    pub task: Task,
    pub epoch: u64,
}

/// Everything the control thread owns
pub(crate) struct ControlWorker {
    pub config: Arc<GatiConfig>,
    pub shared: Arc<SharedState>,
    pub gate: Arc<ActuationGate>,
    pub executor: MotionExecutor,
    pub sensors: SensorSuite,
    pub localizer: StationLocalizer,
    pub routines: Arc<RoutineLibrary>,
    pub vision_slot: Arc<LatestSlot<VisionOutput>>,
    pub vision_control: Sender<VisionControl>,
    pub vision_alive: Arc<AtomicBool>,
    pub commands: Receiver<QueuedTask>,
    pub events: Sender<StatusMessage>,
    pub motion: RobotMotionState,
    pub samples: Vec<SensorSample>,
    pub pose_clock: Instant,
    pub last_status: Option<Instant>,
}

impl ControlWorker {
    pub fn run(mut self) {
        let tick = self.config.control.tick();
        log::info!("Control loop started ({:?} tick)", tick);

        while !self.shared.should_shutdown() {
            let started = Instant::now();
            let mut ran_routine = false;

            let result = panic::catch_unwind(AssertUnwindSafe(|| self.cycle(&mut ran_routine)));
            match result {
                Ok(Ok(())) => {}
                Ok(Err(Error::Fault(reason))) => self.enter_fault(reason),
                Ok(Err(e)) => self.enter_fault(e.to_string()),
                Err(payload) => self.enter_fault(format!(
                    "control cycle panicked: {}",
                    panic_message(payload.as_ref())
                )),
            }

            // Late cycles still count; the next one is scheduled from now
            let elapsed = started.elapsed();
            if elapsed < tick {
                thread::sleep(tick - elapsed);
            } else {
                let n = self.shared.record_overrun();
                if ran_routine {
                    log::debug!(
                        "Routine held the control cycle for {:?} ({} overruns)",
                        elapsed,
                        n
                    );
                } else if n == 1 || n % OVERRUN_LOG_EVERY == 0 {
                    log::warn!(
                        "Control cycle overran: {:?} > {:?} ({} overruns)",
                        elapsed,
                        tick,
                        n
                    );
                }
            }
        }

        self.shutdown();
    }

    fn cycle(&mut self, ran_routine: &mut bool) -> Result<()> {
        self.shared.record_tick();
        let running = self.shared.phase() == LifecyclePhase::Running;
        self.acknowledge_stop();

        if running && !self.vision_alive.load(Ordering::Relaxed) {
            return Err(Error::Fault("vision worker stopped".into()));
        }

        let serial_payload = self.sample_environment();
        let max_tilt = self.config.control.max_tilt_deg;
        if running
            && let Some(tilt) = self.motion.tilt_deg
            && tilt > max_tilt
        {
            return Err(Error::Fault(format!(
                "tilt {:.1} deg exceeds {:.1} deg limit",
                tilt, max_tilt
            )));
        }

        self.drain_commands(running, ran_routine)?;

        // Vision and station intents
        let now = Instant::now();
        let vision = self.vision_slot.take();
        let intent_timeout = self.config.control.intent_timeout();
        let vision_intent = vision
            .as_ref()
            .filter(|o| now.saturating_duration_since(o.produced_at) < intent_timeout)
            .map(|o| o.intent);
        let prefix = &self.config.localizer.marker_prefix;
        let marker = serial_payload
            .and_then(|p| localizer::parse_marker(&p, prefix))
            .or_else(|| vision.and_then(|o| o.marker));
        if let Some(m) = &marker {
            self.motion.last_qr_payload = Some(m.payload.clone());
            if self.config.station(&m.station_id).is_some() {
                self.motion.station_id = Some(m.station_id.clone());
            }
        }

        let station_active = self.executor.station_task_active();
        let station_intent = match self.executor.target_station() {
            Some(target) if station_active => {
                let target = target.to_string();
                Some(self.localizer.observe(marker.as_ref(), &target))
            }
            _ => None,
        };
        let arbitration = arbitrate(station_active, station_intent, vision_intent);

        // Obstacle re-sampled right before actuation
        let obstacle = self.sample_obstacle();
        if running
            && self.sensors.ultrasonic.is_stale()
            && self.config.control.is_mandatory("ultrasonic")
        {
            return Err(Error::Fault("ultrasonic readings stale".into()));
        }
        if running {
            self.executor.step(obstacle, arbitration.intent, now)?;
        }

        integrate_pose(
            &mut self.motion,
            &self.gate,
            &self.config.motion,
            &mut self.pose_clock,
            Instant::now(),
        );
        self.motion.movement = self.executor.state();
        self.motion.target_station = self.executor.target_station().map(str::to_string);
        self.motion.intent = arbitration.intent;
        self.shared.publish_tick(
            self.motion.clone(),
            self.sensors.health(),
            self.samples.clone(),
        );
        publish_status(
            &self.events,
            &self.shared,
            &mut self.last_status,
            self.config.streaming.status_interval(),
            now,
        );
        Ok(())
    }

    /// Catch up with a halt issued from another thread
    fn acknowledge_stop(&mut self) {
        if self.executor.observed_epoch() != self.gate.epoch() {
            log::info!("Stop acknowledged (epoch {})", self.gate.epoch());
            self.executor.stop();
            self.localizer.reset();
        }
    }

    /// Poll light, IMU and scanner. Returns a fresh scanner payload.
    fn sample_environment(&mut self) -> Option<String> {
        let mut fresh = Vec::new();
        let mut payload = None;

        if let Some(light) = self.sensors.light.as_mut() {
            if let Ok(sample) = light.sample() {
                fresh.push(sample);
            }
            self.motion.ambient_dark = light.is_dark();
        }
        if let Some(imu) = self.sensors.imu.as_mut() {
            if let Ok(sample) = imu.sample() {
                fresh.push(sample);
            }
            self.motion.tilt_deg = imu.tilt_degrees();
        }
        if let Some(qr) = self.sensors.qr.as_mut()
            && let Ok(sample) = qr.sample()
        {
            if let SampleValue::Text(text) = &sample.value {
                log::debug!("Scanner read '{}'", text);
                payload = Some(text.clone());
            }
            fresh.push(sample);
        }

        for sample in fresh {
            self.remember(sample);
        }
        payload
    }

    fn sample_obstacle(&mut self) -> bool {
        let ultrasonic = &mut self.sensors.ultrasonic;
        let sample = ultrasonic.sample();
        let obstacle = ultrasonic.is_obstacle(self.config.sensors.ultrasonic.threshold_cm);
        self.motion.obstacle_detected = obstacle;
        self.motion.obstacle_distance_cm = ultrasonic.smoothed_cm();
        if let Ok(sample) = sample {
            self.remember(sample);
        }
        obstacle
    }

    /// Keep the latest sample per source
    fn remember(&mut self, sample: SensorSample) {
        match self.samples.iter_mut().find(|s| s.source == sample.source) {
            Some(slot) => *slot = sample,
            None => self.samples.push(sample),
        }
    }

    fn drain_commands(&mut self, running: bool, ran_routine: &mut bool) -> Result<()> {
        while let Ok(queued) = self.commands.try_recv() {
            if !running {
                log::warn!("Discarding {:?}: control loop not running", queued.task);
                continue;
            }
            if queued.epoch != self.gate.epoch() {
                log::debug!("Discarding {:?} issued before stop", queued.task);
                continue;
            }
            self.acknowledge_stop();
            self.dispatch(queued.task, ran_routine)?;
        }
        Ok(())
    }

    fn dispatch(&mut self, task: Task, ran_routine: &mut bool) -> Result<()> {
        match task {
            Task::NavigateToStation { station } => {
                match self.executor.navigate_to_station(&station) {
                    Ok(()) => {
                        self.localizer.reset();
                        if self.vision_control.try_send(VisionControl::ResetLock).is_err() {
                            log::debug!("Vision control channel unavailable");
                        }
                    }
                    Err(Error::Halted) => {
                        log::debug!("Navigation to '{}' superseded by stop", station);
                    }
                    Err(Error::InvalidCommand(reason)) => {
                        self.emit(StatusMessage::CommandRejected {
                            command: "navigate_to_station".into(),
                            reason,
                        });
                    }
                    Err(e) => return Err(e),
                }
            }
            Task::Move {
                direction,
                duration_ms,
            } => {
                *ran_routine = true;
                let routine = Routine::manual_move(direction, duration_ms, &self.config.motion);
                self.run_routine(&routine)?;
            }
            Task::RunRoutine { name } => {
                *ran_routine = true;
                let routines = Arc::clone(&self.routines);
                match routines.lookup(&name) {
                    Some(routine) => self.run_routine(routine)?,
                    None => self.emit(StatusMessage::CommandRejected {
                        command: "run_routine".into(),
                        reason: format!("unknown routine '{}'", name),
                    }),
                }
            }
        }
        Ok(())
    }

    /// Run a routine on this thread. Aborts are reported, not faults.
    fn run_routine(&mut self, routine: &Routine) -> Result<()> {
        let outcome = {
            let mut guard = LoopGuard {
                shared: &self.shared,
                gate: &self.gate,
                start_epoch: self.gate.epoch(),
                ultrasonic: &mut self.sensors.ultrasonic,
                threshold_cm: self.config.sensors.ultrasonic.threshold_cm,
                motion: &mut self.motion,
                motion_config: &self.config.motion,
                pose_clock: &mut self.pose_clock,
                events: &self.events,
                last_status: &mut self.last_status,
                status_interval: self.config.streaming.status_interval(),
            };
            self.executor.execute(routine, &mut guard)
        };

        match outcome {
            Ok(RoutineOutcome::Completed { steps }) => {
                log::debug!("Routine '{}' ran {} steps", routine.name, steps);
            }
            Ok(RoutineOutcome::Cancelled { .. }) | Err(Error::Halted) => {
                self.executor.stop();
                self.localizer.reset();
            }
            Err(Error::RoutineAborted {
                routine,
                step,
                reason,
            }) => {
                self.emit(StatusMessage::RoutineAborted {
                    routine,
                    step,
                    reason,
                });
            }
            Err(e) => return Err(e),
        }
        self.motion.movement = self.executor.state();
        Ok(())
    }

    fn enter_fault(&mut self, reason: String) {
        self.gate.halt();
        self.executor.stop();
        self.localizer.reset();
        if self.shared.enter_fault(&reason) {
            log::error!("Control loop fault: {}", reason);
            self.emit(StatusMessage::Fault { reason });
        }
    }

    fn emit(&self, message: StatusMessage) {
        emit(&self.events, message);
    }

    fn shutdown(&mut self) {
        self.executor.stop();
        self.sensors.release_all();
        self.motion.movement = self.executor.state();
        self.shared.publish_tick(
            self.motion.clone(),
            self.sensors.health(),
            self.samples.clone(),
        );
        log::info!(
            "Control loop exited after {} ticks ({} overruns)",
            self.shared.ticks(),
            self.shared.overruns()
        );
    }
}

/// Polled by the executor while a routine runs: cancels on a new stop
/// epoch or shutdown, holds while the ultrasonic sees an obstacle (or can no
/// longer tell). Keeps the status feed going in the meantime.
struct LoopGuard<'a> {
    shared: &'a SharedState,
    gate: &'a ActuationGate,
    start_epoch: u64,
    ultrasonic: &'a mut UltrasonicSensor,
    threshold_cm: f32,
    motion: &'a mut RobotMotionState,
    motion_config: &'a MotionConfig,
    pose_clock: &'a mut Instant,
    events: &'a Sender<StatusMessage>,
    last_status: &'a mut Option<Instant>,
    status_interval: Duration,
}

impl RoutineGuard for LoopGuard<'_> {
    fn check(&mut self) -> GuardDecision {
        if self.gate.epoch() != self.start_epoch || self.shared.should_shutdown() {
            return GuardDecision::Cancel;
        }

        let now = Instant::now();
        integrate_pose(
            self.motion,
            self.gate,
            self.motion_config,
            self.pose_clock,
            now,
        );
        let _ = self.ultrasonic.sample();
        let obstacle = self.ultrasonic.is_obstacle(self.threshold_cm);
        self.motion.obstacle_detected = obstacle;
        self.motion.obstacle_distance_cm = self.ultrasonic.smoothed_cm();
        self.motion.movement = MovementState::Executing;
        self.shared.publish_motion(self.motion.clone());
        publish_status(
            self.events,
            self.shared,
            self.last_status,
            self.status_interval,
            now,
        );

        if obstacle {
            GuardDecision::Hold
        } else {
            GuardDecision::Continue
        }
    }
}

/// Emit a status snapshot at most once per `interval`
fn publish_status(
    events: &Sender<StatusMessage>,
    shared: &SharedState,
    last_status: &mut Option<Instant>,
    interval: Duration,
    now: Instant,
) {
    if last_status.is_some_and(|t| now.saturating_duration_since(t) < interval) {
        return;
    }
    *last_status = Some(now);
    emit(events, StatusMessage::Status(shared.snapshot()));
}

/// Best effort; a full or closed channel never blocks the loop
fn emit(events: &Sender<StatusMessage>, message: StatusMessage) {
    if let Err(TrySendError::Full(m)) = events.try_send(message) {
        log::trace!("Status channel full, dropped {}", m.kind());
    }
}

/// Dead-reckon the pose with whatever gait the actuator last received
fn integrate_pose(
    motion: &mut RobotMotionState,
    gate: &ActuationGate,
    config: &MotionConfig,
    clock: &mut Instant,
    now: Instant,
) {
    let dt = now.saturating_duration_since(*clock).as_secs_f32();
    *clock = now;
    if let Some(command) = gate.last_command() {
        motion.pose.integrate(&command, dt, config);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
