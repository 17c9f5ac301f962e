//! Control loop orchestrator
//!
//! Owns the lifecycle, the `control` and `vision` threads and command
//! intake. Each tick:
//!
//! ```text
//! drain commands ─► take VisionOutput ─► sample sensors ─► localize
//!      ─► arbitrate ─► MotionExecutor::step ─► publish state + status
//! ```
//!
//! Any error or panic inside a tick moves the loop to `Fault`, which stops
//! all motion until `clear_fault()`.

mod arbiter;
mod control;
mod directive;
mod handle;
mod shared;
mod suite;

pub use arbiter::{Arbitration, IntentSource, arbitrate};
pub use directive::{CommandRecord, CommandValidator, Directive};
pub use handle::CommandHandle;
pub use shared::{LifecyclePhase, SharedState, StatusSnapshot};

use crate::config::GatiConfig;
use crate::context::HardwareContext;
use crate::core::slot::LatestSlot;
use crate::core::state::RobotMotionState;
use crate::error::{Error, Result};
use crate::localizer::StationLocalizer;
use crate::motion::{ActuationGate, MotionExecutor};
use crate::routines::RoutineLibrary;
use crate::streaming::StatusMessage;
use crate::vision::{Camera, VisionWorker};
use control::{ControlWorker, QueuedTask};
use crossbeam_channel::{Receiver, Sender, bounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use suite::{PendingHardware, SensorSuite};

/// Capacity of the status/event channel
const EVENT_QUEUE: usize = 64;
const VISION_CONTROL_QUEUE: usize = 4;

/// Lifecycle contract shared by controllers
pub trait Controller {
    fn start(&mut self) -> Result<()>;
    fn stop(&mut self) -> Result<()>;
}

pub struct ControlLoop {
    config: Arc<GatiConfig>,
    routines: Arc<RoutineLibrary>,
    shared: Arc<SharedState>,
    gate: Arc<ActuationGate>,
    handle: CommandHandle,
    pending: Option<PendingHardware>,
    command_rx: Option<Receiver<QueuedTask>>,
    events_tx: Sender<StatusMessage>,
    events_rx: Option<Receiver<StatusMessage>>,
    control_thread: Option<JoinHandle<()>>,
    vision_thread: Option<JoinHandle<()>>,
}

impl ControlLoop {
    /// Takes ownership of the hardware; nothing is opened until `start()`
    pub fn new(
        config: GatiConfig,
        routines: RoutineLibrary,
        hardware: HardwareContext,
    ) -> Result<Self> {
        config.validate()?;
        let (pending, actuator) = PendingHardware::split(hardware, &config);
        let gate = Arc::new(ActuationGate::new(actuator));
        let shared = Arc::new(SharedState::new());

        let (command_tx, command_rx) = bounded(config.control.command_queue);
        let (events_tx, events_rx) = bounded(EVENT_QUEUE);
        let handle = CommandHandle::new(
            CommandValidator::new(&config, &routines),
            Arc::clone(&gate),
            Arc::clone(&shared),
            command_tx,
            events_tx.clone(),
        );

        Ok(Self {
            config: Arc::new(config),
            routines: Arc::new(routines),
            shared,
            gate,
            handle,
            pending: Some(pending),
            command_rx: Some(command_rx),
            events_tx,
            events_rx: Some(events_rx),
            control_thread: None,
            vision_thread: None,
        })
    }

    /// Open hardware and spawn the worker threads.
    ///
    /// A mandatory component that fails to open leaves the robot in
    /// fail-safe idle (neutral pose, no threads) and returns
    /// `Error::HardwareInit`.
    pub fn start(&mut self) -> Result<()> {
        match self.shared.phase() {
            LifecyclePhase::Created => {}
            LifecyclePhase::Running | LifecyclePhase::Fault => return Err(Error::AlreadyRunning),
            phase => {
                return Err(Error::Fault(format!(
                    "control loop cannot restart from {:?}",
                    phase
                )));
            }
        }
        let (Some(pending), Some(command_rx)) = (self.pending.take(), self.command_rx.take())
        else {
            return Err(Error::NotInitialized);
        };
        let PendingHardware {
            mut camera,
            detector,
            marker_decoder,
            mut sensors,
        } = pending;

        let camera_ok = match self.open_hardware(camera.as_mut(), &mut sensors) {
            Ok(ok) => ok,
            Err(e) => {
                camera.close();
                self.enter_fail_safe(&mut sensors, &e);
                return Err(e);
            }
        };

        let slot = Arc::new(LatestSlot::new());
        let (vision_tx, vision_rx) = bounded(VISION_CONTROL_QUEUE);
        let vision_alive = Arc::new(AtomicBool::new(true));

        if camera_ok {
            let spawned = VisionWorker::new(
                camera,
                detector,
                marker_decoder,
                &self.config,
                Arc::clone(&slot),
                vision_rx,
                self.shared.shutdown_flag(),
            )
            .and_then(|worker| {
                let alive = Arc::clone(&vision_alive);
                thread::Builder::new()
                    .name("vision".to_string())
                    .spawn(move || {
                        // Errors are logged by the worker
                        let _ = worker.run();
                        alive.store(false, Ordering::Relaxed);
                    })
                    .map_err(Error::from)
            });
            match spawned {
                Ok(handle) => self.vision_thread = Some(handle),
                Err(e) => {
                    self.enter_fail_safe(&mut sensors, &e);
                    return Err(e);
                }
            }
        } else {
            log::warn!("Vision disabled: object following and frame markers unavailable");
        }

        let worker = ControlWorker {
            config: Arc::clone(&self.config),
            shared: Arc::clone(&self.shared),
            gate: Arc::clone(&self.gate),
            executor: MotionExecutor::new(Arc::clone(&self.gate), &self.config),
            sensors,
            localizer: StationLocalizer::new(self.config.stations.clone()),
            routines: Arc::clone(&self.routines),
            vision_slot: slot,
            vision_control: vision_tx,
            vision_alive,
            commands: command_rx,
            events: self.events_tx.clone(),
            motion: RobotMotionState::default(),
            samples: Vec::new(),
            pose_clock: Instant::now(),
            last_status: None,
        };

        self.shared.set_phase(LifecyclePhase::Running);
        match thread::Builder::new()
            .name("control".to_string())
            .spawn(move || worker.run())
        {
            Ok(handle) => self.control_thread = Some(handle),
            Err(e) => {
                // The worker (and its sensors) went down with the closure
                self.shared.signal_shutdown();
                if let Some(h) = self.vision_thread.take() {
                    let _ = h.join();
                }
                self.gate.halt();
                self.shared.set_phase(LifecyclePhase::FailSafeIdle);
                log::error!("Failed to spawn control thread: {}", e);
                return Err(Error::Io(e));
            }
        }

        log::info!(
            "Control loop running ({} stations, {} routines)",
            self.config.stations.len(),
            self.routines.len()
        );
        Ok(())
    }

    /// Stop motion, join the threads and release all hardware. Idempotent.
    pub fn stop(&mut self) -> Result<()> {
        if self.shared.phase() == LifecyclePhase::Stopped {
            return Ok(());
        }
        let epoch = self.gate.halt();
        log::info!("Stopping control loop (stop epoch {})", epoch);
        self.shared.signal_shutdown();

        if let Some(h) = self.control_thread.take()
            && h.join().is_err()
        {
            log::error!("Control thread panicked");
        }
        if let Some(h) = self.vision_thread.take()
            && h.join().is_err()
        {
            log::error!("Vision thread panicked");
        }
        if let Some(mut pending) = self.pending.take() {
            pending.sensors.release_all();
        }

        self.gate.close();
        self.shared.set_phase(LifecyclePhase::Stopped);
        log::info!("Control loop stopped");
        Ok(())
    }

    /// Stop all motion without ending the loop
    pub fn halt(&self) {
        self.handle.halt();
    }

    pub fn submit_external_command(&self, record: &CommandRecord) -> Result<()> {
        self.handle.submit(record)
    }

    pub fn clear_fault(&self) -> Result<()> {
        self.shared.clear_fault()?;
        log::info!("Fault cleared; motion resumes on the next directive");
        Ok(())
    }

    pub fn status(&self) -> StatusSnapshot {
        self.shared.snapshot()
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.shared.phase()
    }

    /// Handle for the command listener thread
    pub fn command_handle(&self) -> CommandHandle {
        self.handle.clone()
    }

    /// Status snapshots and events, for the publisher. Yields `None` after
    /// the first call.
    pub fn take_status_receiver(&mut self) -> Option<Receiver<StatusMessage>> {
        self.events_rx.take()
    }

    /// Returns `Ok(true)` when vision can run, `Err` on a mandatory failure
    fn open_hardware(&self, camera: &mut dyn Camera, sensors: &mut SensorSuite) -> Result<bool> {
        if let Err(e) = self.gate.open() {
            self.degrade("actuator", e)?;
        }
        let camera_ok = match camera.open() {
            Ok(()) => true,
            Err(e) => {
                self.degrade("camera", e)?;
                false
            }
        };
        for sensor in sensors.all_mut() {
            if let Err(e) = sensor.open() {
                self.degrade(sensor.name(), e)?;
            }
        }
        Ok(camera_ok)
    }

    /// Mandatory components fail the start; others are reported and skipped
    fn degrade(&self, component: &str, err: Error) -> Result<()> {
        let reason = match err {
            Error::HardwareInit { reason, .. } => reason,
            other => other.to_string(),
        };
        if self.config.control.is_mandatory(component) {
            return Err(Error::HardwareInit {
                component: component.to_string(),
                reason,
            });
        }
        log::warn!("Running without {}: {}", component, reason);
        let _ = self.events_tx.try_send(StatusMessage::HardwareDegraded {
            component: component.to_string(),
            reason,
        });
        Ok(())
    }

    fn enter_fail_safe(&self, sensors: &mut SensorSuite, cause: &Error) {
        self.gate.halt();
        sensors.release_all();
        self.shared.set_phase(LifecyclePhase::FailSafeIdle);
        log::error!("Entering fail-safe idle: {}", cause);
    }
}

impl Controller for ControlLoop {
    fn start(&mut self) -> Result<()> {
        ControlLoop::start(self)
    }

    fn stop(&mut self) -> Result<()> {
        ControlLoop::stop(self)
    }
}

impl Drop for ControlLoop {
    fn drop(&mut self) {
        if self.shared.phase() != LifecyclePhase::Stopped {
            let _ = self.stop();
        }
    }
}
