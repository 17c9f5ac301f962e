//! Thread-safe command intake

use super::control::QueuedTask;
use super::directive::{CommandRecord, CommandValidator};
use super::shared::{LifecyclePhase, SharedState};
use crate::error::{Error, Result};
use crate::motion::ActuationGate;
use crate::streaming::StatusMessage;
use crossbeam_channel::{Sender, TrySendError};
use std::sync::Arc;

/// Cloneable entry point for the command listener and other threads.
///
/// Records are validated here, before anything is queued. `stop` never
/// queues: it halts the actuator directly and bumps the stop epoch, which
/// also invalidates everything queued before it.
#[derive(Clone)]
pub struct CommandHandle {
    validator: Arc<CommandValidator>,
    gate: Arc<ActuationGate>,
    shared: Arc<SharedState>,
    queue: Sender<QueuedTask>,
    events: Sender<StatusMessage>,
}

impl CommandHandle {
    pub(crate) fn new(
        validator: CommandValidator,
        gate: Arc<ActuationGate>,
        shared: Arc<SharedState>,
        queue: Sender<QueuedTask>,
        events: Sender<StatusMessage>,
    ) -> Self {
        Self {
            validator: Arc::new(validator),
            gate,
            shared,
            queue,
            events,
        }
    }

    /// Validate and enqueue. Rejections are also published as events.
    pub fn submit(&self, record: &CommandRecord) -> Result<()> {
        let result = self.try_submit(record);
        if let Err(e) = &result {
            self.report_rejection(&record.kind, &e.to_string());
        }
        result
    }

    /// Publish a rejection that happened before a record could be parsed
    pub fn report_rejection(&self, command: &str, reason: &str) {
        log::warn!("Rejected '{}' command: {}", command, reason);
        let _ = self.events.try_send(StatusMessage::CommandRejected {
            command: command.to_string(),
            reason: reason.to_string(),
        });
    }

    fn try_submit(&self, record: &CommandRecord) -> Result<()> {
        let Some(task) = self.validator.validate(record)?.into_task() else {
            self.halt();
            return Ok(());
        };

        match self.shared.phase() {
            LifecyclePhase::Running => {}
            LifecyclePhase::Fault => {
                return Err(Error::Fault(format!(
                    "control loop faulted: {}",
                    self.shared.fault_reason().unwrap_or_default()
                )));
            }
            _ => return Err(Error::NotRunning),
        }

        let queued = QueuedTask {
            task,
            epoch: self.gate.epoch(),
        };
        self.queue.try_send(queued).map_err(|e| match e {
            TrySendError::Full(_) => Error::InvalidCommand("command queue full".into()),
            TrySendError::Disconnected(_) => Error::NotRunning,
        })
    }

    /// Stop all motion now. Idempotent; valid in every phase.
    pub fn halt(&self) {
        let epoch = self.gate.halt();
        log::info!("Halt requested (stop epoch {})", epoch);
    }
}
