//! Actuator capability and the halt-latching gate in front of it.

use super::MotionCommand;
use crate::error::{Error, Result};
use parking_lot::Mutex;

/// Low-level legged platform driver
pub trait Actuator: Send {
    fn open(&mut self) -> Result<()>;

    fn apply(&mut self, command: &MotionCommand) -> Result<()>;

    /// Run a named platform action group (e.g. "grab") to completion
    fn run_group(&mut self, name: &str) -> Result<()>;

    /// Command the neutral standing pose
    fn neutral(&mut self) -> Result<()>;

    fn close(&mut self) {}
}

struct ActuatorSlot {
    actuator: Box<dyn Actuator>,
    last: Option<MotionCommand>,
}

#[derive(Debug, Default)]
struct HaltLatch {
    epoch: u64,
    halted: bool,
}

/// Serializes all actuation and enforces stop ordering.
///
/// `halt()` latches before taking the actuator lock; `apply()` checks the
/// latch while holding it. A command computed before a halt therefore either
/// lands before the halt's neutral pose or is refused with `Error::Halted`.
/// Every halt bumps the stop epoch; `resume()` only clears the latch for the
/// epoch its caller observed.
pub struct ActuationGate {
    slot: Mutex<ActuatorSlot>,
    latch: Mutex<HaltLatch>,
}

impl ActuationGate {
    pub fn new(actuator: Box<dyn Actuator>) -> Self {
        Self {
            slot: Mutex::new(ActuatorSlot {
                actuator,
                last: None,
            }),
            latch: Mutex::new(HaltLatch::default()),
        }
    }

    pub fn open(&self) -> Result<()> {
        self.slot
            .lock()
            .actuator
            .open()
            .map_err(|e| Error::hardware_init("actuator", e))
    }

    /// Send a gait. `Halt` is always accepted; anything else is refused
    /// while latched.
    pub fn apply(&self, command: MotionCommand) -> Result<()> {
        let mut slot = self.slot.lock();
        if command != MotionCommand::Halt && self.latch.lock().halted {
            return Err(Error::Halted);
        }
        match command {
            MotionCommand::Halt => slot.actuator.neutral()?,
            _ => slot.actuator.apply(&command)?,
        }
        slot.last = Some(command);
        Ok(())
    }

    /// Blocking action group; refused while latched
    pub fn run_group(&self, name: &str) -> Result<()> {
        let mut slot = self.slot.lock();
        if self.latch.lock().halted {
            return Err(Error::Halted);
        }
        slot.last = None;
        slot.actuator.run_group(name)?;
        slot.last = Some(MotionCommand::Halt);
        Ok(())
    }

    /// Neutral pose without latching
    pub fn neutral(&self) -> Result<()> {
        self.apply(MotionCommand::Halt)
    }

    /// Latch, bump the stop epoch and command neutral. Returns the new epoch.
    pub fn halt(&self) -> u64 {
        let epoch = {
            let mut latch = self.latch.lock();
            latch.epoch += 1;
            latch.halted = true;
            latch.epoch
        };
        if let Err(e) = self.neutral() {
            log::error!("Failed to command neutral pose on halt: {}", e);
        }
        epoch
    }

    pub fn epoch(&self) -> u64 {
        self.latch.lock().epoch
    }

    pub fn is_halted(&self) -> bool {
        self.latch.lock().halted
    }

    /// Clear the latch if no halt happened since `observed_epoch`
    pub fn resume(&self, observed_epoch: u64) -> bool {
        let mut latch = self.latch.lock();
        if latch.epoch == observed_epoch {
            latch.halted = false;
            true
        } else {
            false
        }
    }

    /// Last command that reached the actuator
    pub fn last_command(&self) -> Option<MotionCommand> {
        self.slot.lock().last
    }

    /// Neutral, then release the driver
    pub fn close(&self) {
        let mut slot = self.slot.lock();
        if let Err(e) = slot.actuator.neutral() {
            log::error!("Failed to command neutral pose on close: {}", e);
        }
        slot.last = Some(MotionCommand::Halt);
        slot.actuator.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Default)]
    struct Log {
        commands: Vec<MotionCommand>,
        groups: Vec<String>,
    }

    struct RecordingActuator(Arc<Mutex<Log>>);

    impl Actuator for RecordingActuator {
        fn open(&mut self) -> Result<()> {
            Ok(())
        }
        fn apply(&mut self, command: &MotionCommand) -> Result<()> {
            self.0.lock().commands.push(*command);
            Ok(())
        }
        fn run_group(&mut self, name: &str) -> Result<()> {
            self.0.lock().groups.push(name.to_string());
            Ok(())
        }
        fn neutral(&mut self) -> Result<()> {
            self.0.lock().commands.push(MotionCommand::Halt);
            Ok(())
        }
    }

    fn gate() -> (ActuationGate, Arc<Mutex<Log>>) {
        let log = Arc::new(Mutex::new(Log::default()));
        (
            ActuationGate::new(Box::new(RecordingActuator(Arc::clone(&log)))),
            log,
        )
    }

    #[test]
    fn test_halt_latches_motion() {
        let (gate, log) = gate();
        gate.apply(MotionCommand::walk(0.5, 0.0, 0.0)).unwrap();
        let epoch = gate.halt();
        assert_eq!(epoch, 1);
        assert!(matches!(
            gate.apply(MotionCommand::walk(0.5, 0.0, 0.0)),
            Err(Error::Halted)
        ));
        assert!(matches!(gate.run_group("grab"), Err(Error::Halted)));
        assert_eq!(log.lock().commands.last(), Some(&MotionCommand::Halt));
        assert!(log.lock().groups.is_empty());
    }

    #[test]
    fn test_halt_always_accepted_while_latched() {
        let (gate, _log) = gate();
        gate.halt();
        assert!(gate.apply(MotionCommand::Halt).is_ok());
        assert_eq!(gate.last_command(), Some(MotionCommand::Halt));
    }

    #[test]
    fn test_resume_requires_current_epoch() {
        let (gate, _log) = gate();
        let observed = gate.epoch();
        gate.halt();
        assert!(!gate.resume(observed));
        assert!(gate.is_halted());
        assert!(gate.resume(gate.epoch()));
        assert!(gate.apply(MotionCommand::walk(0.2, 0.0, 0.0)).is_ok());
    }

    #[test]
    fn test_halt_from_other_thread_blocks_later_commands() {
        let (gate, log) = gate();
        let gate = Arc::new(gate);
        let g = Arc::clone(&gate);
        std::thread::spawn(move || {
            g.halt();
        })
        .join()
        .unwrap();
        assert!(gate.apply(MotionCommand::walk(1.0, 0.0, 0.0)).is_err());
        assert!(log.lock().commands.iter().all(|c| c.is_neutral()));
    }
}
