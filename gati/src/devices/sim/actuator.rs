//! Simulated legged platform driver with a shared command log

use crate::error::{Error, Result};
use crate::motion::{Actuator, MotionCommand};
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Commands kept in the log
const LOG_CAPACITY: usize = 1024;

#[derive(Debug, Default)]
struct ActuatorLog {
    commands: VecDeque<MotionCommand>,
    groups: Vec<String>,
    failing_groups: HashSet<String>,
    fail_open: bool,
    fail_apply: bool,
    open: bool,
}

impl ActuatorLog {
    fn push(&mut self, command: MotionCommand) {
        if self.commands.len() == LOG_CAPACITY {
            self.commands.pop_front();
        }
        self.commands.push_back(command);
    }
}

pub struct SimActuator {
    log: Arc<Mutex<ActuatorLog>>,
    group_time: Duration,
}

/// Test and demo access to a [`SimActuator`]
#[derive(Clone)]
pub struct SimActuatorHandle {
    log: Arc<Mutex<ActuatorLog>>,
}

impl SimActuator {
    /// `group_time` is how long each action group takes to play
    pub fn new(group_time: Duration) -> (Self, SimActuatorHandle) {
        let log = Arc::new(Mutex::new(ActuatorLog::default()));
        (
            Self {
                log: Arc::clone(&log),
                group_time,
            },
            SimActuatorHandle { log },
        )
    }
}

impl Actuator for SimActuator {
    fn open(&mut self) -> Result<()> {
        let mut log = self.log.lock();
        if log.fail_open {
            return Err(Error::Actuator("servo bus not responding".into()));
        }
        log.open = true;
        Ok(())
    }

    fn apply(&mut self, command: &MotionCommand) -> Result<()> {
        let mut log = self.log.lock();
        if log.fail_apply {
            return Err(Error::Actuator("servo overcurrent".into()));
        }
        log.push(*command);
        Ok(())
    }

    fn run_group(&mut self, name: &str) -> Result<()> {
        if self.log.lock().failing_groups.contains(name) {
            return Err(Error::Actuator(format!("action group '{}' failed", name)));
        }
        thread::sleep(self.group_time);
        let mut log = self.log.lock();
        log.groups.push(name.to_string());
        log.push(MotionCommand::Halt);
        Ok(())
    }

    fn neutral(&mut self) -> Result<()> {
        self.log.lock().push(MotionCommand::Halt);
        Ok(())
    }

    fn close(&mut self) {
        self.log.lock().open = false;
    }
}

impl SimActuatorHandle {
    pub fn commands(&self) -> Vec<MotionCommand> {
        self.log.lock().commands.iter().copied().collect()
    }

    pub fn last(&self) -> Option<MotionCommand> {
        self.log.lock().commands.back().copied()
    }

    /// True when nothing moved yet or the last command was the neutral pose
    pub fn is_neutral(&self) -> bool {
        self.last().is_none_or(|c| c.is_neutral())
    }

    /// Action groups played to completion
    pub fn groups(&self) -> Vec<String> {
        self.log.lock().groups.clone()
    }

    pub fn is_open(&self) -> bool {
        self.log.lock().open
    }

    pub fn fail_group(&self, name: &str) {
        self.log.lock().failing_groups.insert(name.to_string());
    }

    pub fn fail_open(&self) {
        self.log.lock().fail_open = true;
    }

    pub fn fail_apply(&self, failing: bool) {
        self.log.lock().fail_apply = failing;
    }

    pub fn clear(&self) {
        let mut log = self.log.lock();
        log.commands.clear();
        log.groups.clear();
    }
}
