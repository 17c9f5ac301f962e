//! External command records and their validation
//!
//! Records arrive as `{ "type": ..., "params": {...} }`. Only a validated
//! [`Directive`] ever reaches the control thread.

use crate::config::GatiConfig;
use crate::error::{Error, Result};
use crate::motion::MoveDirection;
use crate::routines::RoutineLibrary;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Raw command as received on the command port
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandRecord {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl CommandRecord {
    pub fn new(kind: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            params,
        }
    }
}

/// A command that passed validation
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    Move {
        direction: MoveDirection,
        duration_ms: u64,
    },
    Stop,
    NavigateToStation {
        station: String,
    },
    RunRoutine {
        name: String,
    },
}

/// Work queued for the control thread. `Stop` never queues; it halts the
/// gate on the submitting thread.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Task {
    Move {
        direction: MoveDirection,
        duration_ms: u64,
    },
    NavigateToStation {
        station: String,
    },
    RunRoutine {
        name: String,
    },
}

impl Directive {
    /// `None` for `Stop`
    pub(crate) fn into_task(self) -> Option<Task> {
        match self {
            Directive::Move {
                direction,
                duration_ms,
            } => Some(Task::Move {
                direction,
                duration_ms,
            }),
            Directive::Stop => None,
            Directive::NavigateToStation { station } => Some(Task::NavigateToStation { station }),
            Directive::RunRoutine { name } => Some(Task::RunRoutine { name }),
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct MoveParams {
    direction: MoveDirection,
    duration_ms: u64,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct StationParams {
    station: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RoutineParams {
    name: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct NoParams {}

/// Checks records against the schema, the configured stations and the
/// routine catalog
#[derive(Debug, Clone)]
pub struct CommandValidator {
    stations: HashSet<String>,
    routines: HashSet<String>,
    max_move_ms: u64,
}

impl CommandValidator {
    pub fn new(config: &GatiConfig, routines: &RoutineLibrary) -> Self {
        Self {
            stations: config.stations.iter().map(|s| s.id.clone()).collect(),
            routines: routines.names().map(str::to_string).collect(),
            max_move_ms: config.control.max_move_ms,
        }
    }

    pub fn validate(&self, record: &CommandRecord) -> Result<Directive> {
        match record.kind.as_str() {
            "move" => {
                let p: MoveParams = params(record)?;
                if p.duration_ms == 0 || p.duration_ms > self.max_move_ms {
                    return Err(Error::InvalidCommand(format!(
                        "move: duration_ms {} outside 1..={}",
                        p.duration_ms, self.max_move_ms
                    )));
                }
                Ok(Directive::Move {
                    direction: p.direction,
                    duration_ms: p.duration_ms,
                })
            }
            "stop" => {
                let _: NoParams = params(record)?;
                Ok(Directive::Stop)
            }
            "navigate_to_station" => {
                let p: StationParams = params(record)?;
                if !self.stations.contains(&p.station) {
                    return Err(Error::InvalidCommand(format!(
                        "unknown station '{}'",
                        p.station
                    )));
                }
                Ok(Directive::NavigateToStation { station: p.station })
            }
            "run_routine" => {
                let p: RoutineParams = params(record)?;
                if !self.routines.contains(&p.name) {
                    return Err(Error::InvalidCommand(format!(
                        "unknown routine '{}'",
                        p.name
                    )));
                }
                Ok(Directive::RunRoutine { name: p.name })
            }
            other => Err(Error::InvalidCommand(format!(
                "unknown command type '{}'",
                other
            ))),
        }
    }
}

/// Absent params read as `{}`
fn params<T: DeserializeOwned>(record: &CommandRecord) -> Result<T> {
    let value = match &record.params {
        serde_json::Value::Null => serde_json::Value::Object(Default::default()),
        v => v.clone(),
    };
    serde_json::from_value(value)
        .map_err(|e| Error::InvalidCommand(format!("{}: {}", record.kind, e)))
}
