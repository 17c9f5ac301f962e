//! Messages on the command and status ports

use crate::orchestrator::StatusSnapshot;
use serde::{Deserialize, Serialize};

pub use crate::orchestrator::CommandRecord;

/// Reply to every inbound command frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub accepted: bool,
    pub reason: Option<String>,
}

impl Ack {
    pub fn accepted() -> Self {
        Self {
            accepted: true,
            reason: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            accepted: false,
            reason: Some(reason.into()),
        }
    }
}

/// Outbound status feed: periodic snapshots plus events
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatusMessage {
    Status(StatusSnapshot),
    Fault {
        reason: String,
    },
    RoutineAborted {
        routine: String,
        step: usize,
        reason: String,
    },
    CommandRejected {
        command: String,
        reason: String,
    },
    HardwareDegraded {
        component: String,
        reason: String,
    },
}

impl StatusMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Status(_) => "status",
            Self::Fault { .. } => "fault",
            Self::RoutineAborted { .. } => "routine_aborted",
            Self::CommandRejected { .. } => "command_rejected",
            Self::HardwareDegraded { .. } => "hardware_degraded",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ack_json() {
        let json = serde_json::to_string(&Ack::rejected("unknown station 'x'")).unwrap();
        assert_eq!(json, r#"{"accepted":false,"reason":"unknown station 'x'"}"#);
        let ok: Ack = serde_json::from_str(r#"{"accepted":true,"reason":null}"#).unwrap();
        assert_eq!(ok, Ack::accepted());
    }

    #[test]
    fn test_event_is_tagged() {
        let msg = StatusMessage::RoutineAborted {
            routine: "patrol".into(),
            step: 3,
            reason: "jam".into(),
        };
        let v: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["kind"], "routine_aborted");
        assert_eq!(v["step"], 3);
        assert_eq!(msg.kind(), "routine_aborted");
    }
}
