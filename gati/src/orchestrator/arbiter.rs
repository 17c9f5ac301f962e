//! Intent arbitration between station navigation and object following

use crate::core::types::NavigationIntent;
use serde::Serialize;

/// Which unit the applied intent came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentSource {
    Station,
    Vision,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arbitration {
    pub intent: Option<NavigationIntent>,
    pub source: IntentSource,
}

/// Station navigation owns the legs while a station task is active and
/// vision intents are dropped; otherwise object following decides.
pub fn arbitrate(
    station_task_active: bool,
    station_intent: Option<NavigationIntent>,
    vision_intent: Option<NavigationIntent>,
) -> Arbitration {
    let (intent, source) = if station_task_active {
        (station_intent, IntentSource::Station)
    } else {
        (vision_intent, IntentSource::Vision)
    };
    Arbitration {
        intent,
        source: if intent.is_some() {
            source
        } else {
            IntentSource::None
        },
    }
}
