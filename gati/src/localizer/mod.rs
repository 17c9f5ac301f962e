//! QR/station localizer
//!
//! Decodes station markers from camera frames or the serial scanner and
//! resolves where to go next using each station's next-hop table. Marker
//! payloads look like `STN:shelf_a` (prefix configurable).

use crate::core::types::{Frame, Heading, NavigationIntent, Station};
use serde::{Deserialize, Serialize};

/// Longest accepted station id
pub const MAX_STATION_ID_LEN: usize = 32;

/// Decodes a marker payload from a camera frame
pub trait MarkerDecoder: Send {
    fn decode(&mut self, frame: &Frame) -> Option<String>;
}

/// Recognized station marker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationMarker {
    pub station_id: String,
    /// Raw payload as read
    pub payload: String,
}

/// Where a marker can come from
pub enum MarkerSource<'a> {
    Frame(&'a Frame, &'a mut dyn MarkerDecoder),
    Serial(&'a str),
}

/// Where to go from the current marker toward a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "direction", content = "heading")]
pub enum NavigationDirection {
    Arrived,
    Head(Heading),
    /// Known station with no hop toward the target; keep going
    Continue,
    UnknownStation,
}

/// `[A-Za-z0-9_-]{1,32}`
pub fn is_valid_station_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_STATION_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Parse `<prefix>:<station-id>`; anything else is `None`
pub fn parse_marker(payload: &str, prefix: &str) -> Option<StationMarker> {
    let trimmed = payload.trim();
    let (p, id) = trimmed.split_once(':')?;
    if p != prefix || !is_valid_station_id(id) {
        return None;
    }
    Some(StationMarker {
        station_id: id.to_string(),
        payload: trimmed.to_string(),
    })
}

/// Decode a marker from either source. Malformed input is never an error.
pub fn scan(source: MarkerSource<'_>, prefix: &str) -> Option<StationMarker> {
    match source {
        MarkerSource::Frame(frame, decoder) => {
            let payload = decoder.decode(frame)?;
            parse_marker(&payload, prefix)
        }
        MarkerSource::Serial(payload) => parse_marker(payload, prefix),
    }
}

/// Resolve the next move from `marker` toward station `target`
pub fn resolve(marker: &StationMarker, stations: &[Station], target: &str) -> NavigationDirection {
    let Some(station) = stations.iter().find(|s| s.id == marker.station_id) else {
        return NavigationDirection::UnknownStation;
    };
    if station.id == target {
        return NavigationDirection::Arrived;
    }
    match station.next_hop.get(target) {
        Some(&heading) => NavigationDirection::Head(heading),
        None => NavigationDirection::Continue,
    }
}

/// Station lock state
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LocalizerState {
    #[default]
    Scanning,
    Locked {
        station: String,
    },
}

/// Tracks the last recognized station during a navigation task and turns
/// directions into intents.
#[derive(Debug)]
pub struct StationLocalizer {
    stations: Vec<Station>,
    state: LocalizerState,
    last_direction: Option<NavigationDirection>,
}

impl StationLocalizer {
    pub fn new(stations: Vec<Station>) -> Self {
        Self {
            stations,
            state: LocalizerState::Scanning,
            last_direction: None,
        }
    }

    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    pub fn state(&self) -> &LocalizerState {
        &self.state
    }

    pub fn last_direction(&self) -> Option<NavigationDirection> {
        self.last_direction
    }

    /// Forget the current lock; called when a new task starts
    pub fn reset(&mut self) {
        self.state = LocalizerState::Scanning;
        self.last_direction = None;
    }

    /// Fold one (optional) marker observation into an intent toward `target`.
    ///
    /// A visible marker decides the intent. Between markers a locked
    /// localizer proceeds forward, except after arrival, where it stays
    /// stopped.
    pub fn observe(&mut self, marker: Option<&StationMarker>, target: &str) -> NavigationIntent {
        let Some(marker) = marker else {
            return match (&self.state, self.last_direction) {
                (LocalizerState::Locked { .. }, Some(NavigationDirection::Arrived)) => {
                    NavigationIntent::Stop
                }
                (LocalizerState::Locked { .. }, _) => NavigationIntent::Locked,
                (LocalizerState::Scanning, _) => NavigationIntent::Scanning,
            };
        };

        let direction = resolve(marker, &self.stations, target);
        if self.last_direction != Some(direction) {
            log::debug!(
                "Station '{}' toward '{}': {:?}",
                marker.station_id,
                target,
                direction
            );
        }
        self.last_direction = Some(direction);

        if direction == NavigationDirection::UnknownStation {
            log::warn!("Unknown station marker '{}'", marker.payload);
            self.state = LocalizerState::Scanning;
            return NavigationIntent::Scanning;
        }
        self.state = LocalizerState::Locked {
            station: marker.station_id.clone(),
        };
        direction_intent(direction)
    }
}

/// Map a resolved direction onto the shared intent vocabulary
pub fn direction_intent(direction: NavigationDirection) -> NavigationIntent {
    match direction {
        NavigationDirection::Arrived => NavigationIntent::Stop,
        NavigationDirection::Head(Heading::Left) => NavigationIntent::TurnLeft,
        NavigationDirection::Head(Heading::Right) => NavigationIntent::TurnRight,
        NavigationDirection::Head(Heading::Forward) | NavigationDirection::Continue => {
            NavigationIntent::Locked
        }
        NavigationDirection::UnknownStation => NavigationIntent::Scanning,
    }
}
