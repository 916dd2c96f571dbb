//! JSON-line rendering of fleet events.

use chrono::{DateTime, Utc};
use serde::Serialize;

use dicefleet_domain::die::{BatteryEvent, RollEvent, RollState};
use dicefleet_domain::id::DeviceId;

/// One output line.
#[derive(Debug, Serialize)]
pub struct EventLine<'a> {
    pub time: DateTime<Utc>,
    /// Die id as 8 hex digits.
    pub id: String,
    pub name: &'a str,
    #[serde(flatten)]
    pub event: EventKind,
}

/// Payload of an output line, tagged by `kind`.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    Roll { state: RollState, face: u8 },
    Battery { level: u8, charging: bool },
}

impl From<RollEvent> for EventKind {
    fn from(event: RollEvent) -> Self {
        Self::Roll {
            state: event.state,
            face: event.face,
        }
    }
}

impl From<BatteryEvent> for EventKind {
    fn from(event: BatteryEvent) -> Self {
        Self::Battery {
            level: event.level,
            charging: event.charging,
        }
    }
}

impl<'a> EventLine<'a> {
    pub fn new(time: DateTime<Utc>, id: DeviceId, name: &'a str, event: impl Into<EventKind>) -> Self {
        Self {
            time,
            id: id.to_string(),
            name,
            event: event.into(),
        }
    }

    /// Render as a single JSON line.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn render(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
