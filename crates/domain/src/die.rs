//! Die — descriptions, telemetry events, and connection status.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Longest name a die can carry, in characters.
pub const MAX_NAME_LEN: usize = 13;

/// Attributes captured once, when a die is first discovered.
///
/// A description is never mutated after the registry record is created. The
/// `Default` value is the zero-value description returned for unknown dice.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescription {
    /// Name as set by the user, at most [`MAX_NAME_LEN`] characters.
    pub name: String,
    /// Number of LEDs (one per face on standard dice).
    pub led_count: u8,
    /// Physical design and color code.
    pub design_color: u8,
    /// Firmware build timestamp (Unix seconds), 0 when not advertised.
    pub build_timestamp: u32,
}

impl DeviceDescription {
    /// Build a description, truncating `name` to [`MAX_NAME_LEN`] characters.
    #[must_use]
    pub fn new(name: &str, led_count: u8, design_color: u8, build_timestamp: u32) -> Self {
        Self {
            name: name.chars().take(MAX_NAME_LEN).collect(),
            led_count,
            design_color,
            build_timestamp,
        }
    }
}

/// Physical state of a die.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollState {
    #[default]
    Unknown,
    OnFace,
    Handling,
    Rolling,
    Crooked,
}

impl RollState {
    /// Map a wire code to a state. Codes outside `0..=4` map to `Unknown`.
    #[must_use]
    pub const fn from_code(code: u8) -> Self {
        match code {
            1 => Self::OnFace,
            2 => Self::Handling,
            3 => Self::Rolling,
            4 => Self::Crooked,
            _ => Self::Unknown,
        }
    }

    /// The wire code of this state.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::OnFace => 1,
            Self::Handling => 2,
            Self::Rolling => 3,
            Self::Crooked => 4,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::OnFace => "on_face",
            Self::Handling => "handling",
            Self::Rolling => "rolling",
            Self::Crooked => "crooked",
        }
    }
}

impl fmt::Display for RollState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A change in rolling state reported by a die.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollEvent {
    pub state: RollState,
    /// Face index currently up (0-based).
    pub face: u8,
}

/// A battery report from a die.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatteryEvent {
    /// Charge in percent (0–100).
    pub level: u8,
    pub charging: bool,
}

/// Connection status of a registry record.
///
/// ```text
/// Discovered ──intent=true──▶ ConnectRequested ──pass──▶ Connecting ──▶ Connected
///      ▲                                                     │              │
///      └──intent=false── (not yet attempted)                 ▼              ▼
///                                                        Disconnected ◀─────┘
/// ```
///
/// `Disconnected` records with intent are retried on every maintenance pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Discovered,
    ConnectRequested,
    Connecting,
    Connected,
    Disconnected,
}

impl ConnectionStatus {
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::ConnectRequested => "connect_requested",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Selects which dice to list.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionFilter {
    #[default]
    Connected,
    /// Every die whose status is not `Connected`.
    Disconnected,
    Any,
}

impl ConnectionFilter {
    #[must_use]
    pub const fn matches(self, status: ConnectionStatus) -> bool {
        match self {
            Self::Connected => status.is_connected(),
            Self::Disconnected => !status.is_connected(),
            Self::Any => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_map_known_roll_state_codes() {
        assert_eq!(RollState::from_code(0), RollState::Unknown);
        assert_eq!(RollState::from_code(1), RollState::OnFace);
        assert_eq!(RollState::from_code(2), RollState::Handling);
        assert_eq!(RollState::from_code(3), RollState::Rolling);
        assert_eq!(RollState::from_code(4), RollState::Crooked);
    }

    #[test]
    fn should_map_out_of_range_roll_state_to_unknown() {
        assert_eq!(RollState::from_code(5), RollState::Unknown);
        assert_eq!(RollState::from_code(0xFF), RollState::Unknown);
    }

    #[test]
    fn should_keep_roll_state_code_stable() {
        for code in 0..=4 {
            assert_eq!(RollState::from_code(code).code(), code);
        }
    }

    #[test]
    fn should_truncate_long_names() {
        let description = DeviceDescription::new("A very long die name", 20, 3, 0);
        assert_eq!(description.name, "A very long d");
        assert_eq!(description.name.chars().count(), MAX_NAME_LEN);
    }

    #[test]
    fn should_default_to_zero_value_description() {
        let description = DeviceDescription::default();
        assert!(description.name.is_empty());
        assert_eq!(description.led_count, 0);
        assert_eq!(description.design_color, 0);
        assert_eq!(description.build_timestamp, 0);
    }

    #[test]
    fn should_filter_by_connection_status() {
        let all = [
            ConnectionStatus::Discovered,
            ConnectionStatus::ConnectRequested,
            ConnectionStatus::Connecting,
            ConnectionStatus::Connected,
            ConnectionStatus::Disconnected,
        ];

        let connected: Vec<_> = all
            .iter()
            .filter(|s| ConnectionFilter::Connected.matches(**s))
            .collect();
        assert_eq!(connected, vec![&ConnectionStatus::Connected]);

        let disconnected = all
            .iter()
            .filter(|s| ConnectionFilter::Disconnected.matches(**s))
            .count();
        assert_eq!(disconnected, 4);

        assert!(all.iter().all(|s| ConnectionFilter::Any.matches(*s)));
    }

    #[test]
    fn should_serialize_roll_state_in_snake_case() {
        let json = serde_json::to_string(&RollState::OnFace).unwrap();
        assert_eq!(json, "\"on_face\"");
    }
}
