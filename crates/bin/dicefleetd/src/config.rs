//! Configuration loading — TOML file with environment variable overrides.
//!
//! Looks for `dicefleet.toml` in the working directory. Every field has a
//! sensible default so the file is optional. Environment variables take
//! precedence over file values.

use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use dicefleet_adapter_ble::BleConfig;
use dicefleet_adapter_virtual::VirtualConfig;
use dicefleet_app::FleetConfig;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Discovery cadence.
    pub scan: ScanConfig,
    /// Fleet sizing.
    pub fleet: FleetConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Which radio to use.
    pub transport: TransportConfig,
    /// BLE transport settings.
    pub ble: BleConfig,
    /// Virtual transport settings.
    #[serde(rename = "virtual")]
    pub virtual_dice: VirtualConfig,
    /// Event output settings.
    pub output: OutputConfig,
}

/// Discovery cadence.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Length of each discovery scan, in seconds.
    pub duration_secs: u64,
    /// Idle time between two scan cycles, in seconds.
    pub interval_secs: u64,
    /// Connect to every die as soon as it is discovered.
    pub auto_connect: bool,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

/// Transport selection.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub kind: TransportKind,
}

/// Available transports.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Host Bluetooth LE adapter.
    #[default]
    Ble,
    /// Simulated dice.
    Virtual,
}

impl FromStr for TransportKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "ble" => Ok(Self::Ble),
            "virtual" => Ok(Self::Virtual),
            other => Err(ConfigError::Validation(format!(
                "unknown transport {other:?}, expected \"ble\" or \"virtual\""
            ))),
        }
    }
}

/// Event output configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// How often the event queues are drained, in milliseconds.
    pub poll_interval_ms: u64,
    /// Blink a die whenever it lands on a face.
    pub blink_on_roll: bool,
}

impl Config {
    /// Load configuration from `dicefleet.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if an
    /// override or the resulting configuration is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file("dicefleet.toml")?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(val) = lookup("DICEFLEET_TRANSPORT") {
            self.transport.kind = val.parse()?;
        }
        if let Some(secs) = lookup("DICEFLEET_SCAN_SECS").and_then(|val| val.parse().ok()) {
            self.scan.duration_secs = secs;
        }
        if let Some(secs) = lookup("DICEFLEET_SCAN_INTERVAL_SECS").and_then(|val| val.parse().ok()) {
            self.scan.interval_secs = secs;
        }
        if let Some(auto) = lookup("DICEFLEET_AUTO_CONNECT").and_then(|val| val.parse().ok()) {
            self.scan.auto_connect = auto;
        }
        if let Some(val) = lookup("DICEFLEET_LOG") {
            self.logging.filter = val;
        }
        if let Some(val) = lookup("RUST_LOG") {
            self.logging.filter = val;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.scan.duration_secs == 0 {
            return Err(ConfigError::Validation(
                "scan duration must be non-zero".to_string(),
            ));
        }
        if self.output.poll_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "poll interval must be non-zero".to_string(),
            ));
        }
        if self.fleet.queue_capacity == 0 {
            return Err(ConfigError::Validation(
                "queue capacity must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl ScanConfig {
    #[must_use]
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl OutputConfig {
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            duration_secs: 5,
            interval_secs: 5,
            auto_connect: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "dicefleetd=info,dicefleet_app=info,dicefleet_adapter_ble=info".to_string(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            blink_on_roll: false,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn should_produce_sensible_defaults() {
        let config = Config::default();
        assert_eq!(config.scan.duration_secs, 5);
        assert_eq!(config.scan.interval_secs, 5);
        assert!(config.scan.auto_connect);
        assert_eq!(config.transport.kind, TransportKind::Ble);
        assert_eq!(config.fleet.queue_capacity, 1000);
        assert_eq!(config.output.poll_interval_ms, 100);
        assert!(!config.output.blink_on_roll);
        assert_eq!(config.virtual_dice.dice.len(), 3);
    }

    #[test]
    fn should_parse_minimal_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.scan.duration_secs, 5);
    }

    #[test]
    fn should_parse_full_toml() {
        let toml = "
            [scan]
            duration_secs = 3
            interval_secs = 10
            auto_connect = false

            [fleet]
            queue_capacity = 50
            max_devices = 8

            [logging]
            filter = 'debug'

            [transport]
            kind = 'virtual'

            [ble]
            adapter = 'hci1'

            [virtual]
            roll_interval_ms = 500

            [[virtual.dice]]
            id = 1
            name = 'Solo'

            [output]
            poll_interval_ms = 250
            blink_on_roll = true
        ";
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.scan.duration(), Duration::from_secs(3));
        assert_eq!(config.scan.interval(), Duration::from_secs(10));
        assert!(!config.scan.auto_connect);
        assert_eq!(config.fleet.queue_capacity, 50);
        assert_eq!(config.fleet.max_devices, Some(8));
        assert_eq!(config.logging.filter, "debug");
        assert_eq!(config.transport.kind, TransportKind::Virtual);
        assert_eq!(config.ble.adapter.as_deref(), Some("hci1"));
        assert_eq!(config.virtual_dice.roll_interval_ms, 500);
        assert_eq!(config.virtual_dice.dice.len(), 1);
        assert_eq!(config.output.poll_interval(), Duration::from_millis(250));
        assert!(config.output.blink_on_roll);
    }

    #[test]
    fn should_return_default_when_file_not_found() {
        let config = Config::from_file("nonexistent.toml").unwrap();
        assert_eq!(config.scan.duration_secs, 5);
    }

    #[test]
    fn should_apply_env_overrides() {
        let mut config = Config::default();
        config
            .apply_overrides(env(&[
                ("DICEFLEET_TRANSPORT", "Virtual"),
                ("DICEFLEET_SCAN_SECS", "2"),
                ("DICEFLEET_SCAN_INTERVAL_SECS", "7"),
                ("DICEFLEET_AUTO_CONNECT", "false"),
                ("DICEFLEET_LOG", "trace"),
            ]))
            .unwrap();

        assert_eq!(config.transport.kind, TransportKind::Virtual);
        assert_eq!(config.scan.duration_secs, 2);
        assert_eq!(config.scan.interval_secs, 7);
        assert!(!config.scan.auto_connect);
        assert_eq!(config.logging.filter, "trace");
    }

    #[test]
    fn should_prefer_rust_log_over_dicefleet_log() {
        let mut config = Config::default();
        config
            .apply_overrides(env(&[("DICEFLEET_LOG", "info"), ("RUST_LOG", "debug")]))
            .unwrap();
        assert_eq!(config.logging.filter, "debug");
    }

    #[test]
    fn should_ignore_unparsable_numeric_overrides() {
        let mut config = Config::default();
        config
            .apply_overrides(env(&[("DICEFLEET_SCAN_SECS", "soon")]))
            .unwrap();
        assert_eq!(config.scan.duration_secs, 5);
    }

    #[test]
    fn should_reject_unknown_transport_override() {
        let mut config = Config::default();
        let result = config.apply_overrides(env(&[("DICEFLEET_TRANSPORT", "zigbee")]));
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn should_reject_zero_scan_duration() {
        let mut config = Config::default();
        config.scan.duration_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_reject_zero_poll_interval() {
        let mut config = Config::default();
        config.output.poll_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_reject_zero_queue_capacity() {
        let mut config = Config::default();
        config.fleet.queue_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_accept_defaults() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn should_report_parse_error_for_invalid_toml() {
        let result: Result<Config, _> = toml::from_str("invalid {{{");
        assert!(result.is_err());
    }
}
