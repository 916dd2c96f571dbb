//! BLE transport configuration.

use serde::Deserialize;

/// Configuration for the BLE transport.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BleConfig {
    /// Substring of the adapter info string to select (e.g. `"hci1"`).
    ///
    /// When unset, the first adapter reported by the host is used.
    pub adapter: Option<String>,
}
