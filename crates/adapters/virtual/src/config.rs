//! Virtual dice configuration.

use serde::Deserialize;

/// One simulated die.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct VirtualDieConfig {
    pub id: u32,
    pub name: String,
    pub led_count: u8,
    pub design_color: u8,
    /// Initial battery level in percent.
    pub battery_level: u8,
}

impl Default for VirtualDieConfig {
    fn default() -> Self {
        Self {
            id: 1,
            name: "Virtual D20".to_owned(),
            led_count: 20,
            design_color: 1,
            battery_level: 100,
        }
    }
}

/// Configuration of the virtual transport.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct VirtualConfig {
    pub dice: Vec<VirtualDieConfig>,
    /// Interval between simulated rolls, in milliseconds. `0` disables the
    /// simulation.
    pub roll_interval_ms: u64,
}

impl Default for VirtualConfig {
    fn default() -> Self {
        let dice = (1..=3)
            .map(|n| VirtualDieConfig {
                id: 0x0D1C_E000 + n,
                name: format!("Virtual D6 {n}"),
                led_count: 6,
                ..VirtualDieConfig::default()
            })
            .collect();
        Self {
            dice,
            roll_interval_ms: 3000,
        }
    }
}
