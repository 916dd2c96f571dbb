//! # dicefleet-adapter-ble
//!
//! BLE transport — finds dice by their advertisements and drives them over
//! GATT, on top of `btleplug`.
//!
//! ## How it works
//!
//! - [`BleTransport::scan`](dicefleet_app::ports::Transport::scan) runs a
//!   scan filtered on the dice service UUID and returns the latest
//!   properties of every peripheral seen.
//! - [`BleTransport::connect`](dicefleet_app::ports::Transport::connect)
//!   connects and discovers services, yielding a [`BleLink`].
//! - Notifications come from the peripheral's notification stream, filtered
//!   on the subscribed characteristic. Writes are acknowledged
//!   (`WriteType::WithResponse`).
//!
//! ## Dependency rule
//!
//! Same as other adapters: depends on `dicefleet-app` and `dicefleet-domain`.

mod config;
mod error;
mod gatt;
mod scanner;

pub use config::BleConfig;
pub use error::BleError;
pub use gatt::BleLink;

use std::time::Duration;

use btleplug::platform::{Adapter, Peripheral};

use dicefleet_app::ports::{Advertisement, Transport, TransportError};

/// Dice transport backed by a host BLE adapter.
pub struct BleTransport {
    central: Adapter,
}

impl BleTransport {
    /// Open the adapter selected by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`BleError`] when no suitable adapter is available.
    pub async fn new(config: BleConfig) -> Result<Self, BleError> {
        let central = scanner::select_adapter(config.adapter.as_deref()).await?;
        tracing::info!("BLE transport ready");
        Ok(Self { central })
    }
}

impl Transport for BleTransport {
    type Peripheral = Peripheral;
    type Link = BleLink;

    async fn scan(
        &self,
        duration: Duration,
    ) -> Result<Vec<Advertisement<Peripheral>>, TransportError> {
        tracing::debug!(duration_ms = duration.as_millis(), "BLE scan started");
        let advertisements = scanner::scan(&self.central, duration).await?;
        tracing::debug!(count = advertisements.len(), "BLE scan complete");
        Ok(advertisements)
    }

    async fn connect(&self, peripheral: &Peripheral) -> Result<BleLink, TransportError> {
        Ok(gatt::connect(peripheral).await?)
    }
}
