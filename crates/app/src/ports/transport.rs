//! Transport port — the radio capability the fleet is built on.
//!
//! A transport discovers advertisers and opens links to them. A [`Link`]
//! exposes the GATT-style operations the fleet needs on a live connection:
//! service and characteristic lookup, notification subscription, writes, and
//! teardown.
//!
//! Implementations live in adapter crates (e.g. `adapter_ble` on top of
//! `btleplug`, `adapter_virtual` for simulated dice). Nothing in this crate
//! depends on a concrete radio library.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio_stream::Stream;
use uuid::Uuid;

use dicefleet_domain::codec::AdvertisementData;

/// Payloads pushed by a subscribed characteristic, in arrival order.
///
/// The stream ends when the link goes away.
pub type NotificationStream = Pin<Box<dyn Stream<Item = Vec<u8>> + Send>>;

/// Errors reported by a transport implementation.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// No radio adapter found on the host.
    #[error("no radio adapter available")]
    NotAvailable,

    /// The operation needs a live link and the peripheral is not connected.
    #[error("peripheral is not connected")]
    NotConnected,

    /// The underlying radio stack failed.
    #[error("radio operation failed")]
    Radio(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// One advertisement seen during a scan.
#[derive(Debug, Clone)]
pub struct Advertisement<P> {
    /// Transport handle used to connect to the advertiser later.
    pub peripheral: P,
    /// Raw advertised payloads.
    pub data: AdvertisementData,
}

/// A characteristic exposed by a connected peripheral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicInfo {
    pub uuid: Uuid,
    pub service_uuid: Uuid,
    pub can_notify: bool,
    pub can_write: bool,
}

/// A service exposed by a connected peripheral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    pub uuid: Uuid,
    pub characteristics: Vec<CharacteristicInfo>,
}

impl ServiceInfo {
    /// Look up a characteristic of this service by UUID.
    #[must_use]
    pub fn characteristic(&self, uuid: Uuid) -> Option<&CharacteristicInfo> {
        self.characteristics.iter().find(|c| c.uuid == uuid)
    }
}

/// Radio capability: discovery and connection establishment.
///
/// This is a **port**: adapters implement it and the fleet only calls it.
/// Scans and connection attempts block the calling task for as long as the
/// underlying stack takes; the fleet applies no timeout of its own.
pub trait Transport: Send + Sync + 'static {
    /// Handle identifying an advertiser, used to connect to it.
    type Peripheral: Clone + Send + Sync + 'static;

    /// A live connection to a peripheral.
    type Link: Link;

    /// Listen for advertisements for `duration` and return what was seen.
    fn scan(
        &self,
        duration: Duration,
    ) -> impl Future<Output = Result<Vec<Advertisement<Self::Peripheral>>, TransportError>> + Send;

    /// Open a link to `peripheral`, with its services already discovered.
    fn connect(
        &self,
        peripheral: &Self::Peripheral,
    ) -> impl Future<Output = Result<Self::Link, TransportError>> + Send;
}

/// Operations on a live connection.
///
/// Links are cheap handles: clones refer to the same connection.
pub trait Link: Clone + Send + Sync + 'static {
    /// Whether the radio still considers the link up.
    fn is_connected(&self) -> impl Future<Output = bool> + Send;

    /// Look up a service by UUID. `Ok(None)` when the peripheral lacks it.
    fn service(
        &self,
        uuid: Uuid,
    ) -> impl Future<Output = Result<Option<ServiceInfo>, TransportError>> + Send;

    /// Enable notifications on `characteristic` and stream their payloads.
    fn subscribe(
        &self,
        characteristic: &CharacteristicInfo,
    ) -> impl Future<Output = Result<NotificationStream, TransportError>> + Send;

    /// Write `payload` to `characteristic`, waiting for the acknowledgement.
    fn write(
        &self,
        characteristic: &CharacteristicInfo,
        payload: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Close the link. Closing an already closed link succeeds.
    fn disconnect(&self) -> impl Future<Output = Result<(), TransportError>> + Send;
}
