//! Fleet error types.
//!
//! None of these are fatal: connection problems degrade a die to
//! `Disconnected` (retried on the next maintenance pass) and command problems
//! make the public API report `false`.

use uuid::Uuid;

use dicefleet_domain::id::DeviceId;

use crate::ports::TransportError;

/// Errors raised while managing the fleet.
#[derive(Debug, thiserror::Error)]
pub enum FleetError {
    /// The id was never discovered.
    #[error("unknown device {0}")]
    UnknownDevice(DeviceId),

    /// The operation requires a connected die.
    #[error("device {0} is not connected")]
    NotConnected(DeviceId),

    /// The registry reached its configured capacity.
    #[error("registry is full ({capacity} devices)")]
    RegistryFull {
        /// Configured maximum number of devices.
        capacity: usize,
    },

    /// The link came up but the die's service layout is not usable.
    #[error("connection setup failed")]
    ConnectionSetup(#[source] SetupError),

    /// Notifications could not be enabled.
    #[error("notification subscription failed")]
    NotifySubscription(#[source] SubscribeError),

    /// A command could not be written.
    #[error("command write failed")]
    Write(#[source] WriteError),

    /// The transport failed (scan, connect, lookup).
    #[error("transport error")]
    Transport(#[from] TransportError),

    /// The fleet was shut down.
    #[error("fleet is shut down")]
    ShutDown,
}

/// Missing pieces of the die's GATT layout.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("service {0} not found")]
    ServiceNotFound(Uuid),

    #[error("characteristic {0} not found")]
    CharacteristicNotFound(Uuid),
}

/// Why notifications could not be enabled.
#[derive(Debug, thiserror::Error)]
pub enum SubscribeError {
    #[error("characteristic {0} does not support notifications")]
    Unsupported(Uuid),

    #[error("subscribe request failed")]
    Failed(#[source] TransportError),
}

/// Why a command could not be written.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("write characteristic unavailable")]
    Lookup(#[source] SetupError),

    #[error("characteristic {0} is not writable")]
    NotWritable(Uuid),

    #[error("write request failed")]
    Failed(#[source] TransportError),
}

impl From<SetupError> for FleetError {
    fn from(err: SetupError) -> Self {
        Self::ConnectionSetup(err)
    }
}

impl From<SubscribeError> for FleetError {
    fn from(err: SubscribeError) -> Self {
        Self::NotifySubscription(err)
    }
}

impl From<WriteError> for FleetError {
    fn from(err: WriteError) -> Self {
        Self::Write(err)
    }
}
