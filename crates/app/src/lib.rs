//! # dicefleet-app
//!
//! Application layer — the fleet use-cases and the **transport port**.
//!
//! ## Responsibilities
//! - Define the [`Transport`](ports::Transport) / [`Link`](ports::Link) port
//!   that radio adapters implement.
//! - Keep the device registry and drive each die towards its connection
//!   intent (maintenance pass).
//! - Decode notifications into bounded, drop-oldest event queues.
//! - Dispatch commands to connected dice.
//! - Run the background scan/maintenance cycle.
//!
//! Everything is reached through a [`Fleet`] handle.
//!
//! ## Dependency rule
//! Depends on `dicefleet-domain` only (plus `tokio` for tasks and channels).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod event_queue;
pub mod fleet;
pub mod ports;
pub mod registry;
pub mod scheduler;

#[cfg(test)]
mod testing;

pub use connection::PassSummary;
pub use error::{FleetError, SetupError, SubscribeError, WriteError};
pub use event_queue::{BoundedQueue, EventQueues};
pub use fleet::{Fleet, FleetConfig};
pub use registry::DeviceInfo;
pub use scheduler::ScanSettings;
