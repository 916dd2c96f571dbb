//! Command dispatcher — writes opaque commands to connected dice.
//!
//! The write characteristic is resolved on every command. Any failure on a
//! connected die (missing characteristic, not writable, failed write) drops
//! the connection; the die keeps its intent and is retried by the next
//! maintenance pass.

use dicefleet_domain::codec::{SERVICE_UUID, WRITE_CHARACTERISTIC_UUID};
use dicefleet_domain::id::DeviceId;

use crate::error::{FleetError, SetupError, WriteError};
use crate::ports::Link;
use crate::registry::DeviceRegistry;

/// Write `payload` to die `id`.
///
/// # Errors
///
/// - [`FleetError::UnknownDevice`] / [`FleetError::NotConnected`] without
///   touching any state.
/// - [`FleetError::Write`] after the connection was dropped.
pub(crate) async fn send<P: Clone, L: Link>(
    registry: &DeviceRegistry<P, L>,
    id: DeviceId,
    payload: &[u8],
) -> Result<(), FleetError> {
    let (link, generation) = registry.connected_link(id)?;
    send_on(registry, id, &link, generation, payload).await
}

/// Write on a link read from the registry at `generation`. On failure only
/// that connection is dropped, never one established since.
async fn send_on<P: Clone, L: Link>(
    registry: &DeviceRegistry<P, L>,
    id: DeviceId,
    link: &L,
    generation: u64,
    payload: &[u8],
) -> Result<(), FleetError> {
    if let Err(err) = write(link, payload).await {
        if let Some(connection) = registry.detach_connection(id, generation) {
            connection.close(id).await;
        }
        return Err(err.into());
    }

    tracing::debug!(device = %id, len = payload.len(), "command sent");
    Ok(())
}

async fn write<L: Link>(link: &L, payload: &[u8]) -> Result<(), WriteError> {
    let service = link
        .service(SERVICE_UUID)
        .await
        .map_err(WriteError::Failed)?
        .ok_or(WriteError::Lookup(SetupError::ServiceNotFound(SERVICE_UUID)))?;

    let characteristic = service
        .characteristic(WRITE_CHARACTERISTIC_UUID)
        .ok_or(WriteError::Lookup(SetupError::CharacteristicNotFound(
            WRITE_CHARACTERISTIC_UUID,
        )))?;

    if !characteristic.can_write {
        return Err(WriteError::NotWritable(characteristic.uuid));
    }

    link.write(characteristic, payload)
        .await
        .map_err(WriteError::Failed)
}
