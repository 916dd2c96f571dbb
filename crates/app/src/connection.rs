//! Connection state machine — one maintenance pass over the registry.
//!
//! A pass reconciles every record with its intent:
//!
//! 1. connected links that dropped underneath us are released,
//! 2. records with intent that are not connected get a connection attempt,
//! 3. connected records without intent are torn down.
//!
//! Radio calls happen without the registry lock; the registry is told the
//! outcome afterwards.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;

use dicefleet_domain::codec::{NOTIFY_CHARACTERISTIC_UUID, SERVICE_UUID, WRITE_CHARACTERISTIC_UUID};
use dicefleet_domain::id::DeviceId;

use crate::error::{FleetError, SetupError, SubscribeError};
use crate::event_queue::NotificationMessage;
use crate::ports::{Link, NotificationStream, Transport};
use crate::registry::{ActiveConnection, DeviceRegistry};

/// Outcome counters of one maintenance pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassSummary {
    /// Links found dead by the liveness check.
    pub dropped: usize,
    /// Connections established.
    pub connected: usize,
    /// Connection attempts that failed.
    pub failed: usize,
    /// Connections closed because intent was cleared.
    pub disconnected: usize,
}

/// Run one maintenance pass.
pub(crate) async fn run_pass<T: Transport>(
    transport: &T,
    registry: &DeviceRegistry<T::Peripheral, T::Link>,
    notifications: &mpsc::Sender<NotificationMessage>,
) -> PassSummary {
    let mut summary = PassSummary {
        dropped: release_dropped_links(registry).await,
        ..PassSummary::default()
    };

    let plan = registry.plan_maintenance();

    for (id, connection) in plan.teardown {
        connection.close(id).await;
        tracing::info!(device = %id, "disconnected");
        summary.disconnected += 1;
    }

    for (id, peripheral) in plan.connect {
        match establish(transport, id, &peripheral, notifications).await {
            Ok(connection) => {
                if let Some(stale) = registry.mark_connected(id, connection) {
                    stale.close(id).await;
                }
                tracing::info!(device = %id, "connected");
                summary.connected += 1;
            }
            Err(err) => {
                tracing::warn!(%err, device = %id, "connection attempt failed");
                registry.mark_failed(id);
                summary.failed += 1;
            }
        }
    }

    tracing::debug!(
        dropped = summary.dropped,
        connected = summary.connected,
        failed = summary.failed,
        disconnected = summary.disconnected,
        "maintenance pass complete"
    );
    summary
}

/// Move connected records whose link went down to `Disconnected`.
async fn release_dropped_links<P: Clone, L: Link>(registry: &DeviceRegistry<P, L>) -> usize {
    let mut dropped = 0;
    for (id, link, generation) in registry.held_links() {
        if link.is_connected().await {
            continue;
        }
        tracing::warn!(device = %id, "link dropped");
        if let Some(connection) = registry.detach_connection(id, generation) {
            connection.close(id).await;
            dropped += 1;
        }
    }
    dropped
}

/// Connect to a die and enable its notifications.
///
/// On any failure after the radio-level connect the link is closed again.
async fn establish<T: Transport>(
    transport: &T,
    id: DeviceId,
    peripheral: &T::Peripheral,
    notifications: &mpsc::Sender<NotificationMessage>,
) -> Result<ActiveConnection<T::Link>, FleetError> {
    tracing::debug!(device = %id, "connecting");
    let link = transport.connect(peripheral).await?;

    match set_up(&link, id, notifications).await {
        Ok(forwarder) => Ok(ActiveConnection::new(link, forwarder)),
        Err(err) => {
            if let Err(close_err) = link.disconnect().await {
                tracing::debug!(err = %close_err, device = %id, "failed to close link after setup error");
            }
            Err(err)
        }
    }
}

async fn set_up<L: Link>(
    link: &L,
    id: DeviceId,
    notifications: &mpsc::Sender<NotificationMessage>,
) -> Result<JoinHandle<()>, FleetError> {
    let service = link
        .service(SERVICE_UUID)
        .await?
        .ok_or(SetupError::ServiceNotFound(SERVICE_UUID))?;

    let notify = service
        .characteristic(NOTIFY_CHARACTERISTIC_UUID)
        .ok_or(SetupError::CharacteristicNotFound(NOTIFY_CHARACTERISTIC_UUID))?;
    service
        .characteristic(WRITE_CHARACTERISTIC_UUID)
        .ok_or(SetupError::CharacteristicNotFound(WRITE_CHARACTERISTIC_UUID))?;

    if !notify.can_notify {
        return Err(SubscribeError::Unsupported(notify.uuid).into());
    }

    let stream = link
        .subscribe(notify)
        .await
        .map_err(SubscribeError::Failed)?;

    Ok(tokio::spawn(forward(id, stream, notifications.clone())))
}

/// Tag each payload of `stream` with `id` and hand it to the event pump.
async fn forward(
    id: DeviceId,
    mut stream: NotificationStream,
    notifications: mpsc::Sender<NotificationMessage>,
) {
    while let Some(payload) = stream.next().await {
        if notifications
            .send(NotificationMessage { id, payload })
            .await
            .is_err()
        {
            break;
        }
    }
    tracing::debug!(device = %id, "notification stream ended");
}
