//! Link to a connected virtual die.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

use dicefleet_app::ports::{
    CharacteristicInfo, Link, NotificationStream, ServiceInfo, TransportError,
};
use dicefleet_domain::codec::{NOTIFY_CHARACTERISTIC_UUID, SERVICE_UUID};
use dicefleet_domain::id::DeviceId;

use crate::die::{DieState, Fault};
use crate::{Dice, lock};

/// A live connection to a virtual die. Clones share the connection.
#[derive(Clone)]
pub struct VirtualLink {
    id: DeviceId,
    session: u64,
    dice: Arc<Dice>,
}

impl VirtualLink {
    pub(crate) fn new(id: DeviceId, session: u64, dice: Arc<Dice>) -> Self {
        Self { id, session, dice }
    }

    /// Run `f` on the die if this link's session is still the live one.
    fn with_die<R>(&self, f: impl FnOnce(&mut DieState) -> R) -> Result<R, TransportError> {
        let mut dice = lock(&self.dice);
        match dice.get_mut(&self.id) {
            Some(die) if die.connected && die.session == self.session => Ok(f(die)),
            _ => Err(TransportError::NotConnected),
        }
    }
}

impl Link for VirtualLink {
    async fn is_connected(&self) -> bool {
        self.with_die(|_| ()).is_ok()
    }

    async fn service(&self, uuid: Uuid) -> Result<Option<ServiceInfo>, TransportError> {
        let service = self.with_die(|die| die.service())?;
        Ok(service.filter(|service| service.uuid == uuid))
    }

    async fn subscribe(
        &self,
        characteristic: &CharacteristicInfo,
    ) -> Result<NotificationStream, TransportError> {
        if characteristic.uuid != NOTIFY_CHARACTERISTIC_UUID
            || characteristic.service_uuid != SERVICE_UUID
        {
            return Err(TransportError::Radio(
                format!("cannot subscribe to {}", characteristic.uuid).into(),
            ));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.with_die(|die| die.notifier = Some(tx))?;
        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }

    async fn write(
        &self,
        _characteristic: &CharacteristicInfo,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        self.with_die(|die| {
            if die.fault == Some(Fault::WriteRejected) {
                return Err(TransportError::Radio("write rejected by die".into()));
            }
            die.commands.push(payload.to_vec());
            Ok(())
        })?
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        // Closing a stale or already closed link is a no-op.
        let _ = self.with_die(DieState::disconnect);
        Ok(())
    }
}
