//! GATT link to a connected die.
//!
//! [`BleLink`] wraps a btleplug peripheral whose services were discovered at
//! connect time. Clones share the same underlying connection.

use btleplug::api::{CharPropFlags, Characteristic, Peripheral as _, Service, WriteType};
use btleplug::platform::Peripheral;
use tokio_stream::StreamExt as _;
use uuid::Uuid;

use dicefleet_app::ports::{
    CharacteristicInfo, Link, NotificationStream, ServiceInfo, TransportError,
};

use crate::error::BleError;

/// A live GATT connection.
#[derive(Clone)]
pub struct BleLink {
    peripheral: Peripheral,
}

impl BleLink {
    pub(crate) fn new(peripheral: Peripheral) -> Self {
        Self { peripheral }
    }

    /// Find the btleplug characteristic matching `info`.
    fn find_characteristic(&self, info: &CharacteristicInfo) -> Result<Characteristic, BleError> {
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == info.uuid && c.service_uuid == info.service_uuid)
            .ok_or(BleError::CharacteristicNotFound { uuid: info.uuid })
    }
}

/// Connect to `peripheral` and discover its services.
///
/// The connection is closed again if service discovery fails.
pub(crate) async fn connect(peripheral: &Peripheral) -> Result<BleLink, BleError> {
    if !peripheral.is_connected().await? {
        peripheral.connect().await?;
    }

    if let Err(err) = peripheral.discover_services().await {
        if let Err(close_err) = peripheral.disconnect().await {
            tracing::warn!(err = %close_err, "failed to disconnect after service discovery error");
        }
        return Err(err.into());
    }

    Ok(BleLink::new(peripheral.clone()))
}

fn service_info(service: &Service) -> ServiceInfo {
    ServiceInfo {
        uuid: service.uuid,
        characteristics: service
            .characteristics
            .iter()
            .map(|c| CharacteristicInfo {
                uuid: c.uuid,
                service_uuid: c.service_uuid,
                can_notify: c
                    .properties
                    .intersects(CharPropFlags::NOTIFY | CharPropFlags::INDICATE),
                can_write: c.properties.contains(CharPropFlags::WRITE),
            })
            .collect(),
    }
}

impl Link for BleLink {
    async fn is_connected(&self) -> bool {
        match self.peripheral.is_connected().await {
            Ok(connected) => connected,
            Err(err) => {
                tracing::debug!(%err, "BLE connection state unavailable");
                false
            }
        }
    }

    async fn service(&self, uuid: Uuid) -> Result<Option<ServiceInfo>, TransportError> {
        Ok(self
            .peripheral
            .services()
            .iter()
            .find(|service| service.uuid == uuid)
            .map(service_info))
    }

    async fn subscribe(
        &self,
        characteristic: &CharacteristicInfo,
    ) -> Result<NotificationStream, TransportError> {
        let target = self.find_characteristic(characteristic)?;
        let notifications = self
            .peripheral
            .notifications()
            .await
            .map_err(BleError::from)?;
        self.peripheral
            .subscribe(&target)
            .await
            .map_err(BleError::from)?;

        let uuid = target.uuid;
        Ok(Box::pin(notifications.filter_map(move |notification| {
            (notification.uuid == uuid).then_some(notification.value)
        })))
    }

    async fn write(
        &self,
        characteristic: &CharacteristicInfo,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        let target = self.find_characteristic(characteristic)?;
        self.peripheral
            .write(&target, payload, WriteType::WithResponse)
            .await
            .map_err(BleError::from)?;
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        if self
            .peripheral
            .is_connected()
            .await
            .map_err(BleError::from)?
        {
            self.peripheral
                .disconnect()
                .await
                .map_err(BleError::from)?;
        }
        Ok(())
    }
}
