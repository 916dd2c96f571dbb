//! BLE scanner — adapter selection and advertisement collection.

use std::time::Duration;

use btleplug::api::{
    Central, CentralEvent, Manager as _, Peripheral as _, PeripheralProperties, ScanFilter,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use tokio_stream::StreamExt as _;

use dicefleet_app::ports::Advertisement;
use dicefleet_domain::codec::{AdvertisementData, SERVICE_UUID};

use crate::error::BleError;

/// Pick the host adapter to use.
///
/// With `wanted`, the first adapter whose info string contains it; otherwise
/// the first adapter reported by the host.
///
/// # Errors
///
/// Returns [`BleError::NotAvailable`] when the host has no adapter and
/// [`BleError::AdapterNotFound`] when none matches `wanted`.
pub(crate) async fn select_adapter(wanted: Option<&str>) -> Result<Adapter, BleError> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;

    let Some(wanted) = wanted else {
        return adapters.into_iter().next().ok_or(BleError::NotAvailable);
    };

    for adapter in adapters {
        let info = adapter.adapter_info().await?;
        if info.contains(wanted) {
            tracing::debug!(%info, "selected BLE adapter");
            return Ok(adapter);
        }
    }
    Err(BleError::AdapterNotFound(wanted.to_owned()))
}

/// Scan for dice advertisements for `duration`.
///
/// Every peripheral that reported an event during the scan is returned with
/// its latest properties; filtering by payload is left to the codec.
///
/// # Errors
///
/// Returns [`BleError`] when the scan cannot be started or stopped.
pub(crate) async fn scan(
    central: &Adapter,
    duration: Duration,
) -> Result<Vec<Advertisement<Peripheral>>, BleError> {
    let mut events = central.events().await?;

    central
        .start_scan(ScanFilter {
            services: vec![SERVICE_UUID],
        })
        .await?;

    let mut seen: Vec<PeripheralId> = Vec::new();
    let deadline = tokio::time::Instant::now() + duration;

    while tokio::time::Instant::now() < deadline {
        let remaining = deadline - tokio::time::Instant::now();
        let id = match tokio::time::timeout(remaining, events.next()).await {
            Ok(Some(
                CentralEvent::DeviceDiscovered(id)
                | CentralEvent::DeviceUpdated(id)
                | CentralEvent::ServiceDataAdvertisement { id, .. }
                | CentralEvent::ManufacturerDataAdvertisement { id, .. }
                | CentralEvent::ServicesAdvertisement { id, .. },
            )) => id,
            Ok(Some(_)) => continue,
            Ok(None) | Err(_) => break,
        };
        if !seen.contains(&id) {
            seen.push(id);
        }
    }

    central.stop_scan().await?;

    let mut advertisements = Vec::with_capacity(seen.len());
    for id in seen {
        let Ok(peripheral) = central.peripheral(&id).await else {
            continue;
        };
        let Ok(Some(properties)) = peripheral.properties().await else {
            continue;
        };
        tracing::trace!(name = ?properties.local_name, rssi = ?properties.rssi, "BLE advertisement");
        advertisements.push(Advertisement {
            data: advertisement_data(&properties),
            peripheral,
        });
    }
    Ok(advertisements)
}

/// Convert btleplug properties into the codec's input.
///
/// btleplug strips the company identifier from manufacturer data; it is put
/// back in front so the payload matches what the die broadcasts.
pub(crate) fn advertisement_data(properties: &PeripheralProperties) -> AdvertisementData {
    let service_data = properties
        .service_data
        .get(&SERVICE_UUID)
        .or_else(|| properties.service_data.values().next())
        .cloned();

    let manufacturer_data = properties
        .manufacturer_data
        .iter()
        .min_by_key(|(company_id, _)| **company_id)
        .map(|(company_id, payload)| {
            let mut data = Vec::with_capacity(payload.len() + 2);
            data.extend_from_slice(&company_id.to_le_bytes());
            data.extend_from_slice(payload);
            data
        });

    AdvertisementData {
        local_name: properties.local_name.clone(),
        services: properties.services.clone(),
        service_data,
        manufacturer_data,
    }
}
