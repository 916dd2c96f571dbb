//! Device registry — the single source of truth for discovered dice.
//!
//! One record per [`DeviceId`], created at first discovery and never
//! removed. A record owns the live link to its die while (and only while)
//! its status is `Connected`.
//!
//! The registry lock is held for one read/modify/write at a time and never
//! across a radio call: the maintenance pass takes a [`MaintenancePlan`],
//! performs the radio work unlocked, then reports outcomes back.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;

use dicefleet_domain::codec::ParsedAdvertisement;
use dicefleet_domain::die::{
    BatteryEvent, ConnectionFilter, ConnectionStatus, DeviceDescription, RollEvent,
};
use dicefleet_domain::id::DeviceId;

use crate::error::FleetError;
use crate::ports::Link;

/// A live connection: the link plus the task forwarding its notifications.
#[derive(Debug)]
pub(crate) struct ActiveConnection<L> {
    link: L,
    forwarder: JoinHandle<()>,
}

impl<L> ActiveConnection<L> {
    pub(crate) fn new(link: L, forwarder: JoinHandle<()>) -> Self {
        Self { link, forwarder }
    }
}

impl<L: Link> ActiveConnection<L> {
    /// Stop forwarding notifications and close the link.
    pub(crate) async fn close(self, id: DeviceId) {
        self.forwarder.abort();
        if let Err(err) = self.link.disconnect().await {
            tracing::warn!(%err, device = %id, "failed to close link");
        }
    }
}

/// Point-in-time view of a registry record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: DeviceId,
    pub description: DeviceDescription,
    /// Whether the fleet should hold a connection to this die.
    pub intent: bool,
    pub status: ConnectionStatus,
    /// Latest roll state seen in an advertisement.
    pub advertised_roll: Option<RollEvent>,
    /// Latest battery state seen in an advertisement.
    pub advertised_battery: Option<BatteryEvent>,
}

struct DeviceRecord<P, L> {
    description: DeviceDescription,
    peripheral: P,
    intent: bool,
    status: ConnectionStatus,
    connection: Option<ActiveConnection<L>>,
    /// Bumped on every successful connection.
    generation: u64,
    advertised_roll: Option<RollEvent>,
    advertised_battery: Option<BatteryEvent>,
}

impl<P, L> DeviceRecord<P, L> {
    fn set_intent(&mut self, intent: bool) {
        self.intent = intent;
        self.status = match (intent, self.status) {
            (true, ConnectionStatus::Discovered) => ConnectionStatus::ConnectRequested,
            (false, ConnectionStatus::ConnectRequested) => ConnectionStatus::Discovered,
            (_, status) => status,
        };
    }

    fn take_connection(&mut self) -> Option<ActiveConnection<L>> {
        self.status = ConnectionStatus::Disconnected;
        self.connection.take()
    }
}

/// Work decided by the registry for one maintenance pass.
pub(crate) struct MaintenancePlan<P, L> {
    /// Dice to connect to, already marked `Connecting`.
    pub(crate) connect: Vec<(DeviceId, P)>,
    /// Connections to close, already detached and marked `Disconnected`.
    pub(crate) teardown: Vec<(DeviceId, ActiveConnection<L>)>,
}

/// Registry of every die discovered so far.
pub struct DeviceRegistry<P, L> {
    records: Mutex<BTreeMap<DeviceId, DeviceRecord<P, L>>>,
    max_devices: Option<usize>,
}

impl<P: Clone, L: Clone> DeviceRegistry<P, L> {
    /// Create an empty registry, optionally capped at `max_devices` records.
    #[must_use]
    pub fn new(max_devices: Option<usize>) -> Self {
        Self {
            records: Mutex::new(BTreeMap::new()),
            max_devices,
        }
    }

    /// Insert a record for a newly seen die, or refresh the advertised state
    /// of a known one. Descriptions are never overwritten.
    ///
    /// Returns `true` when a record was created.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::RegistryFull`] when the die is new and the
    /// registry is at capacity.
    pub(crate) fn record_advertisement(
        &self,
        parsed: ParsedAdvertisement,
        peripheral: P,
        auto_connect: bool,
    ) -> Result<bool, FleetError> {
        let mut records = self.lock();

        if let Some(record) = records.get_mut(&parsed.id) {
            if parsed.roll.is_some() {
                record.advertised_roll = parsed.roll;
            }
            if parsed.battery.is_some() {
                record.advertised_battery = parsed.battery;
            }
            return Ok(false);
        }

        if let Some(capacity) = self.max_devices
            && records.len() >= capacity
        {
            return Err(FleetError::RegistryFull { capacity });
        }

        let mut record = DeviceRecord {
            description: parsed.description,
            peripheral,
            intent: false,
            status: ConnectionStatus::Discovered,
            connection: None,
            generation: 0,
            advertised_roll: parsed.roll,
            advertised_battery: parsed.battery,
        };
        if auto_connect {
            record.set_intent(true);
        }
        records.insert(parsed.id, record);
        Ok(true)
    }

    /// Set the connection intent of a die. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::UnknownDevice`] if `id` was never discovered.
    pub fn set_intent(&self, id: DeviceId, intent: bool) -> Result<(), FleetError> {
        let mut records = self.lock();
        let record = records
            .get_mut(&id)
            .ok_or(FleetError::UnknownDevice(id))?;
        record.set_intent(intent);
        Ok(())
    }

    /// Ids of the dice matching `filter`, in ascending id order.
    #[must_use]
    pub fn list(&self, filter: ConnectionFilter) -> Vec<DeviceId> {
        self.lock()
            .iter()
            .filter(|(_, record)| filter.matches(record.status))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Description captured at discovery.
    #[must_use]
    pub fn description(&self, id: DeviceId) -> Option<DeviceDescription> {
        self.lock().get(&id).map(|record| record.description.clone())
    }

    /// Snapshot of one record.
    #[must_use]
    pub fn info(&self, id: DeviceId) -> Option<DeviceInfo> {
        self.lock().get(&id).map(|record| DeviceInfo {
            id,
            description: record.description.clone(),
            intent: record.intent,
            status: record.status,
            advertised_roll: record.advertised_roll,
            advertised_battery: record.advertised_battery,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Link of a connected die, with the generation of its connection.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::UnknownDevice`] or [`FleetError::NotConnected`].
    pub(crate) fn connected_link(&self, id: DeviceId) -> Result<(L, u64), FleetError> {
        let records = self.lock();
        let record = records.get(&id).ok_or(FleetError::UnknownDevice(id))?;
        match (&record.connection, record.status) {
            (Some(connection), ConnectionStatus::Connected) => {
                Ok((connection.link.clone(), record.generation))
            }
            _ => Err(FleetError::NotConnected(id)),
        }
    }

    /// Links of every connected die that should stay connected.
    pub(crate) fn held_links(&self) -> Vec<(DeviceId, L, u64)> {
        self.lock()
            .iter()
            .filter(|(_, record)| record.intent && record.status.is_connected())
            .filter_map(|(id, record)| {
                record
                    .connection
                    .as_ref()
                    .map(|connection| (*id, connection.link.clone(), record.generation))
            })
            .collect()
    }

    /// Decide what the next maintenance pass has to do and mark the
    /// affected records accordingly.
    pub(crate) fn plan_maintenance(&self) -> MaintenancePlan<P, L> {
        let mut plan = MaintenancePlan {
            connect: Vec::new(),
            teardown: Vec::new(),
        };

        let mut records = self.lock();
        for (id, record) in records.iter_mut() {
            match (record.intent, record.status) {
                (true, ConnectionStatus::Connected | ConnectionStatus::Connecting) => {}
                (true, _) => {
                    record.status = ConnectionStatus::Connecting;
                    plan.connect.push((*id, record.peripheral.clone()));
                }
                (false, ConnectionStatus::Connected) => {
                    if let Some(connection) = record.take_connection() {
                        plan.teardown.push((*id, connection));
                    }
                }
                (false, _) => {}
            }
        }
        plan
    }

    /// Record a successful connection attempt.
    ///
    /// Returns a connection that must be closed by the caller: the previous
    /// one if the record somehow held one, or `connection` itself if `id`
    /// is unknown.
    pub(crate) fn mark_connected(
        &self,
        id: DeviceId,
        connection: ActiveConnection<L>,
    ) -> Option<ActiveConnection<L>> {
        let mut records = self.lock();
        let Some(record) = records.get_mut(&id) else {
            return Some(connection);
        };
        record.status = ConnectionStatus::Connected;
        record.generation = record.generation.wrapping_add(1);
        record.connection.replace(connection)
    }

    /// Record a failed connection attempt. Intent is left unchanged.
    pub(crate) fn mark_failed(&self, id: DeviceId) {
        if let Some(record) = self.lock().get_mut(&id) {
            record.status = ConnectionStatus::Disconnected;
        }
    }

    /// Detach the connection of a die that is still `Connected` on
    /// `generation`, leaving it `Disconnected` with its intent unchanged.
    ///
    /// A connection established after `generation` was read is left alone.
    pub(crate) fn detach_connection(
        &self,
        id: DeviceId,
        generation: u64,
    ) -> Option<ActiveConnection<L>> {
        let mut records = self.lock();
        let record = records.get_mut(&id)?;
        if record.status.is_connected() && record.generation == generation {
            record.take_connection()
        } else {
            None
        }
    }

    /// Detach every live connection, leaving those dice `Disconnected`.
    ///
    /// Records left `Connecting` by an interrupted pass are reset as well.
    pub(crate) fn detach_all(&self) -> Vec<(DeviceId, ActiveConnection<L>)> {
        let mut detached = Vec::new();
        for (id, record) in self.lock().iter_mut() {
            match record.status {
                ConnectionStatus::Connected => {
                    if let Some(connection) = record.take_connection() {
                        detached.push((*id, connection));
                    }
                }
                ConnectionStatus::Connecting => record.status = ConnectionStatus::Disconnected,
                _ => {}
            }
        }
        detached
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<DeviceId, DeviceRecord<P, L>>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicefleet_domain::die::RollState;

    type Registry = DeviceRegistry<&'static str, u8>;

    fn parsed(id: u32, name: &str) -> ParsedAdvertisement {
        ParsedAdvertisement {
            id: DeviceId::new(id),
            description: DeviceDescription::new(name, 6, 1, 0),
            roll: None,
            battery: None,
        }
    }

    fn connection(link: u8) -> ActiveConnection<u8> {
        ActiveConnection::new(link, tokio::spawn(async {}))
    }

    #[test]
    fn should_insert_new_device_as_discovered() {
        let registry = Registry::new(None);
        let added = registry
            .record_advertisement(parsed(1, "d6"), "p1", false)
            .unwrap();

        assert!(added);
        let info = registry.info(DeviceId::new(1)).unwrap();
        assert_eq!(info.status, ConnectionStatus::Discovered);
        assert!(!info.intent);
        assert_eq!(info.description.name, "d6");
    }

    #[test]
    fn should_request_connection_when_auto_connect() {
        let registry = Registry::new(None);
        registry
            .record_advertisement(parsed(1, "d6"), "p1", true)
            .unwrap();

        let info = registry.info(DeviceId::new(1)).unwrap();
        assert!(info.intent);
        assert_eq!(info.status, ConnectionStatus::ConnectRequested);
    }

    #[test]
    fn should_not_duplicate_or_overwrite_on_rediscovery() {
        let registry = Registry::new(None);
        registry
            .record_advertisement(parsed(1, "first"), "p1", false)
            .unwrap();

        let mut again = parsed(1, "second");
        again.description.led_count = 20;
        let added = registry.record_advertisement(again, "p2", true).unwrap();

        assert!(!added);
        assert_eq!(registry.len(), 1);
        let info = registry.info(DeviceId::new(1)).unwrap();
        assert_eq!(info.description.name, "first");
        assert_eq!(info.description.led_count, 6);
        assert!(!info.intent);
    }

    #[test]
    fn should_refresh_advertised_state_on_rediscovery() {
        let registry = Registry::new(None);
        registry
            .record_advertisement(parsed(1, "d6"), "p1", false)
            .unwrap();

        let mut again = parsed(1, "d6");
        again.roll = Some(RollEvent {
            state: RollState::OnFace,
            face: 5,
        });
        registry.record_advertisement(again, "p1", false).unwrap();

        let info = registry.info(DeviceId::new(1)).unwrap();
        assert_eq!(info.advertised_roll.map(|r| r.face), Some(5));
    }

    #[test]
    fn should_reject_new_devices_when_full() {
        let registry = Registry::new(Some(1));
        registry
            .record_advertisement(parsed(1, "a"), "p1", false)
            .unwrap();

        let err = registry
            .record_advertisement(parsed(2, "b"), "p2", false)
            .unwrap_err();
        assert!(matches!(err, FleetError::RegistryFull { capacity: 1 }));

        // Known dice are still refreshed.
        assert!(
            !registry
                .record_advertisement(parsed(1, "a"), "p1", false)
                .unwrap()
        );
    }

    #[test]
    fn should_fail_intent_for_unknown_device() {
        let registry = Registry::new(None);
        let err = registry.set_intent(DeviceId::new(9), true).unwrap_err();
        assert!(matches!(err, FleetError::UnknownDevice(_)));
        assert!(registry.is_empty());
    }

    #[test]
    fn should_toggle_between_discovered_and_connect_requested() {
        let registry = Registry::new(None);
        let id = DeviceId::new(1);
        registry
            .record_advertisement(parsed(1, "d6"), "p1", false)
            .unwrap();

        registry.set_intent(id, true).unwrap();
        registry.set_intent(id, true).unwrap();
        assert_eq!(
            registry.info(id).unwrap().status,
            ConnectionStatus::ConnectRequested
        );

        registry.set_intent(id, false).unwrap();
        assert_eq!(
            registry.info(id).unwrap().status,
            ConnectionStatus::Discovered
        );
    }

    #[tokio::test]
    async fn should_plan_connects_for_intended_devices() {
        let registry = Registry::new(None);
        registry
            .record_advertisement(parsed(1, "a"), "p1", true)
            .unwrap();
        registry
            .record_advertisement(parsed(2, "b"), "p2", false)
            .unwrap();

        let plan = registry.plan_maintenance();
        assert_eq!(plan.connect, vec![(DeviceId::new(1), "p1")]);
        assert!(plan.teardown.is_empty());
        assert_eq!(
            registry.info(DeviceId::new(1)).unwrap().status,
            ConnectionStatus::Connecting
        );

        // A second plan does not start another attempt while connecting.
        assert!(registry.plan_maintenance().connect.is_empty());
    }

    #[tokio::test]
    async fn should_hold_link_only_while_connected() {
        let registry = Registry::new(None);
        let id = DeviceId::new(1);
        registry
            .record_advertisement(parsed(1, "a"), "p1", true)
            .unwrap();
        registry.plan_maintenance();

        assert!(registry.mark_connected(id, connection(42)).is_none());
        assert_eq!(registry.connected_link(id).unwrap(), (42, 1));
        assert_eq!(registry.list(ConnectionFilter::Connected), vec![id]);

        registry.set_intent(id, false).unwrap();
        let plan = registry.plan_maintenance();
        assert_eq!(plan.teardown.len(), 1);
        assert!(matches!(
            registry.connected_link(id),
            Err(FleetError::NotConnected(_))
        ));
        assert_eq!(
            registry.info(id).unwrap().status,
            ConnectionStatus::Disconnected
        );
    }

    #[tokio::test]
    async fn should_keep_intent_after_failed_attempt() {
        let registry = Registry::new(None);
        let id = DeviceId::new(1);
        registry
            .record_advertisement(parsed(1, "a"), "p1", true)
            .unwrap();
        registry.plan_maintenance();
        registry.mark_failed(id);

        let info = registry.info(id).unwrap();
        assert_eq!(info.status, ConnectionStatus::Disconnected);
        assert!(info.intent);
        assert_eq!(registry.plan_maintenance().connect.len(), 1);
    }

    #[tokio::test]
    async fn should_detach_only_connected_records() {
        let registry = Registry::new(None);
        let id = DeviceId::new(1);
        registry
            .record_advertisement(parsed(1, "a"), "p1", true)
            .unwrap();
        assert!(registry.detach_connection(id, 0).is_none());

        registry.plan_maintenance();
        registry.mark_connected(id, connection(1));
        assert!(registry.detach_connection(id, 1).is_some());
        assert!(registry.info(id).unwrap().intent);
        assert_eq!(registry.detach_all().len(), 0);
    }

    #[tokio::test]
    async fn should_keep_newer_connection_when_detaching_stale_generation() {
        let registry = Registry::new(None);
        let id = DeviceId::new(1);
        registry
            .record_advertisement(parsed(1, "a"), "p1", true)
            .unwrap();
        registry.plan_maintenance();
        registry.mark_connected(id, connection(1));
        let (_, stale) = registry.connected_link(id).unwrap();

        // Dropped and re-established before the holder of `stale` reacts.
        assert!(registry.detach_connection(id, stale).is_some());
        registry.plan_maintenance();
        registry.mark_connected(id, connection(2));

        assert!(registry.detach_connection(id, stale).is_none());
        assert_eq!(registry.connected_link(id).unwrap(), (2, 2));
        assert_eq!(registry.list(ConnectionFilter::Connected), vec![id]);
    }

    #[test]
    fn should_list_by_filter_in_id_order() {
        let registry = Registry::new(None);
        for id in [3, 1, 2] {
            registry
                .record_advertisement(parsed(id, "d"), "p", false)
                .unwrap();
        }

        assert_eq!(
            registry.list(ConnectionFilter::Any),
            vec![DeviceId::new(1), DeviceId::new(2), DeviceId::new(3)]
        );
        assert!(registry.list(ConnectionFilter::Connected).is_empty());
        assert_eq!(registry.list(ConnectionFilter::Disconnected).len(), 3);
    }

    #[test]
    fn should_return_none_description_for_unknown_device() {
        let registry = Registry::new(None);
        assert!(registry.description(DeviceId::new(5)).is_none());
    }
}
