//! In-memory transport used by the unit tests of this crate.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use dicefleet_domain::codec::{
    AdvertisementData, NOTIFY_CHARACTERISTIC_UUID, SERVICE_UUID, WRITE_CHARACTERISTIC_UUID,
};

use crate::ports::{
    Advertisement, CharacteristicInfo, Link, NotificationStream, ServiceInfo, Transport,
    TransportError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Misbehavior {
    RefuseConnect,
    MissingService,
    MissingWriteCharacteristic,
    NotifyUnsupported,
    RejectWrites,
}

#[derive(Debug, Default)]
struct FakeDie {
    name: String,
    misbehavior: Option<Misbehavior>,
    connected: bool,
    session: u64,
    connects: usize,
    setup_delay: Duration,
    notifier: Option<mpsc::UnboundedSender<Vec<u8>>>,
    writes: Vec<Vec<u8>>,
}

#[derive(Debug, Default)]
struct FakeState {
    dice: BTreeMap<u32, FakeDie>,
    fail_scan: bool,
}

type SharedState = Arc<Mutex<FakeState>>;

fn lock(state: &SharedState) -> MutexGuard<'_, FakeState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Default)]
pub struct FakeTransport {
    state: SharedState,
}

impl FakeTransport {
    pub fn add_die(&self, id: u32, name: &str) {
        lock(&self.state).dice.insert(
            id,
            FakeDie {
                name: name.to_string(),
                ..FakeDie::default()
            },
        );
    }

    pub fn advertisement(&self, id: u32) -> Advertisement<u32> {
        let state = lock(&self.state);
        let name = state.dice.get(&id).map(|d| d.name.clone());
        let mut service_data = id.to_le_bytes().to_vec();
        service_data.extend_from_slice(&1_700_000_000u32.to_le_bytes());
        Advertisement {
            peripheral: id,
            data: AdvertisementData {
                local_name: name,
                services: vec![SERVICE_UUID],
                service_data: Some(service_data),
                manufacturer_data: Some(vec![0x59, 0x00, 6, 2, 1, 3, 0x85]),
            },
        }
    }

    pub fn fail_scan(&self, fail: bool) {
        lock(&self.state).fail_scan = fail;
    }

    pub fn misbehave(&self, id: u32, misbehavior: Misbehavior) {
        if let Some(die) = lock(&self.state).dice.get_mut(&id) {
            die.misbehavior = Some(misbehavior);
        }
    }

    /// Make every service lookup on die `id` take `delay`.
    pub fn slow_setup(&self, id: u32, delay: Duration) {
        if let Some(die) = lock(&self.state).dice.get_mut(&id) {
            die.setup_delay = delay;
        }
    }

    pub fn behave(&self, id: u32) {
        if let Some(die) = lock(&self.state).dice.get_mut(&id) {
            die.misbehavior = None;
        }
    }

    pub fn notify(&self, id: u32, payload: Vec<u8>) {
        if let Some(notifier) = lock(&self.state)
            .dice
            .get(&id)
            .and_then(|die| die.notifier.as_ref())
        {
            let _ = notifier.send(payload);
        }
    }

    pub fn drop_link(&self, id: u32) {
        if let Some(die) = lock(&self.state).dice.get_mut(&id) {
            die.connected = false;
            die.notifier = None;
        }
    }

    pub fn is_connected(&self, id: u32) -> bool {
        lock(&self.state).dice.get(&id).is_some_and(|die| die.connected)
    }

    pub fn connect_count(&self, id: u32) -> usize {
        lock(&self.state).dice.get(&id).map_or(0, |die| die.connects)
    }

    pub fn writes(&self, id: u32) -> Vec<Vec<u8>> {
        lock(&self.state)
            .dice
            .get(&id)
            .map(|die| die.writes.clone())
            .unwrap_or_default()
    }
}

impl Transport for FakeTransport {
    type Peripheral = u32;
    type Link = FakeLink;

    async fn scan(&self, _duration: Duration) -> Result<Vec<Advertisement<u32>>, TransportError> {
        let (fail, ids): (bool, Vec<u32>) = {
            let state = lock(&self.state);
            (state.fail_scan, state.dice.keys().copied().collect())
        };
        if fail {
            return Err(TransportError::NotAvailable);
        }
        Ok(ids.into_iter().map(|id| self.advertisement(id)).collect())
    }

    async fn connect(&self, peripheral: &u32) -> Result<FakeLink, TransportError> {
        let mut state = lock(&self.state);
        let die = state
            .dice
            .get_mut(peripheral)
            .ok_or(TransportError::NotConnected)?;
        die.connects += 1;
        if die.misbehavior == Some(Misbehavior::RefuseConnect) {
            return Err(TransportError::Radio("connection refused".into()));
        }
        die.session += 1;
        die.connected = true;
        Ok(FakeLink {
            id: *peripheral,
            session: die.session,
            state: Arc::clone(&self.state),
        })
    }
}

#[derive(Debug, Clone)]
pub struct FakeLink {
    id: u32,
    session: u64,
    state: SharedState,
}

impl FakeLink {
    fn with_die<R>(&self, f: impl FnOnce(&mut FakeDie) -> R) -> Result<R, TransportError> {
        let mut state = lock(&self.state);
        match state.dice.get_mut(&self.id) {
            Some(die) if die.connected && die.session == self.session => Ok(f(die)),
            _ => Err(TransportError::NotConnected),
        }
    }
}

impl Link for FakeLink {
    async fn is_connected(&self) -> bool {
        self.with_die(|_| ()).is_ok()
    }

    async fn service(&self, uuid: uuid::Uuid) -> Result<Option<ServiceInfo>, TransportError> {
        let (misbehavior, delay) = self.with_die(|die| (die.misbehavior, die.setup_delay))?;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if uuid != SERVICE_UUID || misbehavior == Some(Misbehavior::MissingService) {
            return Ok(None);
        }
        let mut characteristics = vec![CharacteristicInfo {
            uuid: NOTIFY_CHARACTERISTIC_UUID,
            service_uuid: SERVICE_UUID,
            can_notify: misbehavior != Some(Misbehavior::NotifyUnsupported),
            can_write: false,
        }];
        if misbehavior != Some(Misbehavior::MissingWriteCharacteristic) {
            characteristics.push(CharacteristicInfo {
                uuid: WRITE_CHARACTERISTIC_UUID,
                service_uuid: SERVICE_UUID,
                can_notify: false,
                can_write: true,
            });
        }
        Ok(Some(ServiceInfo {
            uuid: SERVICE_UUID,
            characteristics,
        }))
    }

    async fn subscribe(
        &self,
        _characteristic: &CharacteristicInfo,
    ) -> Result<NotificationStream, TransportError> {
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
            if die.misbehavior == Some(Misbehavior::RejectWrites) {
                return Err(TransportError::Radio("write rejected".into()));
            }
            die.writes.push(payload.to_vec());
            Ok(())
        })?
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let _ = self.with_die(|die| {
            die.connected = false;
            die.notifier = None;
        });
        Ok(())
    }
}
