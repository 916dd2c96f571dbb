//! # dicefleet-adapter-virtual
//!
//! Virtual transport that simulates dice for demos and end-to-end tests.
//!
//! Virtual dice advertise and notify using the real wire formats, so the
//! whole codec and connection path is exercised. Tests script them through
//! [`VirtualTransport`]: roll a die, report a battery level, drop a link, or
//! inject a [`Fault`].
//!
//! ## Dependency rule
//!
//! Depends on `dicefleet-app` (port traits) and `dicefleet-domain` only.

mod config;
mod die;
mod link;

pub use config::{VirtualConfig, VirtualDieConfig};
pub use die::Fault;
pub use link::VirtualLink;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;

use dicefleet_app::ports::{Advertisement, Transport, TransportError};
use dicefleet_domain::die::{BatteryEvent, RollEvent, RollState};
use dicefleet_domain::id::DeviceId;

use die::DieState;

pub(crate) type Dice = Mutex<BTreeMap<DeviceId, DieState>>;

pub(crate) fn lock(dice: &Dice) -> MutexGuard<'_, BTreeMap<DeviceId, DieState>> {
    dice.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Transport over simulated dice. Clones share the same dice.
#[derive(Clone, Default)]
pub struct VirtualTransport {
    dice: Arc<Dice>,
}

impl VirtualTransport {
    /// Create a transport with the dice listed in `config`.
    #[must_use]
    pub fn new(config: &VirtualConfig) -> Self {
        let transport = Self::default();
        for die in &config.dice {
            transport.add_die(die.clone());
        }
        transport
    }

    /// Add a die; it shows up in the next scan. Replaces a die with the same id.
    pub fn add_die(&self, config: VirtualDieConfig) {
        let id = DeviceId::new(config.id);
        lock(&self.dice).insert(id, DieState::new(config));
    }

    /// Ids of every simulated die.
    #[must_use]
    pub fn dice(&self) -> Vec<DeviceId> {
        lock(&self.dice).keys().copied().collect()
    }

    /// Land die `id` on `face` and notify it.
    pub fn roll(&self, id: DeviceId, face: u8) {
        self.with_die(id, |die| {
            die.set_roll(RollEvent {
                state: RollState::OnFace,
                face,
            });
        });
    }

    /// Report a battery level (clamped to 100 %).
    pub fn report_battery(&self, id: DeviceId, level: u8, charging: bool) {
        self.with_die(id, |die| {
            die.set_battery(BatteryEvent {
                level: level.min(100),
                charging,
            });
        });
    }

    /// Break the link to die `id` as if it went out of range.
    pub fn drop_link(&self, id: DeviceId) {
        self.with_die(id, DieState::disconnect);
    }

    /// Make die `id` misbehave until [`Self::clear_fault`].
    pub fn set_fault(&self, id: DeviceId, fault: Fault) {
        self.with_die(id, |die| die.fault = Some(fault));
    }

    pub fn clear_fault(&self, id: DeviceId) {
        self.with_die(id, |die| die.fault = None);
    }

    /// Commands written to die `id`, oldest first.
    #[must_use]
    pub fn commands(&self, id: DeviceId) -> Vec<Vec<u8>> {
        lock(&self.dice)
            .get(&id)
            .map(|die| die.commands.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn is_connected(&self, id: DeviceId) -> bool {
        lock(&self.dice).get(&id).is_some_and(|die| die.connected)
    }

    /// Periodically roll every connected die: `Rolling`, then `OnFace` on
    /// the next face.
    #[must_use]
    pub fn spawn_simulation(&self, interval: Duration) -> JoinHandle<()> {
        let dice = Arc::clone(&self.dice);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                for die in lock(&dice).values_mut().filter(|die| die.connected) {
                    let face = (die.roll.face + 1) % die.config.led_count.max(1);
                    die.set_roll(RollEvent {
                        state: RollState::Rolling,
                        face: die.roll.face,
                    });
                    die.set_roll(RollEvent {
                        state: RollState::OnFace,
                        face,
                    });
                }
            }
        })
    }

    fn with_die(&self, id: DeviceId, f: impl FnOnce(&mut DieState)) {
        match lock(&self.dice).get_mut(&id) {
            Some(die) => f(die),
            None => tracing::warn!(device = %id, "unknown virtual die"),
        }
    }
}

impl Transport for VirtualTransport {
    type Peripheral = DeviceId;
    type Link = VirtualLink;

    async fn scan(&self, duration: Duration) -> Result<Vec<Advertisement<DeviceId>>, TransportError> {
        tokio::time::sleep(duration).await;
        Ok(lock(&self.dice)
            .iter()
            .map(|(id, die)| Advertisement {
                peripheral: *id,
                data: die.advertisement(),
            })
            .collect())
    }

    async fn connect(&self, peripheral: &DeviceId) -> Result<VirtualLink, TransportError> {
        let session = {
            let mut dice = lock(&self.dice);
            let die = dice
                .get_mut(peripheral)
                .ok_or_else(|| TransportError::Radio(format!("no die {peripheral}").into()))?;
            if die.fault == Some(Fault::RefuseConnect) {
                return Err(TransportError::Radio("connection refused".into()));
            }
            die.session += 1;
            die.connected = true;
            die.notifier = None;
            die.session
        };
        tracing::debug!(device = %peripheral, "virtual die connected");
        Ok(VirtualLink::new(*peripheral, session, Arc::clone(&self.dice)))
    }
}
