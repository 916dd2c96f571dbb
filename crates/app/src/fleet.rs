//! The fleet handle — the poll-based API over every other module.
//!
//! A [`Fleet`] owns the registry, the event queues and the background tasks
//! (event pump, scan scheduler). Handles are cheap to clone and all refer to
//! the same fleet; independent fleets can coexist in one process.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use dicefleet_domain::codec;
use dicefleet_domain::command::BlinkParams;
use dicefleet_domain::die::{BatteryEvent, ConnectionFilter, DeviceDescription, RollEvent};
use dicefleet_domain::id::DeviceId;

use crate::connection::{self, PassSummary};
use crate::dispatcher;
use crate::error::FleetError;
use crate::event_queue::{self, DEFAULT_QUEUE_CAPACITY, EventQueues, NotificationMessage};
use crate::ports::Transport;
use crate::registry::{DeviceInfo, DeviceRegistry};
use crate::scheduler::{self, ScanSettings};

/// Sizing of a fleet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    /// Capacity of each event queue.
    pub queue_capacity: usize,
    /// Notifications buffered between the dice and the event pump.
    pub notification_buffer: usize,
    /// Maximum number of registry records; unbounded when `None`.
    pub max_devices: Option<usize>,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            notification_buffer: 256,
            max_devices: None,
        }
    }
}

struct Shared<T: Transport> {
    transport: T,
    registry: DeviceRegistry<T::Peripheral, T::Link>,
    queues: Arc<EventQueues>,
    notifications: mpsc::Sender<NotificationMessage>,
    settings: watch::Sender<ScanSettings>,
    scheduler: Mutex<Option<JoinHandle<()>>>,
    pump: Mutex<Option<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

/// Handle to a fleet of dice.
pub struct Fleet<T: Transport> {
    shared: Arc<Shared<T>>,
}

impl<T: Transport> Clone for Fleet<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Non-owning handle held by the background scheduler.
pub(crate) struct WeakFleet<T: Transport>(Weak<Shared<T>>);

impl<T: Transport> WeakFleet<T> {
    pub(crate) fn upgrade(&self) -> Option<Fleet<T>> {
        self.0.upgrade().map(|shared| Fleet { shared })
    }
}

impl<T: Transport> Fleet<T> {
    /// Create a fleet on top of `transport` and start its event pump.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn start(transport: T, config: FleetConfig) -> Self {
        let queues = Arc::new(EventQueues::new(config.queue_capacity));
        let (notifications, receiver) = mpsc::channel(config.notification_buffer.max(1));
        let pump = tokio::spawn(event_queue::run_pump(Arc::clone(&queues), receiver));
        let (settings, _) = watch::channel(ScanSettings::default());

        tracing::debug!(
            queue_capacity = config.queue_capacity,
            max_devices = ?config.max_devices,
            "fleet started"
        );

        Self {
            shared: Arc::new(Shared {
                transport,
                registry: DeviceRegistry::new(config.max_devices),
                queues,
                notifications,
                settings,
                scheduler: Mutex::new(None),
                pump: Mutex::new(Some(pump)),
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    /// Enable discovery and start the background cycle.
    ///
    /// Later calls only update the cadence and auto-connect flag. Ignored
    /// once the fleet is shut down.
    pub fn start_discovery(
        &self,
        scan_duration: Duration,
        inter_scan_delay: Duration,
        auto_connect: bool,
    ) {
        if self.is_shut_down() {
            tracing::warn!("fleet is shut down, discovery not started");
            return;
        }
        self.shared.settings.send_replace(ScanSettings {
            scan_duration,
            inter_scan_delay,
            auto_connect,
            enabled: true,
        });

        let mut scheduler = lock(&self.shared.scheduler);
        if scheduler.as_ref().is_some_and(|handle| !handle.is_finished()) {
            tracing::debug!("discovery settings updated");
            return;
        }
        let weak = WeakFleet(Arc::downgrade(&self.shared));
        *scheduler = Some(tokio::spawn(scheduler::run(
            weak,
            self.shared.settings.subscribe(),
        )));
        tracing::info!(
            scan_secs = scan_duration.as_secs_f32(),
            delay_secs = inter_scan_delay.as_secs_f32(),
            auto_connect,
            "discovery started"
        );
    }

    /// Stop scanning. Maintenance of known dice continues.
    pub fn stop_discovery(&self) {
        self.shared.settings.send_modify(|settings| settings.enabled = false);
        tracing::info!("discovery stopped");
    }

    /// Ids of the dice matching `filter`.
    #[must_use]
    pub fn list_devices(&self, filter: ConnectionFilter) -> Vec<DeviceId> {
        self.shared.registry.list(filter)
    }

    /// Ask the maintenance pass to connect to `id`. Unknown ids are ignored.
    pub fn request_connect(&self, id: DeviceId) {
        match self.shared.registry.set_intent(id, true) {
            Ok(()) => tracing::debug!(device = %id, "connection requested"),
            Err(err) => tracing::warn!(%err, "connect request ignored"),
        }
    }

    /// Ask the maintenance pass to disconnect `id`. Unknown ids are ignored.
    pub fn request_disconnect(&self, id: DeviceId) {
        match self.shared.registry.set_intent(id, false) {
            Ok(()) => tracing::debug!(device = %id, "disconnection requested"),
            Err(err) => tracing::warn!(%err, "disconnect request ignored"),
        }
    }

    /// Write a raw command to a connected die. Returns whether it was written.
    pub async fn send_command(&self, id: DeviceId, payload: &[u8]) -> bool {
        match dispatcher::send(&self.shared.registry, id, payload).await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(%err, device = %id, "command not sent");
                false
            }
        }
    }

    /// Make a connected die blink. Returns whether the command was written.
    pub async fn send_blink(&self, id: DeviceId, params: &BlinkParams) -> bool {
        self.send_command(id, &codec::encode_blink(params)).await
    }

    /// Description of `id`, or the zero-value description if unknown.
    #[must_use]
    pub fn description(&self, id: DeviceId) -> DeviceDescription {
        self.shared.registry.description(id).unwrap_or_default()
    }

    /// Snapshot of everything known about `id`.
    #[must_use]
    pub fn device(&self, id: DeviceId) -> Option<DeviceInfo> {
        self.shared.registry.info(id)
    }

    #[must_use]
    pub fn drain_roll_events(&self) -> Vec<(DeviceId, RollEvent)> {
        self.shared.queues.drain_rolls()
    }

    #[must_use]
    pub fn drain_battery_events(&self) -> Vec<(DeviceId, BatteryEvent)> {
        self.shared.queues.drain_batteries()
    }

    /// Run one discovery scan and register the dice it finds.
    ///
    /// Returns the number of dice seen for the first time.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::ShutDown`] after [`Self::shutdown`], or
    /// [`FleetError::Transport`] if the scan itself fails.
    pub async fn discover(&self, duration: Duration, auto_connect: bool) -> Result<usize, FleetError> {
        if self.is_shut_down() {
            return Err(FleetError::ShutDown);
        }
        let advertisements = self.shared.transport.scan(duration).await?;

        let mut added = 0;
        for advertisement in advertisements {
            let parsed = match codec::parse_advertisement(&advertisement.data) {
                Ok(parsed) => parsed,
                Err(err) => {
                    tracing::trace!(%err, "ignoring advertisement");
                    continue;
                }
            };
            let id = parsed.id;
            let name = parsed.description.name.clone();

            match self.shared.registry.record_advertisement(
                parsed,
                advertisement.peripheral,
                auto_connect,
            ) {
                Ok(true) => {
                    tracing::info!(device = %id, %name, "discovered die");
                    added += 1;
                }
                Ok(false) => tracing::debug!(device = %id, "die seen again"),
                Err(err) => tracing::warn!(%err, device = %id, "ignoring die"),
            }
        }
        Ok(added)
    }

    /// Run one maintenance pass. Does nothing once the fleet is shut down.
    pub async fn maintain(&self) -> PassSummary {
        if self.is_shut_down() {
            tracing::warn!("fleet is shut down, maintenance skipped");
            return PassSummary::default();
        }
        let summary = connection::run_pass(
            &self.shared.transport,
            &self.shared.registry,
            &self.shared.notifications,
        )
        .await;
        // A pass overlapping `shutdown` may have connected after teardown.
        if self.is_shut_down() {
            self.close_all().await;
        }
        summary
    }

    /// Stop the background tasks and close every live connection.
    ///
    /// The scheduler finishes its current cycle first, so connections it is
    /// still setting up are closed too. Records end `Disconnected` with their
    /// intent unchanged. The fleet cannot be restarted afterwards.
    pub async fn shutdown(&self) {
        self.shared.shut_down.store(true, Ordering::SeqCst);
        // Wakes the scheduler out of its idle delay.
        self.shared
            .settings
            .send_modify(|settings| settings.enabled = false);

        let scheduler = lock(&self.shared.scheduler).take();
        if let Some(handle) = scheduler
            && let Err(err) = handle.await
        {
            tracing::warn!(%err, "scan scheduler ended abnormally");
        }

        self.close_all().await;
        if let Some(handle) = lock(&self.shared.pump).take() {
            handle.abort();
        }
        tracing::info!("fleet shut down");
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        self.shared.shut_down.load(Ordering::SeqCst)
    }

    async fn close_all(&self) {
        for (id, connection) in self.shared.registry.detach_all() {
            connection.close(id).await;
            tracing::info!(device = %id, "disconnected");
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
