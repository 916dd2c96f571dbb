//! Bounded, drop-oldest event queues fed by die notifications.
//!
//! Connected dice push raw payloads into an mpsc channel; a single pump task
//! owns the receiving end, decodes each payload, and appends the result to
//! the roll or battery queue. Consumers drain a queue, which hands over
//! everything received since the previous drain and leaves it empty.
//!
//! Each queue has its own lock, held only for one push or one drain.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;

use dicefleet_domain::codec::{self, Notification};
use dicefleet_domain::die::{BatteryEvent, RollEvent};
use dicefleet_domain::id::DeviceId;

/// Default number of entries each queue holds before evicting.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// A raw notification payload tagged with the die it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationMessage {
    pub id: DeviceId,
    pub payload: Vec<u8>,
}

/// FIFO with a fixed capacity that evicts its oldest entry when full.
#[derive(Debug)]
pub struct BoundedQueue<T> {
    entries: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    /// Create a queue holding at most `capacity` entries (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::new(),
            capacity,
        }
    }

    /// Append `item`, returning the entry evicted to make room, if any.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.entries.len() >= self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(item);
        evicted
    }

    /// Take every entry in insertion order, leaving the queue empty.
    pub fn drain(&mut self) -> Vec<T> {
        std::mem::take(&mut self.entries).into()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// The roll and battery queues.
///
/// The two queues are independent: no ordering is kept between a roll entry
/// and a battery entry.
#[derive(Debug)]
pub struct EventQueues {
    rolls: Mutex<BoundedQueue<(DeviceId, RollEvent)>>,
    batteries: Mutex<BoundedQueue<(DeviceId, BatteryEvent)>>,
}

impl Default for EventQueues {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl EventQueues {
    /// Create both queues with the same capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            rolls: Mutex::new(BoundedQueue::new(capacity)),
            batteries: Mutex::new(BoundedQueue::new(capacity)),
        }
    }

    /// Decode `payload` from die `id` and enqueue the resulting event.
    ///
    /// Unrecognized payloads are dropped. Returns what was decoded.
    pub fn ingest(&self, id: DeviceId, payload: &[u8]) -> Notification {
        let notification = codec::parse_notification(payload);
        match notification {
            Notification::Roll(event) => {
                tracing::debug!(device = %id, state = %event.state, face = event.face, "roll event");
                if lock(&self.rolls).push((id, event)).is_some() {
                    tracing::trace!("roll queue full, evicted oldest entry");
                }
            }
            Notification::Battery(event) => {
                tracing::debug!(
                    device = %id,
                    level = event.level,
                    charging = event.charging,
                    "battery event"
                );
                if lock(&self.batteries).push((id, event)).is_some() {
                    tracing::trace!("battery queue full, evicted oldest entry");
                }
            }
            Notification::Unrecognized => {
                tracing::trace!(
                    device = %id,
                    tag = payload.first().copied(),
                    len = payload.len(),
                    "ignoring unrecognized notification"
                );
            }
        }
        notification
    }

    /// Roll events received since the last drain, oldest first.
    #[must_use]
    pub fn drain_rolls(&self) -> Vec<(DeviceId, RollEvent)> {
        lock(&self.rolls).drain()
    }

    /// Battery events received since the last drain, oldest first.
    #[must_use]
    pub fn drain_batteries(&self) -> Vec<(DeviceId, BatteryEvent)> {
        lock(&self.batteries).drain()
    }
}

/// Receive notification messages and feed them into `queues` until every
/// sender is gone.
pub(crate) async fn run_pump(
    queues: Arc<EventQueues>,
    mut receiver: mpsc::Receiver<NotificationMessage>,
) {
    while let Some(message) = receiver.recv().await {
        queues.ingest(message.id, &message.payload);
    }
    tracing::debug!("notification channel closed, event pump stopped");
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
