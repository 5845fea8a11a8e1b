//! Change notifications for the presentation layer.
//!
//! Every write the engine performs is broadcast as a [`TipEvent`] to all live
//! subscriptions so rendered tips can re-read their record. Subscriptions
//! whose receiver has been dropped are pruned on the next broadcast.
//!
//! Each subscription queues at most [`SUBSCRIPTION_CAPACITY`] undrained
//! events. A subscriber that falls further behind is disconnected; its
//! receiver yields what was queued and then reports `Disconnected`.

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use log::warn;
use parking_lot::Mutex;
use std::time::Duration;

use crate::record::{InvalidationReason, TipRecord, TipStatus};

/// Events queued per subscription before it is treated as lagging.
pub const SUBSCRIPTION_CAPACITY: usize = 1024;

/// A change to one tip, or to the whole store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TipEvent {
    /// A record was created by its first registration.
    Registered(TipRecord),
    /// Registration changed the cap or rule identity of an existing record.
    Updated(TipRecord),
    /// A rule evaluation moved the tip between available and pending.
    StatusChanged {
        record: TipRecord,
        previous: TipStatus,
    },
    /// One impression was counted.
    ImpressionRecorded(TipRecord),
    Invalidated {
        record: TipRecord,
        reason: InvalidationReason,
    },
    Reset(TipRecord),
    /// Every record was deleted.
    Cleared,
}

impl TipEvent {
    /// The affected tip id, `None` for store-wide events.
    pub fn tip_id(&self) -> Option<&str> {
        self.record().map(|r| r.id.as_str())
    }

    /// The record as written, `None` for store-wide events.
    pub fn record(&self) -> Option<&TipRecord> {
        match self {
            TipEvent::Registered(record)
            | TipEvent::Updated(record)
            | TipEvent::ImpressionRecorded(record)
            | TipEvent::Reset(record)
            | TipEvent::StatusChanged { record, .. }
            | TipEvent::Invalidated { record, .. } => Some(record),
            TipEvent::Cleared => None,
        }
    }
}

/// Receiving end handed to a subscriber.
#[derive(Debug)]
pub struct TipSubscription {
    receiver: Receiver<TipEvent>,
}

impl TipSubscription {
    pub fn recv_timeout(&self, timeout: Duration) -> Result<TipEvent, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    pub fn try_recv(&self) -> Result<TipEvent, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Drain every event queued so far without blocking.
    pub fn drain(&self) -> Vec<TipEvent> {
        self.receiver.try_iter().collect()
    }
}

/// Fan-out of events to every live subscription.
#[derive(Debug)]
pub struct EventBroadcaster {
    subscribers: Mutex<Vec<Sender<TipEvent>>>,
    capacity: usize,
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::with_capacity(SUBSCRIPTION_CAPACITY)
    }
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Broadcaster whose subscriptions queue at most `capacity` events.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn subscribe(&self) -> TipSubscription {
        let (sender, receiver) = channel::bounded(self.capacity);
        self.subscribers.lock().push(sender);
        TipSubscription { receiver }
    }

    /// Deliver `event` to all subscribers, dropping disconnected and lagging
    /// ones.
    pub fn publish(&self, event: TipEvent) {
        let mut subscribers = self.subscribers.lock();
        if subscribers.is_empty() {
            return;
        }
        let capacity = self.capacity;
        subscribers.retain(|sender| match sender.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(
                    "Dropping tip event subscriber: {} events queued without being drained",
                    capacity
                );
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}
