use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use parking_lot::Mutex;
use tokio::sync::Notify;

use super::Event;
use super::StateCell;
use super::SubscriptionId;
use super::SubscriptionState;
use crate::OverflowPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PushOutcome {
    Queued,
    /// Buffer was full; the oldest event was evicted
    DroppedOldest,
    /// Buffer was full; the subscription was closed
    Overflowed,
    /// Subscription no longer accepts events
    Rejected,
}

/// Bounded single-consumer delivery buffer of one subscription.
///
/// Pushing never waits. When the buffer holds `capacity` events the
/// configured [`OverflowPolicy`] decides between evicting the oldest event and
/// closing the subscription.
#[derive(Debug)]
pub(crate) struct SubscriberQueue {
    id: SubscriptionId,
    capacity: usize,
    policy: OverflowPolicy,
    buffer: Mutex<VecDeque<Event>>,
    state: StateCell,
    notify: Notify,
    dropped: AtomicU64,
    overflowed: AtomicBool,
}

impl SubscriberQueue {
    pub(crate) fn new(
        id: SubscriptionId,
        capacity: usize,
        policy: OverflowPolicy,
    ) -> Self {
        Self {
            id,
            capacity: capacity.max(1),
            policy,
            buffer: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            state: StateCell::new(SubscriptionState::Active),
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
            overflowed: AtomicBool::new(false),
        }
    }

    pub(crate) fn id(&self) -> SubscriptionId {
        self.id
    }

    pub(crate) fn state(&self) -> SubscriptionState {
        self.state.get()
    }

    pub(crate) fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    pub(crate) fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub(crate) fn is_overflowed(&self) -> bool {
        self.overflowed.load(Ordering::Relaxed)
    }

    pub(crate) fn len(&self) -> usize {
        self.buffer.lock().len()
    }

    pub(crate) fn push(
        &self,
        event: Event,
    ) -> PushOutcome {
        let outcome = {
            let mut buffer = self.buffer.lock();
            // Checked under the buffer lock: drain and close take it too.
            if self.state.get() != SubscriptionState::Active {
                return PushOutcome::Rejected;
            }
            if buffer.len() < self.capacity {
                buffer.push_back(event);
                PushOutcome::Queued
            } else {
                match self.policy {
                    OverflowPolicy::DropOldest => {
                        buffer.pop_front();
                        buffer.push_back(event);
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        PushOutcome::DroppedOldest
                    }
                    OverflowPolicy::Disconnect => {
                        buffer.clear();
                        self.overflowed.store(true, Ordering::Relaxed);
                        self.state.close();
                        PushOutcome::Overflowed
                    }
                }
            }
        };
        self.notify.notify_one();
        outcome
    }

    /// Stops intake; buffered events are still delivered.
    pub(crate) fn begin_drain(&self) -> bool {
        let drained = {
            let buffer = self.buffer.lock();
            let ok = self.state.transition(SubscriptionState::Draining).is_ok();
            // Nothing left to flush
            if ok && buffer.is_empty() {
                self.state.close();
            }
            ok
        };
        self.notify.notify_one();
        drained
    }

    /// Closes immediately and releases the buffer.
    pub(crate) fn close(&self) -> bool {
        let closed = {
            let mut buffer = self.buffer.lock();
            buffer.clear();
            buffer.shrink_to_fit();
            self.state.close()
        };
        self.notify.notify_one();
        closed
    }

    pub(crate) fn try_recv(&self) -> Option<Event> {
        let mut buffer = self.buffer.lock();
        let event = buffer.pop_front();
        if buffer.is_empty() && self.state.get() == SubscriptionState::Draining {
            self.state.close();
        }
        event
    }

    /// Next buffered event. `None` once the subscription is closed, or once a
    /// draining subscription has been flushed.
    pub(crate) async fn recv(&self) -> Option<Event> {
        loop {
            if let Some(event) = self.try_recv() {
                return Some(event);
            }
            if self.state.get().is_closed() {
                return None;
            }
            self.notify.notified().await;
        }
    }
}
