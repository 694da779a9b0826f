use std::collections::BTreeSet;
use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::SystemTime;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::Event;
use super::PushOutcome;
use super::SubscriberQueue;
use super::Subscription;
use super::SubscriptionId;
use super::SubscriptionState;
use crate::metrics::ACTIVE_SUBSCRIPTIONS;
use crate::metrics::EVENTS_PUBLISHED;
use crate::metrics::SUBSCRIBER_OVERFLOW;
use crate::HubConfig;
use crate::ResourceKey;
use crate::Result;
use crate::Snapshot;
use crate::SubscriptionError;
use crate::Topic;

/// Per-topic routing state.
struct TopicSlot {
    /// Last assigned sequence number. Held while the event is enqueued so all
    /// subscribers observe the topic's events in sequence order.
    sequence: Mutex<u64>,
    subscribers: ArcSwap<Vec<Arc<SubscriberQueue>>>,
}

impl TopicSlot {
    fn new() -> Self {
        Self {
            sequence: Mutex::new(0),
            subscribers: ArcSwap::from_pointee(Vec::new()),
        }
    }

    fn attach(
        &self,
        queue: &Arc<SubscriberQueue>,
    ) {
        self.subscribers.rcu(|current| {
            let mut next = Vec::with_capacity(current.len() + 1);
            next.extend(current.iter().cloned());
            next.push(queue.clone());
            next
        });
    }

    fn detach(
        &self,
        id: SubscriptionId,
    ) {
        self.subscribers.rcu(|current| {
            current
                .iter()
                .filter(|q| q.id() != id)
                .cloned()
                .collect::<Vec<_>>()
        });
    }
}

struct Registration {
    queue: Arc<SubscriberQueue>,
    topics: BTreeSet<Topic>,
}

struct HubInner {
    /// topic -> slot. Copy-on-write: publishers only load it.
    topics: ArcSwap<HashMap<Topic, Arc<TopicSlot>>>,
    /// Owned subscription set. Its lock also serializes index writes.
    subscriptions: Mutex<HashMap<SubscriptionId, Registration>>,
    next_id: AtomicU64,
    config: HubConfig,
}

/// Topic-based publish/subscribe router.
///
/// Publishing never blocks on consumers: every subscriber has its own bounded
/// buffer and a full buffer is resolved by the configured overflow policy.
/// Ordering is guaranteed per topic only.
#[derive(Clone)]
pub struct EventHub {
    inner: Arc<HubInner>,
}

impl std::fmt::Debug for EventHub {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("EventHub")
            .field("topics", &self.topic_count())
            .field("subscriptions", &self.subscription_count())
            .finish()
    }
}

impl EventHub {
    pub fn new(config: HubConfig) -> Self {
        Self {
            inner: Arc::new(HubInner {
                topics: ArcSwap::from_pointee(HashMap::new()),
                subscriptions: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                config,
            }),
        }
    }

    fn slot(
        &self,
        topic: &Topic,
    ) -> Option<Arc<TopicSlot>> {
        self.inner.topics.load().get(topic).cloned()
    }

    /// Slot for `topic`, created on first use. Callers hold the
    /// subscriptions lock.
    fn slot_or_insert(
        &self,
        topic: &Topic,
    ) -> Arc<TopicSlot> {
        if let Some(slot) = self.slot(topic) {
            return slot;
        }
        let mut next = HashMap::clone(&self.inner.topics.load());
        let slot = next
            .entry(topic.clone())
            .or_insert_with(|| Arc::new(TopicSlot::new()))
            .clone();
        self.inner.topics.store(Arc::new(next));
        slot
    }

    /// Enqueues an event for every subscriber of `topic` and returns its
    /// sequence number.
    pub fn publish(
        &self,
        topic: &Topic,
        key: ResourceKey,
        payload: Arc<Snapshot>,
    ) -> u64 {
        let slot = match self.slot(topic) {
            Some(slot) => slot,
            None => {
                let _guard = self.inner.subscriptions.lock();
                self.slot_or_insert(topic)
            }
        };

        let mut overflowed = Vec::new();
        let sequence = {
            let mut sequence = slot.sequence.lock();
            *sequence += 1;
            let event = Event {
                topic: topic.clone(),
                key,
                payload,
                sequence: *sequence,
                timestamp: SystemTime::now(),
            };

            for queue in slot.subscribers.load().iter() {
                match queue.push(event.clone()) {
                    PushOutcome::Queued | PushOutcome::Rejected => {}
                    PushOutcome::DroppedOldest => {
                        SUBSCRIBER_OVERFLOW
                            .with_label_values(&[queue.policy().as_str()])
                            .inc();
                        trace!(subscription = queue.id(), %topic, "buffer full, dropped oldest event");
                    }
                    PushOutcome::Overflowed => {
                        SUBSCRIBER_OVERFLOW
                            .with_label_values(&[queue.policy().as_str()])
                            .inc();
                        overflowed.push(queue.id());
                    }
                }
            }
            *sequence
        };

        for id in overflowed {
            let err = SubscriptionError::Overflow { id };
            warn!(%topic, "{}, disconnecting", err);
            self.detach(id);
        }

        EVENTS_PUBLISHED.with_label_values(&[topic.as_str()]).inc();
        sequence
    }

    /// Registers a consumer for `topics`.
    pub fn subscribe<I>(
        &self,
        topics: I,
    ) -> Result<Subscription>
    where
        I: IntoIterator<Item = Topic>,
    {
        let topics: BTreeSet<Topic> = topics.into_iter().collect();
        if topics.is_empty() {
            return Err(SubscriptionError::EmptyTopics.into());
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let queue = Arc::new(SubscriberQueue::new(
            id,
            self.inner.config.subscriber_buffer_size,
            self.inner.config.overflow_policy,
        ));

        {
            let mut subscriptions = self.inner.subscriptions.lock();
            for topic in &topics {
                self.slot_or_insert(topic).attach(&queue);
            }
            subscriptions.insert(
                id,
                Registration {
                    queue: queue.clone(),
                    topics: topics.clone(),
                },
            );
        }
        ACTIVE_SUBSCRIPTIONS.inc();
        debug!(subscription = id, ?topics, "subscribed");

        Ok(Subscription::new(queue, self.clone()))
    }

    /// Extends an existing subscription with more topics.
    pub fn add_topics<I>(
        &self,
        id: SubscriptionId,
        topics: I,
    ) -> Result<()>
    where
        I: IntoIterator<Item = Topic>,
    {
        let mut subscriptions = self.inner.subscriptions.lock();
        let registration = subscriptions
            .get_mut(&id)
            .ok_or(SubscriptionError::NotFound { id })?;
        if registration.queue.state() != SubscriptionState::Active {
            return Err(SubscriptionError::Closed { id }.into());
        }
        for topic in topics {
            if registration.topics.insert(topic.clone()) {
                self.slot_or_insert(&topic).attach(&registration.queue);
            }
        }
        Ok(())
    }

    /// Removes the subscription and releases its buffer.
    pub fn unsubscribe(
        &self,
        id: SubscriptionId,
    ) -> Result<()> {
        let queue = self.detach(id).ok_or(SubscriptionError::NotFound { id })?;
        queue.close();
        debug!(subscription = id, "unsubscribed");
        Ok(())
    }

    /// Stops intake for one subscription; its consumer still receives what is
    /// already buffered.
    pub fn drain(
        &self,
        id: SubscriptionId,
    ) -> Result<()> {
        let queue = self.detach(id).ok_or(SubscriptionError::NotFound { id })?;
        if !queue.begin_drain() {
            return Err(SubscriptionError::InvalidTransition {
                from: queue.state(),
                to: SubscriptionState::Draining,
            }
            .into());
        }
        Ok(())
    }

    /// Moves every subscription to `Draining`. Returns how many were drained.
    pub fn drain_all(&self) -> usize {
        let registrations: Vec<Registration> = {
            let mut subscriptions = self.inner.subscriptions.lock();
            let drained: Vec<_> = subscriptions.drain().map(|(_, r)| r).collect();
            for registration in &drained {
                for topic in &registration.topics {
                    if let Some(slot) = self.slot(topic) {
                        slot.detach(registration.queue.id());
                    }
                }
            }
            drained
        };

        ACTIVE_SUBSCRIPTIONS.sub(registrations.len() as i64);
        for registration in &registrations {
            registration.queue.begin_drain();
        }
        info!(count = registrations.len(), "draining all subscriptions");
        registrations.len()
    }

    /// Unlinks a subscription from the index without touching its buffer.
    fn detach(
        &self,
        id: SubscriptionId,
    ) -> Option<Arc<SubscriberQueue>> {
        let registration = {
            let mut subscriptions = self.inner.subscriptions.lock();
            let registration = subscriptions.remove(&id)?;
            for topic in &registration.topics {
                if let Some(slot) = self.slot(topic) {
                    slot.detach(id);
                }
            }
            registration
        };
        ACTIVE_SUBSCRIPTIONS.dec();
        Some(registration.queue)
    }

    pub fn state(
        &self,
        id: SubscriptionId,
    ) -> Option<SubscriptionState> {
        self.inner
            .subscriptions
            .lock()
            .get(&id)
            .map(|r| r.queue.state())
    }

    pub fn topics_of(
        &self,
        id: SubscriptionId,
    ) -> Option<Vec<Topic>> {
        self.inner
            .subscriptions
            .lock()
            .get(&id)
            .map(|r| r.topics.iter().cloned().collect())
    }

    /// Sequence number of the last event published on `topic`.
    pub fn last_sequence(
        &self,
        topic: &Topic,
    ) -> u64 {
        self.slot(topic).map(|slot| *slot.sequence.lock()).unwrap_or(0)
    }

    pub fn subscriber_count(
        &self,
        topic: &Topic,
    ) -> usize {
        self.slot(topic)
            .map(|slot| slot.subscribers.load().len())
            .unwrap_or(0)
    }

    pub fn subscription_count(&self) -> usize {
        self.inner.subscriptions.lock().len()
    }

    pub fn topic_count(&self) -> usize {
        self.inner.topics.load().len()
    }

    /// Called from [`Subscription`]'s drop.
    pub(super) fn release(
        &self,
        id: SubscriptionId,
    ) {
        if self.detach(id).is_some() {
            trace!(subscription = id, "subscription dropped");
        }
    }
}
