use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
#[cfg(test)]
use mockall::automock;
use tokio_util::task::TaskTracker;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::hub::StateCell;
use crate::Event;
use crate::EventHub;
use crate::Result;
use crate::Subscription;
use crate::SubscriptionError;
use crate::SubscriptionId;
use crate::SubscriptionState;
use crate::Topic;

pub type ConnectionId = u64;

/// Outbound half of a push transport (a WebSocket, an SSE response, ...).
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Sink: Send + Sync + 'static {
    /// Writes one serialized frame. An error ends the connection.
    async fn send(
        &self,
        frame: String,
    ) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

struct Connection {
    state: Arc<StateCell>,
    sink: Arc<dyn Sink>,
    subscription: Option<SubscriptionId>,
}

struct RegistryInner {
    hub: EventHub,
    connections: DashMap<ConnectionId, Connection>,
    next_id: AtomicU64,
    tracker: TaskTracker,
}

/// Connection-level state of push consumers.
///
/// Each connection multiplexes any number of topics onto one hub
/// subscription and owns one delivery task. Events are encoded to JSON frames
/// only inside that task, so the hub and cache stay transport-agnostic.
#[derive(Clone)]
pub struct SubscriberRegistry {
    inner: Arc<RegistryInner>,
}

impl std::fmt::Debug for SubscriberRegistry {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("SubscriberRegistry")
            .field("connections", &self.inner.connections.len())
            .finish()
    }
}

impl SubscriberRegistry {
    pub fn new(
        hub: EventHub,
        tracker: TaskTracker,
    ) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                hub,
                connections: DashMap::new(),
                next_id: AtomicU64::new(1),
                tracker,
            }),
        }
    }

    /// Registers a transport connection in `Connecting`.
    pub fn connect(
        &self,
        sink: Arc<dyn Sink>,
    ) -> ConnectionId {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.connections.insert(
            id,
            Connection {
                state: Arc::new(StateCell::new(SubscriptionState::Connecting)),
                sink,
                subscription: None,
            },
        );
        debug!(connection = id, "connection registered");
        id
    }

    /// Completes the handshake: subscribes to `topics`, moves the connection
    /// to `Active` and starts delivery.
    pub fn activate<I>(
        &self,
        id: ConnectionId,
        topics: I,
    ) -> Result<()>
    where
        I: IntoIterator<Item = Topic>,
    {
        let mut connection = self
            .inner
            .connections
            .get_mut(&id)
            .ok_or(SubscriptionError::NotFound { id })?;

        let current = connection.state.get();
        if !current.can_transition_to(SubscriptionState::Active) {
            return Err(SubscriptionError::InvalidTransition {
                from: current,
                to: SubscriptionState::Active,
            }
            .into());
        }

        let subscription = self.inner.hub.subscribe(topics)?;
        connection.state.transition(SubscriptionState::Active)?;
        connection.subscription = Some(subscription.id());

        let state = connection.state.clone();
        let sink = connection.sink.clone();
        drop(connection);

        info!(connection = id, subscription = subscription.id(), "connection active");
        let inner = self.inner.clone();
        self.inner
            .tracker
            .spawn(deliver(inner, id, subscription, sink, state));
        Ok(())
    }

    /// Adds topics to an active connection.
    pub fn add_topics<I>(
        &self,
        id: ConnectionId,
        topics: I,
    ) -> Result<()>
    where
        I: IntoIterator<Item = Topic>,
    {
        let subscription = self.active_subscription(id)?;
        self.inner.hub.add_topics(subscription, topics)
    }

    /// Graceful close: stop accepting events, flush what is buffered, then
    /// close the sink.
    pub fn drain(
        &self,
        id: ConnectionId,
    ) -> Result<()> {
        let subscription = self.active_subscription(id)?;
        if let Some(connection) = self.inner.connections.get(&id) {
            connection.state.transition(SubscriptionState::Draining)?;
        }
        self.inner.hub.drain(subscription)
    }

    /// Drains every active connection. Returns how many were drained.
    pub fn drain_all(&self) -> usize {
        let ids: Vec<ConnectionId> = self
            .inner
            .connections
            .iter()
            .filter(|c| c.state.get() == SubscriptionState::Active)
            .map(|c| *c.key())
            .collect();
        ids.into_iter().filter(|id| self.drain(*id).is_ok()).count()
    }

    /// Immediate close. Buffered events are discarded.
    pub fn disconnect(
        &self,
        id: ConnectionId,
    ) -> Result<()> {
        let (_, connection) = self
            .inner
            .connections
            .remove(&id)
            .ok_or(SubscriptionError::NotFound { id })?;
        connection.state.close();
        match connection.subscription {
            // The delivery task sees the closed queue and closes the sink
            Some(subscription) => {
                if let Err(e) = self.inner.hub.unsubscribe(subscription) {
                    debug!(connection = id, subscription, "unsubscribe failed: {}", e);
                }
            }
            None => {
                let sink = connection.sink.clone();
                self.inner.tracker.spawn(async move {
                    if let Err(e) = sink.close().await {
                        debug!(connection = id, "sink close failed: {}", e);
                    }
                });
            }
        }
        info!(connection = id, "connection closed");
        Ok(())
    }

    /// `None` once the connection is closed and released.
    pub fn state(
        &self,
        id: ConnectionId,
    ) -> Option<SubscriptionState> {
        self.inner.connections.get(&id).map(|c| c.state.get())
    }

    pub fn connection_count(&self) -> usize {
        self.inner.connections.len()
    }

    fn active_subscription(
        &self,
        id: ConnectionId,
    ) -> Result<SubscriptionId> {
        let connection = self
            .inner
            .connections
            .get(&id)
            .ok_or(SubscriptionError::NotFound { id })?;
        match (connection.state.get(), connection.subscription) {
            (SubscriptionState::Active, Some(subscription)) => Ok(subscription),
            (SubscriptionState::Closed, _) => Err(SubscriptionError::Closed { id }.into()),
            (from, _) => Err(SubscriptionError::InvalidTransition {
                from,
                to: SubscriptionState::Draining,
            }
            .into()),
        }
    }
}

fn encode(event: &Event) -> Result<String> {
    Ok(serde_json::to_string(&event.to_envelope())?)
}

/// Per-connection delivery loop.
async fn deliver(
    inner: Arc<RegistryInner>,
    id: ConnectionId,
    mut subscription: Subscription,
    sink: Arc<dyn Sink>,
    state: Arc<StateCell>,
) {
    while let Some(event) = subscription.recv().await {
        let frame = match encode(&event) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(connection = id, key = %event.key, "failed to encode event: {}", e);
                continue;
            }
        };
        if let Err(e) = sink.send(frame).await {
            warn!(connection = id, "delivery failed, closing connection: {}", e);
            break;
        }
    }

    if subscription.is_overflowed() {
        warn!(connection = id, "connection fell behind and was disconnected");
    }
    state.close();
    if let Err(e) = sink.close().await {
        debug!(connection = id, "sink close failed: {}", e);
    }
    inner.connections.remove(&id);
    debug!(connection = id, "delivery stopped");
}
