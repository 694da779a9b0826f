use std::sync::Arc;

use futures::stream::BoxStream;
use futures::StreamExt;

use super::Event;
use super::EventHub;
use super::SubscriberQueue;
use super::SubscriptionId;
use super::SubscriptionState;

/// Receive-only event stream returned by [`Subscription::into_stream`].
pub type EventStream = BoxStream<'static, Event>;

/// Consumer handle of one hub subscription.
///
/// Dropping the handle unsubscribes.
pub struct Subscription {
    queue: Arc<SubscriberQueue>,
    hub: EventHub,
}

impl std::fmt::Debug for Subscription {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id())
            .field("state", &self.state())
            .field("buffered", &self.queue.len())
            .finish()
    }
}

impl Subscription {
    pub(super) fn new(
        queue: Arc<SubscriberQueue>,
        hub: EventHub,
    ) -> Self {
        Self { queue, hub }
    }

    pub fn id(&self) -> SubscriptionId {
        self.queue.id()
    }

    pub fn state(&self) -> SubscriptionState {
        self.queue.state()
    }

    /// Events evicted under the drop-oldest policy.
    pub fn dropped(&self) -> u64 {
        self.queue.dropped()
    }

    /// Whether the hub disconnected this subscription because it fell behind.
    pub fn is_overflowed(&self) -> bool {
        self.queue.is_overflowed()
    }

    pub fn buffered(&self) -> usize {
        self.queue.len()
    }

    /// Waits for the next event. `None` once the subscription is closed.
    pub async fn recv(&mut self) -> Option<Event> {
        self.queue.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Event> {
        self.queue.try_recv()
    }

    pub fn into_stream(self) -> EventStream {
        futures::stream::unfold(self, |mut subscription| async move {
            subscription.recv().await.map(|event| (event, subscription))
        })
        .boxed()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.release(self.id());
        self.queue.close();
    }
}
