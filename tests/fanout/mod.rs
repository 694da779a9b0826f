use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use telehub::CoreBuilder;
use telehub::Error;
use telehub::OverflowPolicy;
use telehub::ResourceKey;
use telehub::Result;
use telehub::Sink;
use telehub::SubscriptionState;
use telehub::SystemError;
use telehub::Topic;
use tokio::sync::mpsc;

use crate::common::container;
use crate::common::scripted;
use crate::common::settings;
use crate::common::Script;

/// Forwards frames to a channel, like a WebSocket writer would.
struct ChannelSink {
    frames: mpsc::UnboundedSender<String>,
    closed: AtomicBool,
}

#[async_trait]
impl Sink for ChannelSink {
    async fn send(
        &self,
        frame: String,
    ) -> Result<()> {
        self.frames
            .send(frame)
            .map_err(|e| Error::System(SystemError::Transport(e.to_string())))
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

fn publish_states(
    core: &telehub::TelemetryCore,
    count: usize,
) {
    let key = ResourceKey::from("docker.container.abc");
    let topic = Topic::for_key(&key);
    for i in 0..count {
        core.hub()
            .publish(&topic, key.clone(), Arc::new(container(&format!("state-{i}"))));
    }
}

#[tokio::test]
async fn test_slow_subscriber_drops_oldest_without_affecting_others() {
    let core = CoreBuilder::new(settings()).build().unwrap();
    let topics = [Topic::from("docker.events")];
    let mut fast = core.subscribe(topics.clone()).unwrap();
    let slow = core.subscribe(topics).unwrap();

    let key = ResourceKey::from("docker.container.abc");
    let topic = Topic::for_key(&key);
    let mut received = Vec::new();
    for i in 0..20 {
        core.hub()
            .publish(&topic, key.clone(), Arc::new(container(&format!("state-{i}"))));
        received.push(fast.try_recv().unwrap().sequence);
    }

    assert_eq!(received, (1..=20).collect::<Vec<u64>>());
    assert_eq!(fast.dropped(), 0);
    assert_eq!(slow.buffered(), 8);
    assert_eq!(slow.dropped(), 12);
    assert_eq!(slow.state(), SubscriptionState::Active);

    let mut slow = slow;
    let kept: Vec<u64> = std::iter::from_fn(|| slow.try_recv().map(|e| e.sequence)).collect();
    assert_eq!(kept, (13..=20).collect::<Vec<u64>>());
}

#[tokio::test]
async fn test_disconnect_policy_closes_only_the_lagging_subscriber() {
    let mut settings = settings();
    settings.hub.overflow_policy = OverflowPolicy::Disconnect;
    let core = CoreBuilder::new(settings).build().unwrap();
    let topics = [Topic::from("docker.events")];
    let mut healthy = core.subscribe(topics.clone()).unwrap();
    let mut lagging = core.subscribe(topics).unwrap();

    publish_states(&core, 8);
    while healthy.try_recv().is_some() {}
    publish_states(&core, 1);

    assert!(lagging.is_overflowed());
    assert_eq!(lagging.state(), SubscriptionState::Closed);
    assert!(lagging.recv().await.is_none());

    assert_eq!(healthy.state(), SubscriptionState::Active);
    assert_eq!(healthy.try_recv().unwrap().sequence, 9);
    assert_eq!(core.hub().subscription_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_registry_pushes_encoded_changes_and_closes_on_shutdown() {
    let core = CoreBuilder::new(settings()).build().unwrap();
    let key = ResourceKey::from("docker.container.abc");
    let script = Arc::new(Mutex::new(Script::Return(container("running"))));
    core.register_probe(key.clone(), scripted(&script), None, None).unwrap();

    let (tx, mut frames) = mpsc::unbounded_channel();
    let sink = Arc::new(ChannelSink {
        frames: tx,
        closed: AtomicBool::new(false),
    });
    let connection = core.registry().connect(sink.clone());
    assert_eq!(core.registry().state(connection), Some(SubscriptionState::Connecting));
    core.registry()
        .activate(connection, [Topic::from("docker.events")])
        .unwrap();
    core.start();

    tokio::time::sleep(Duration::from_secs(1)).await;
    *script.lock() = Script::Return(container("exited"));

    let frame = tokio::time::timeout(Duration::from_secs(10), frames.recv())
        .await
        .unwrap()
        .unwrap();
    let frame: serde_json::Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(frame["key"], "docker.container.abc");
    assert_eq!(frame["topic"], "docker.events");
    assert_eq!(frame["kind"], "container");
    assert_eq!(frame["sequence"], 1);
    assert_eq!(frame["data"]["state"], "exited");

    assert!(core.shutdown().await);
    assert!(sink.closed.load(Ordering::SeqCst));
    assert_eq!(core.registry().state(connection), None);
    assert_eq!(core.registry().connection_count(), 0);
}
