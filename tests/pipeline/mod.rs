use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use telehub::CoreBuilder;
use telehub::ResourceKey;
use telehub::Topic;

use crate::common::container;
use crate::common::container_state;
use crate::common::scripted;
use crate::common::settings;
use crate::common::Script;

fn secs(n: f64) -> Duration {
    Duration::from_secs_f64(n)
}

#[tokio::test(start_paused = true)]
async fn test_state_change_flows_from_probe_to_subscriber_and_cache() {
    let core = CoreBuilder::new(settings()).build().unwrap();
    let key = ResourceKey::from("docker.container.abc");
    let script = Arc::new(Mutex::new(Script::Return(container("running"))));
    core.register_probe(key.clone(), scripted(&script), None, None).unwrap();
    let mut events = core.subscribe([Topic::from("docker.events")]).unwrap();
    core.start();

    // t=4: inside soft TTL
    tokio::time::sleep(secs(4.0)).await;
    let entry = core.query(&key).await.unwrap();
    assert!(!entry.stale);
    assert_eq!(container_state(entry.payload.as_deref().unwrap()), "running");

    // the next scheduled tick (t=5) sees the container exited
    *script.lock() = Script::Return(container("exited"));

    // t=6
    tokio::time::sleep(secs(2.0)).await;
    let entry = core.query(&key).await.unwrap();
    assert_eq!(container_state(entry.payload.as_deref().unwrap()), "exited");

    let event = events.try_recv().expect("one event within one interval");
    assert_eq!(event.key, key);
    assert_eq!(event.topic, Topic::from("docker.events"));
    assert_eq!(container_state(&event.payload), "exited");
    assert!(events.try_recv().is_none());

    // Unchanged polls produce nothing
    tokio::time::sleep(secs(20.0)).await;
    assert!(events.try_recv().is_none());

    assert!(core.shutdown().await);
}

#[tokio::test(start_paused = true)]
async fn test_flapping_inside_debounce_window_is_suppressed() {
    let mut settings = settings();
    settings.collector.default_interval_ms = 100;
    settings.detector.debounce_ms = 1_000;
    let core = CoreBuilder::new(settings).build().unwrap();
    let key = ResourceKey::from("docker.container.abc");
    let script = Arc::new(Mutex::new(Script::Return(container("running"))));
    core.register_probe(key.clone(), scripted(&script), None, None).unwrap();
    let mut events = core.subscribe([Topic::from("docker.events")]).unwrap();
    core.start();

    tokio::time::sleep(secs(0.15)).await;
    *script.lock() = Script::Return(container("restarting"));
    tokio::time::sleep(secs(0.2)).await;
    *script.lock() = Script::Return(container("running"));
    tokio::time::sleep(secs(2.0)).await;

    assert!(events.try_recv().is_none());
    assert!(core.shutdown().await);
}

#[tokio::test(start_paused = true)]
async fn test_burst_of_changes_coalesces_to_latest() {
    let mut settings = settings();
    settings.collector.default_interval_ms = 100;
    settings.detector.debounce_ms = 1_000;
    let core = CoreBuilder::new(settings).build().unwrap();
    let key = ResourceKey::from("docker.container.abc");
    let script = Arc::new(Mutex::new(Script::Return(container("running"))));
    core.register_probe(key.clone(), scripted(&script), None, None).unwrap();
    let mut events = core.subscribe([Topic::from("docker.events")]).unwrap();
    core.start();

    tokio::time::sleep(secs(0.15)).await;
    for state in ["restarting", "created", "exited"] {
        *script.lock() = Script::Return(container(state));
        tokio::time::sleep(secs(0.1)).await;
    }
    tokio::time::sleep(secs(2.0)).await;

    let event = events.try_recv().unwrap();
    assert_eq!(container_state(&event.payload), "exited");
    assert!(events.try_recv().is_none());
    assert!(core.shutdown().await);
}
