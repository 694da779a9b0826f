use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use tracing_test::traced_test;

use crate::test_utils::container;
use crate::test_utils::test_settings;
use crate::CacheError;
use crate::CoreBuilder;
use crate::Error;
use crate::FailureKind;
use crate::Probe;
use crate::ProbeError;
use crate::ResourceKey;
use crate::Snapshot;
use crate::SubscriptionState;
use crate::TelemetryCore;
use crate::Topic;

fn core() -> TelemetryCore {
    CoreBuilder::new(test_settings()).build().unwrap()
}

fn counting(
    state: &'static str,
    delay: Duration,
    calls: &Arc<AtomicU32>,
) -> Arc<dyn Probe> {
    let calls = calls.clone();
    Arc::new(crate::probe_fn(move |_key, _cancel| {
        let calls = calls.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
            Ok(container("abc", state))
        }
    }))
}

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

#[tokio::test(start_paused = true)]
async fn test_query_fetches_on_first_read() {
    let core = core();
    let key = ResourceKey::from("docker.container.abc");
    let calls = Arc::new(AtomicU32::new(0));
    core.register_probe(key.clone(), counting("running", ms(5), &calls), None, None)
        .unwrap();

    let entry = core.query(&key).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!entry.stale);
    assert!(matches!(entry.payload.as_deref(), Some(Snapshot::Container(c)) if c.state == "running"));

    // Second read is served from cache
    core.query(&key).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_queries_on_cold_key_share_one_probe_call() {
    let core = core();
    let key = ResourceKey::from("storage.disk.sda");
    let calls = Arc::new(AtomicU32::new(0));
    core.register_probe(key.clone(), counting("running", ms(300), &calls), None, None)
        .unwrap();

    let results = join_all((0..20).map(|_| core.query(&key))).await;

    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_query_unknown_key_is_a_miss() {
    let core = core();
    let err = core.query(&ResourceKey::from("vm.domain.unknown")).await.unwrap_err();

    match err {
        Error::Cache(CacheError::Miss { last_error, .. }) => {
            assert_eq!(last_error.map(|e| e.kind), Some(FailureKind::NotRegistered));
        }
        other => panic!("expected cache miss, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_query_envelope_exposes_staleness() {
    let core = core();
    let key = ResourceKey::from("ups.status");
    let healthy = Arc::new(Mutex::new(true));
    let probe: Arc<dyn Probe> = {
        let healthy = healthy.clone();
        Arc::new(crate::probe_fn(move |key: ResourceKey, _cancel| {
            let ok = *healthy.lock();
            async move {
                if ok {
                    Ok(container("ups", "ONLINE"))
                } else {
                    Err(ProbeError::failed(&key, "apcupsd: connection refused"))
                }
            }
        }))
    };
    core.register_probe(key.clone(), probe, None, None).unwrap();
    core.query(&key).await.unwrap();

    *healthy.lock() = false;
    core.collector().run_once(&key).await.unwrap_err();
    let envelope = core.query_envelope(&key).await.unwrap();

    assert!(envelope.stale);
    assert!(envelope.data.is_some());
    assert!(envelope.last_updated_ms.is_some());
    assert_eq!(envelope.last_error.unwrap().kind, FailureKind::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_subscribe_and_unsubscribe() {
    let core = core();
    let sub = core.subscribe([Topic::from("docker.events")]).unwrap();
    assert_eq!(core.hub().subscription_count(), 1);

    core.unsubscribe(sub.id()).unwrap();

    assert_eq!(core.hub().subscription_count(), 0);
    assert_eq!(sub.state(), SubscriptionState::Closed);
}

#[tokio::test(start_paused = true)]
#[traced_test]
async fn test_shutdown_drains_and_stops_collection() {
    let core = core();
    let key = ResourceKey::from("docker.container.abc");
    let calls = Arc::new(AtomicU32::new(0));
    core.register_probe(key.clone(), counting("running", ms(1), &calls), Some(ms(1_000)), None)
        .unwrap();
    let mut sub = core.subscribe([Topic::from("docker.events")]).unwrap();
    core.start();
    tokio::time::sleep(ms(1_500)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    assert!(core.shutdown().await);

    assert_eq!(sub.state(), SubscriptionState::Closed);
    assert!(sub.recv().await.is_none());
    tokio::time::sleep(ms(5_000)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(logs_contain("telemetry core stopped"));
}

#[tokio::test(start_paused = true)]
#[traced_test]
async fn test_warm_up_fills_cache_and_counts_failures() {
    let core = core();
    let healthy = ResourceKey::from("docker.container.abc");
    let broken = ResourceKey::from("ups.status");
    let calls = Arc::new(AtomicU32::new(0));
    core.register_probe(healthy.clone(), counting("running", ms(5), &calls), None, None)
        .unwrap();
    let failing: Arc<dyn Probe> = Arc::new(crate::probe_fn(|key: ResourceKey, _cancel| async move {
        Err(ProbeError::failed(&key, "apcupsd: connection refused"))
    }));
    core.register_probe(broken.clone(), failing, None, None).unwrap();

    assert_eq!(core.warm_up().await, 1);

    assert!(core.cache().get(&healthy).unwrap().payload.is_some());
    assert_eq!(
        core.cache().get(&broken).unwrap().last_error.unwrap().kind,
        FailureKind::Failed
    );
    assert!(logs_contain("warm-up refresh failed"));

    // The healthy key was just fetched, so starting does not probe it again
    core.start();
    tokio::time::sleep(ms(100)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(core.shutdown().await);
}
