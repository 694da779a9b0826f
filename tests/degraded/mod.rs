use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use telehub::CacheError;
use telehub::CoreBuilder;
use telehub::Error;
use telehub::FailureKind;
use telehub::ResourceKey;
use telehub::TtlPolicy;

use crate::common::scripted;
use crate::common::settings;
use crate::common::ups_online;
use crate::common::Script;

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

#[tokio::test(start_paused = true)]
async fn test_timing_out_ups_degrades_then_recovers() {
    let mut settings = settings();
    settings.cache.kind_ttl.insert(
        "ups".to_string(),
        TtlPolicy {
            soft_ttl_ms: 2_000,
            hard_ttl_ms: 4_000,
        },
    );
    let core = CoreBuilder::new(settings).build().unwrap();
    let key = ResourceKey::from("ups.status");
    let script = Arc::new(Mutex::new(Script::Return(ups_online())));
    core.register_probe(key.clone(), scripted(&script), None, Some(ms(500))).unwrap();

    core.query(&key).await.unwrap();
    *script.lock() = Script::Hang;

    // Between soft and hard expiry: last value served, refresh in background
    tokio::time::sleep(ms(3_000)).await;
    let entry = core.query(&key).await.unwrap();
    assert!(entry.stale);
    assert!(entry.payload.is_some());

    tokio::time::sleep(ms(600)).await;
    let envelope = core.cache().get(&key).unwrap().to_envelope();
    assert!(envelope.stale);
    assert!(envelope.data.is_some());
    assert_eq!(envelope.last_error.unwrap().kind, FailureKind::Timeout);

    // Past hard expiry the forced refresh times out as well
    tokio::time::sleep(ms(1_000)).await;
    match core.query(&key).await.unwrap_err() {
        Error::Cache(CacheError::Miss { last_error, .. }) => {
            assert_eq!(last_error.unwrap().kind, FailureKind::Timeout);
        }
        other => panic!("expected cache miss, got {other:?}"),
    }

    *script.lock() = Script::Return(ups_online());
    let entry = core.query(&key).await.unwrap();
    assert!(!entry.stale);
    assert!(entry.last_error.is_none());

    assert!(core.shutdown().await);
}

#[tokio::test(start_paused = true)]
async fn test_query_timeout_past_hard_ttl_keeps_last_error() {
    let mut settings = settings();
    settings.cache.kind_ttl.insert(
        "ups".to_string(),
        TtlPolicy {
            soft_ttl_ms: 2_000,
            hard_ttl_ms: 4_000,
        },
    );
    let core = CoreBuilder::new(settings).build().unwrap();
    let key = ResourceKey::from("ups.status");
    let script = Arc::new(Mutex::new(Script::Return(ups_online())));
    // Probe deadline longer than the 2s query timeout
    core.register_probe(key.clone(), scripted(&script), None, Some(ms(5_000))).unwrap();

    core.query(&key).await.unwrap();
    *script.lock() = Script::Hang;

    // Background refresh started at t=3 times out at t=8
    tokio::time::sleep(ms(3_000)).await;
    assert!(core.query(&key).await.unwrap().stale);
    tokio::time::sleep(ms(5_500)).await;
    assert_eq!(
        core.cache().get(&key).unwrap().last_error.map(|e| e.kind),
        Some(FailureKind::Timeout)
    );

    match core.query(&key).await.unwrap_err() {
        Error::Cache(CacheError::RefreshTimeout { last_error, .. }) => {
            assert_eq!(last_error.unwrap().kind, FailureKind::Timeout);
        }
        other => panic!("expected refresh timeout, got {other:?}"),
    }

    assert!(core.shutdown().await);
}

#[tokio::test(start_paused = true)]
async fn test_hung_probe_does_not_block_other_reads() {
    let core = CoreBuilder::new(settings()).build().unwrap();
    let ups = ResourceKey::from("ups.status");
    let docker = ResourceKey::from("docker.container.abc");
    let hung = Arc::new(Mutex::new(Script::Hang));
    let healthy = Arc::new(Mutex::new(Script::Return(crate::common::container("running"))));
    core.register_probe(ups.clone(), scripted(&hung), None, Some(ms(60_000))).unwrap();
    core.register_probe(docker.clone(), scripted(&healthy), None, None).unwrap();

    let started = tokio::time::Instant::now();
    let (ups_read, docker_read) = tokio::join!(core.query(&ups), core.query(&docker));

    assert!(docker_read.is_ok());
    // Bounded by the query timeout, not the probe deadline
    assert!(matches!(
        ups_read.unwrap_err(),
        Error::Cache(CacheError::RefreshTimeout { .. })
    ));
    assert_eq!(started.elapsed(), ms(2_000));

    assert!(core.shutdown().await);
}
