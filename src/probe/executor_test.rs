use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::FailureKind;
use crate::ProbeError;
use crate::ResourceKey;
use crate::Snapshot;

fn raw(value: serde_json::Value) -> Snapshot {
    Snapshot::Raw(value)
}

fn hung_probe() -> Arc<dyn Probe> {
    Arc::new(probe_fn(|_key, _cancel| async move {
        futures::future::pending::<()>().await;
        Ok(raw(json!({})))
    }))
}

fn call(
    key: &str,
    probe: Arc<dyn Probe>,
    timeout_ms: u64,
) -> ProbeCall {
    ProbeCall {
        key: ResourceKey::from(key),
        probe,
        timeout: Duration::from_millis(timeout_ms),
    }
}

#[tokio::test]
async fn test_execute_returns_probe_snapshot() {
    let mut mock = MockProbe::new();
    mock.expect_fetch()
        .times(1)
        .returning(|_, _| Ok(Snapshot::Raw(json!({ "status": "ONLINE" }))));

    let executor = ProbeExecutor::new(CancellationToken::new());
    let result = executor.execute(call("ups.status", Arc::new(mock), 1000)).await;

    assert!(result.outcome.is_ok());
    assert_eq!(result.key.as_str(), "ups.status");
    assert_eq!(result.outcome.unwrap(), raw(json!({ "status": "ONLINE" })));
}

#[tokio::test]
async fn test_execute_passes_through_probe_failure() {
    let mut mock = MockProbe::new();
    mock.expect_fetch()
        .returning(|key, _| Err(ProbeError::failed(key, "smartctl exited with 2")));

    let executor = ProbeExecutor::new(CancellationToken::new());
    let result = executor.execute(call("storage.disk.sda", Arc::new(mock), 1000)).await;

    let err = result.outcome.unwrap_err();
    assert_eq!(err.kind(), FailureKind::Failed);
    assert_eq!(err.key().as_str(), "storage.disk.sda");
}

#[tokio::test(start_paused = true)]
async fn test_execute_times_out_hung_probe() {
    let executor = ProbeExecutor::new(CancellationToken::new());
    let started = Instant::now();

    let result = executor.execute(call("ups.status", hung_probe(), 200)).await;

    assert!(matches!(
        result.outcome,
        Err(ProbeError::Timeout { duration, .. }) if duration == Duration::from_millis(200)
    ));
    assert_eq!(started.elapsed(), Duration::from_millis(200));
}

#[tokio::test(start_paused = true)]
async fn test_execute_cancels_probe_token_on_timeout() {
    let (tx, rx) = tokio::sync::oneshot::channel::<CancellationToken>();
    let tx = parking_lot::Mutex::new(Some(tx));
    let probe: Arc<dyn Probe> = Arc::new(probe_fn(move |_key, cancel: CancellationToken| {
        if let Some(tx) = tx.lock().take() {
            let _ = tx.send(cancel.clone());
        }
        async move {
            futures::future::pending::<()>().await;
            Ok(Snapshot::Raw(json!({})))
        }
    }));

    let executor = ProbeExecutor::new(CancellationToken::new());
    let result = executor.execute(call("vm.domain.win11", probe, 50)).await;
    assert!(matches!(result.outcome, Err(ProbeError::Timeout { .. })));

    let token = rx.await.unwrap();
    assert!(token.is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn test_execute_reports_cancelled_on_shutdown() {
    let shutdown = CancellationToken::new();
    let executor = ProbeExecutor::new(shutdown.clone());

    let handle = tokio::spawn({
        let executor = executor.clone();
        async move { executor.execute(call("sensors.coretemp", hung_probe(), 60_000)).await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    shutdown.cancel();

    let result = handle.await.unwrap();
    assert!(matches!(result.outcome, Err(ProbeError::Cancelled { .. })));
}
