use std::sync::Arc;

use parking_lot::Mutex;
use telehub::probe_fn;
use telehub::CacheConfig;
use telehub::CollectorConfig;
use telehub::ContainerSnapshot;
use telehub::DetectorConfig;
use telehub::HubConfig;
use telehub::OverflowPolicy;
use telehub::Probe;
use telehub::ProbeError;
use telehub::Settings;
use telehub::Snapshot;
use telehub::TtlPolicy;
use telehub::UpsSnapshot;

/// Deterministic settings: no jitter, 5s collection, 200ms debounce.
pub fn settings() -> Settings {
    Settings {
        cache: CacheConfig {
            shard_count: 4,
            default_ttl: TtlPolicy {
                soft_ttl_ms: 10_000,
                hard_ttl_ms: 30_000,
            },
            query_timeout_ms: 2_000,
            ..Default::default()
        },
        collector: CollectorConfig {
            default_interval_ms: 5_000,
            default_timeout_ms: 500,
            jitter_ratio: 0.0,
            shutdown_grace_ms: 1_000,
        },
        detector: DetectorConfig {
            debounce_ms: 200,
            emit_initial: false,
        },
        hub: HubConfig {
            subscriber_buffer_size: 8,
            overflow_policy: OverflowPolicy::DropOldest,
        },
        ..Default::default()
    }
}

pub fn container(state: &str) -> Snapshot {
    Snapshot::Container(ContainerSnapshot {
        id: "abc".to_string(),
        name: "/web".to_string(),
        image: "nginx:1.27".to_string(),
        state: state.to_string(),
        health: None,
        observed_at_ms: 0,
    })
}

pub fn ups_online() -> Snapshot {
    Snapshot::Ups(UpsSnapshot {
        status: "ONLINE".to_string(),
        on_battery: false,
        battery_charge_pct: 100.0,
        load_pct: 18.0,
        time_left_secs: 3_600,
        observed_at_ms: 0,
    })
}

pub fn container_state(snapshot: &Snapshot) -> &str {
    match snapshot {
        Snapshot::Container(c) => &c.state,
        _ => "",
    }
}

/// What a [`scripted`] probe does on its next call.
#[derive(Clone)]
pub enum Script {
    Return(Snapshot),
    /// Never answers; only the executor deadline ends the call.
    Hang,
}

pub fn scripted(script: &Arc<Mutex<Script>>) -> Arc<dyn Probe> {
    let script = script.clone();
    Arc::new(probe_fn(move |key, cancel| {
        let current = script.lock().clone();
        async move {
            match current {
                Script::Return(snapshot) => Ok(snapshot),
                Script::Hang => {
                    cancel.cancelled().await;
                    Err(ProbeError::Cancelled { key })
                }
            }
        }
    }))
}
