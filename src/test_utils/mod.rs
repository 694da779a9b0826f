//! Fixtures shared by the unit tests.

use crate::CacheConfig;
use crate::CollectorConfig;
use crate::ContainerSnapshot;
use crate::DetectorConfig;
use crate::HubConfig;
use crate::OverflowPolicy;
use crate::Settings;
use crate::Snapshot;
use crate::TtlPolicy;
use crate::UpsSnapshot;

/// Small windows so paused-clock tests stay readable.
///
/// No jitter, 200ms debounce, 1s soft / 5s hard TTL, 16-event buffers.
pub fn test_settings() -> Settings {
    Settings {
        cache: CacheConfig {
            shard_count: 4,
            default_ttl: TtlPolicy {
                soft_ttl_ms: 1_000,
                hard_ttl_ms: 5_000,
            },
            query_timeout_ms: 2_000,
            ..Default::default()
        },
        collector: CollectorConfig {
            default_interval_ms: 1_000,
            default_timeout_ms: 500,
            jitter_ratio: 0.0,
            shutdown_grace_ms: 1_000,
        },
        detector: DetectorConfig {
            debounce_ms: 200,
            emit_initial: false,
        },
        hub: HubConfig {
            subscriber_buffer_size: 16,
            overflow_policy: OverflowPolicy::DropOldest,
        },
        ..Default::default()
    }
}

pub fn container(
    id: &str,
    state: &str,
) -> Snapshot {
    Snapshot::Container(ContainerSnapshot {
        id: id.to_string(),
        name: format!("/{id}"),
        image: "nginx:1.27".to_string(),
        state: state.to_string(),
        health: None,
        observed_at_ms: crate::utils::time::now_millis(),
    })
}

pub fn ups(
    status: &str,
    battery_charge_pct: f64,
    time_left_secs: u64,
) -> Snapshot {
    Snapshot::Ups(UpsSnapshot {
        status: status.to_string(),
        on_battery: status != "ONLINE",
        battery_charge_pct,
        load_pct: 23.0,
        time_left_secs,
        observed_at_ms: crate::utils::time::now_millis(),
    })
}
