use std::sync::Once;

use lazy_static::lazy_static;
use prometheus::exponential_buckets;
use prometheus::HistogramOpts;
use prometheus::HistogramVec;
use prometheus::IntCounter;
use prometheus::IntCounterVec;
use prometheus::IntGauge;
use prometheus::Opts;
use prometheus::Registry;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;
use warp::Filter;
use warp::Rejection;
use warp::Reply;


lazy_static! {
    pub static ref PROBE_DURATION_METRIC: HistogramVec = HistogramVec::new(
        HistogramOpts::new("probe_duration_ms", "Histogram of probe invocation duration in ms")
            .buckets(exponential_buckets(1.0, 2.0, 16).expect("valid buckets")),
        &["namespace"]
    )
    .expect("metric can not be created");

    pub static ref PROBE_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("probe_failures", "Probe invocations that failed or timed out"),
        &["namespace", "kind"]
    )
    .expect("Should succeed to create metric");

    pub static ref CACHE_READS: IntCounterVec = IntCounterVec::new(
        Opts::new("cache_reads", "Point reads by outcome (fresh, stale, refreshed, miss)"),
        &["outcome"]
    )
    .expect("Should succeed to create metric");

    pub static ref SINGLEFLIGHT_JOINS: IntCounter = IntCounter::new(
        "singleflight_joins",
        "Refresh requests that attached to an in-flight probe"
    )
    .expect("Should succeed to create metric");

    pub static ref EVENTS_PUBLISHED: IntCounterVec = IntCounterVec::new(
        Opts::new("events_published", "Events published per topic"),
        &["topic"]
    )
    .expect("Should succeed to create metric");

    pub static ref EVENTS_COALESCED: IntCounterVec = IntCounterVec::new(
        Opts::new("events_coalesced", "Change candidates superseded inside the debounce window"),
        &["namespace"]
    )
    .expect("Should succeed to create metric");

    pub static ref SUBSCRIBER_OVERFLOW: IntCounterVec = IntCounterVec::new(
        Opts::new("subscriber_overflow", "Full subscriber buffers, by backpressure policy"),
        &["policy"]
    )
    .expect("Should succeed to create metric");

    pub static ref ACTIVE_SUBSCRIPTIONS: IntGauge = IntGauge::new(
        "active_subscriptions",
        "Subscriptions currently registered with the hub"
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

static REGISTER: Once = Once::new();

pub(crate) fn register_custom_metrics(registry: &Registry) {
    registry
        .register(Box::new(PROBE_DURATION_METRIC.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(PROBE_FAILURES.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(CACHE_READS.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(SINGLEFLIGHT_JOINS.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(EVENTS_PUBLISHED.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(EVENTS_COALESCED.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(SUBSCRIBER_OVERFLOW.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(ACTIVE_SUBSCRIPTIONS.clone()))
        .expect("collector can be registered");
}

/// Serves `/metrics` until `shutdown` is cancelled.
pub async fn start_server(
    port: u16,
    shutdown: CancellationToken,
) {
    REGISTER.call_once(|| register_custom_metrics(&REGISTRY));

    let metrics_route = warp::path!("metrics").and_then(metrics_handler);

    info!(port, "metrics server listening");
    let (_, server) =
        warp::serve(metrics_route).bind_with_graceful_shutdown(([0, 0, 0, 0], port), async move {
            shutdown.cancelled().await;
        });
    server.await;
}

async fn metrics_handler() -> Result<impl Reply, Rejection> {
    Ok(render_metrics(&REGISTRY))
}

pub(crate) fn render_metrics(registry: &Registry) -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        error!("could not encode custom metrics: {}", e);
    };
    match String::from_utf8(buffer) {
        Ok(v) => v,
        Err(e) => {
            error!("custom metrics could not be from_utf8'd: {}", e);
            String::default()
        }
    }
}
