use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::info;
use tracing::warn;

use crate::utils::async_task::wait_tracked;
use crate::CacheEntry;
use crate::ChangeDetector;
use crate::Collector;
use crate::Envelope;
use crate::EventHub;
use crate::Probe;
use crate::ResourceKey;
use crate::Result;
use crate::Settings;
use crate::SubscriberRegistry;
use crate::Subscription;
use crate::SubscriptionId;
use crate::Topic;
use crate::TtlCache;

/// The assembled collection and caching core.
///
/// Built by [`CoreBuilder`](super::CoreBuilder). Transports (HTTP,
/// WebSocket, CLI) talk to this type only.
pub struct TelemetryCore {
    pub(super) settings: Arc<Settings>,
    pub(super) cache: Arc<TtlCache>,
    pub(super) collector: Collector,
    pub(super) detector: ChangeDetector,
    pub(super) hub: EventHub,
    pub(super) registry: SubscriberRegistry,
    pub(super) tracker: TaskTracker,
    pub(super) shutdown: CancellationToken,
}

impl std::fmt::Debug for TelemetryCore {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("TelemetryCore")
            .field("collector", &self.collector)
            .field("cache", &self.cache)
            .field("hub", &self.hub)
            .finish()
    }
}

impl TelemetryCore {
    /// Registers a probe for `key`. `None` falls back to the collector
    /// defaults.
    pub fn register_probe(
        &self,
        key: ResourceKey,
        probe: Arc<dyn Probe>,
        interval: Option<Duration>,
        timeout: Option<Duration>,
    ) -> Result<()> {
        let config = &self.settings.collector;
        self.collector.register(
            key,
            probe,
            interval.unwrap_or_else(|| config.default_interval()),
            timeout.unwrap_or_else(|| config.default_timeout()),
        )
    }

    pub fn unregister_probe(
        &self,
        key: &ResourceKey,
    ) -> bool {
        self.collector.unregister(key)
    }

    /// Refreshes every registered key once, concurrently, and returns how
    /// many refreshes failed. Collection loops started afterwards skip their
    /// immediate first tick for keys fetched here.
    pub async fn warm_up(&self) -> usize {
        let mut results = self.collector.collect_all();
        let mut failed = 0;
        while let Some((key, outcome)) = results.next().await {
            if let Err(e) = outcome {
                warn!(%key, "warm-up refresh failed: {}", e);
                failed += 1;
            }
        }
        info!(keys = self.collector.job_count(), failed, "warm-up finished");
        failed
    }

    /// Starts periodic collection.
    pub fn start(&self) {
        self.collector.start();
    }

    /// Point read. Refreshes on demand only past the key's hard TTL.
    pub async fn query(
        &self,
        key: &ResourceKey,
    ) -> Result<CacheEntry> {
        let collector = self.collector.clone();
        let refresh_key = key.clone();
        let entry = self
            .cache
            .get_or_refresh(key, move || async move { collector.run_once(&refresh_key).await })
            .await?;
        Ok(entry)
    }

    /// [`query`](Self::query) in transport form.
    pub async fn query_envelope(
        &self,
        key: &ResourceKey,
    ) -> Result<Envelope> {
        Ok(self.query(key).await?.to_envelope())
    }

    pub fn subscribe<I>(
        &self,
        topics: I,
    ) -> Result<Subscription>
    where
        I: IntoIterator<Item = Topic>,
    {
        self.hub.subscribe(topics)
    }

    pub fn unsubscribe(
        &self,
        id: SubscriptionId,
    ) -> Result<()> {
        self.hub.unsubscribe(id)
    }

    pub fn registry(&self) -> &SubscriberRegistry {
        &self.registry
    }

    pub fn hub(&self) -> &EventHub {
        &self.hub
    }

    pub fn cache(&self) -> &Arc<TtlCache> {
        &self.cache
    }

    pub fn collector(&self) -> &Collector {
        &self.collector
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Graceful stop.
    ///
    /// Cancels collection loops and in-flight probes, publishes open debounce
    /// windows, drains every subscription, then waits up to
    /// `collector.shutdown_grace_ms` for background tasks. Returns `false` if
    /// tasks were still running when the grace period ended.
    pub async fn shutdown(&self) -> bool {
        info!("shutting down telemetry core");
        self.shutdown.cancel();

        let flushed = self.detector.flush_all();
        let connections = self.registry.drain_all();
        let subscriptions = self.hub.drain_all();
        info!(flushed, connections, subscriptions, "subscriptions draining");

        let clean = wait_tracked(&self.tracker, self.settings.collector.shutdown_grace()).await;
        if !clean {
            warn!("shutdown grace period elapsed with tasks still running");
        }
        info!("telemetry core stopped");
        clean
    }
}
