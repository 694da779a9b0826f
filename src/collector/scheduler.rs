use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::BoxStream;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use parking_lot::RwLock;
use rand::Rng;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;
use tracing::info;
use tracing::trace;

use super::Job;
use super::JobHandle;
use crate::utils::async_task::spawn_task;
use crate::utils::singleflight::SingleFlight;
use crate::ChangeDetector;
use crate::CollectorConfig;
use crate::Error;
use crate::Probe;
use crate::ProbeError;
use crate::ProbeExecutor;
use crate::ProbeResult;
use crate::ResourceKey;
use crate::Result;
use crate::TtlCache;

pub type RefreshOutcome = std::result::Result<(), ProbeError>;

struct CollectorInner {
    jobs: RwLock<HashMap<ResourceKey, JobHandle>>,
    cache: Arc<TtlCache>,
    detector: ChangeDetector,
    executor: ProbeExecutor,
    flights: SingleFlight<ResourceKey, RefreshOutcome>,
    config: CollectorConfig,
    tracker: TaskTracker,
    shutdown: CancellationToken,
    started: AtomicBool,
}

/// Owns probe registrations and is the only writer of the cache.
///
/// Every refresh of a key, scheduled or on demand, goes through one
/// single-flight group, so concurrent requests for a key share one probe call.
/// Probe failures are folded into the key's cache entry and never stop the
/// collection of other keys.
#[derive(Clone)]
pub struct Collector {
    inner: Arc<CollectorInner>,
}

impl std::fmt::Debug for Collector {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Collector")
            .field("jobs", &self.job_count())
            .field("started", &self.is_started())
            .finish()
    }
}

impl Collector {
    pub fn new(
        cache: Arc<TtlCache>,
        detector: ChangeDetector,
        config: CollectorConfig,
        tracker: TaskTracker,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(CollectorInner {
                jobs: RwLock::new(HashMap::new()),
                cache,
                detector,
                executor: ProbeExecutor::new(shutdown.clone()),
                flights: SingleFlight::new(tracker.clone()),
                config,
                tracker,
                shutdown,
                started: AtomicBool::new(false),
            }),
        }
    }

    /// Adds a recurring job, replacing any previous registration of `key`.
    /// Once the collector is started the job's loop begins immediately.
    pub fn register(
        &self,
        key: ResourceKey,
        probe: Arc<dyn Probe>,
        interval: Duration,
        timeout: Duration,
    ) -> Result<()> {
        if interval.is_zero() || timeout.is_zero() {
            return Err(Error::InvalidConfig(format!(
                "probe {key}: interval and timeout must be greater than 0"
            )));
        }

        let job = Arc::new(Job {
            key: key.clone(),
            probe,
            interval,
            timeout,
        });
        let stop = self.inner.shutdown.child_token();
        let replaced = self.inner.jobs.write().insert(
            key.clone(),
            JobHandle {
                job: job.clone(),
                stop: stop.clone(),
            },
        );
        if let Some(old) = replaced {
            old.stop.cancel();
            debug!(%key, "probe registration replaced");
        }
        info!(%key, ?interval, ?timeout, "probe registered");

        if self.is_started() {
            self.spawn_loop(job, stop);
        }
        Ok(())
    }

    /// Stops collecting `key` and forgets its cached state.
    pub fn unregister(
        &self,
        key: &ResourceKey,
    ) -> bool {
        let Some(handle) = self.inner.jobs.write().remove(key) else {
            return false;
        };
        handle.stop.cancel();
        self.inner.cache.remove(key);
        self.inner.detector.forget(key);
        info!(%key, "probe unregistered");
        true
    }

    /// Starts one collection loop per registered job. Idempotent.
    pub fn start(&self) {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let jobs: Vec<_> = self
            .inner
            .jobs
            .read()
            .values()
            .map(|h| (h.job.clone(), h.stop.clone()))
            .collect();
        info!(jobs = jobs.len(), "collector started");
        for (job, stop) in jobs {
            self.spawn_loop(job, stop);
        }
    }

    /// Refreshes `key` out of cycle. Attaches to an in-flight refresh of the
    /// same key instead of calling the probe again.
    pub async fn run_once(
        &self,
        key: &ResourceKey,
    ) -> RefreshOutcome {
        let job = self
            .job(key)
            .ok_or_else(|| ProbeError::NotRegistered { key: key.clone() })?;

        let this = self.clone();
        let (flight, joined) = self
            .inner
            .flights
            .run(key.clone(), move || async move { this.refresh(job).await });
        if joined {
            trace!(%key, "attached to in-flight refresh");
        }

        flight
            .await
            .unwrap_or_else(|| Err(ProbeError::failed(key, "refresh task aborted")))
    }

    /// Refreshes every registered key concurrently. Results are yielded as
    /// they complete.
    pub fn collect_all(&self) -> BoxStream<'static, (ResourceKey, RefreshOutcome)> {
        self.keys()
            .into_iter()
            .map(|key| {
                let this = self.clone();
                async move {
                    let outcome = this.run_once(&key).await;
                    (key, outcome)
                }
            })
            .collect::<FuturesUnordered<_>>()
            .boxed()
    }

    async fn refresh(
        &self,
        job: Arc<Job>,
    ) -> RefreshOutcome {
        let result = self.inner.executor.execute(job.call()).await;
        self.fold(result)
    }

    /// Writes one probe result into the cache and feeds successful payloads
    /// to the change detector.
    fn fold(
        &self,
        result: ProbeResult,
    ) -> RefreshOutcome {
        if let Err(e @ ProbeError::Cancelled { .. }) = &result.outcome {
            // Shutdown, not a property of the resource
            return Err(e.clone());
        }

        let error = result.outcome.as_ref().err().cloned();
        let key = result.key.clone();
        {
            // Held across the write so `unregister` cannot interleave with it
            let jobs = self.inner.jobs.read();
            if !jobs.contains_key(&key) {
                debug!(%key, "discarding result for unregistered key");
                return Err(ProbeError::NotRegistered { key });
            }
            let update = self.inner.cache.record(result);
            if let (None, Some(payload)) = (&error, update.entry.payload.clone()) {
                self.inner
                    .detector
                    .observe(&key, payload, update.previous.as_deref());
            }
        }
        match error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn spawn_loop(
        &self,
        job: Arc<Job>,
        stop: CancellationToken,
    ) {
        let delay = self.initial_delay(job.interval);
        let this = self.clone();
        let name = format!("collect {}", job.key);
        spawn_task(&self.inner.tracker, &name, move || async move {
            this.run_loop(job, delay, stop).await;
            Ok(())
        });
    }

    async fn run_loop(
        &self,
        job: Arc<Job>,
        delay: Duration,
        stop: CancellationToken,
    ) {
        tokio::select! {
            _ = stop.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }

        let mut ticker = tokio::time::interval(job.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        if self.fetched_within(&job.key, job.interval) {
            // The immediate first tick would only repeat a fresh fetch
            ticker.tick().await;
            trace!(key = %job.key, "skipping first tick, entry is fresh");
        }
        loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once(&job.key).await {
                        trace!(key = %job.key, "scheduled refresh failed: {}", e);
                    }
                }
            }
        }
        debug!(key = %job.key, "collection loop stopped");
    }

    fn fetched_within(
        &self,
        key: &ResourceKey,
        interval: Duration,
    ) -> bool {
        self.inner
            .cache
            .get(key)
            .and_then(|entry| entry.fetched_at)
            .is_some_and(|at| at.elapsed() < interval)
    }

    /// Random fraction of `interval`, bounded by `jitter_ratio`.
    fn initial_delay(
        &self,
        interval: Duration,
    ) -> Duration {
        let ratio = self.inner.config.jitter_ratio;
        if ratio <= 0.0 {
            return Duration::ZERO;
        }
        let factor: f64 = rand::thread_rng().gen_range(0.0..=ratio.min(1.0));
        interval.mul_f64(factor)
    }

    fn job(
        &self,
        key: &ResourceKey,
    ) -> Option<Arc<Job>> {
        self.inner.jobs.read().get(key).map(|h| h.job.clone())
    }

    pub fn keys(&self) -> Vec<ResourceKey> {
        self.inner.jobs.read().keys().cloned().collect()
    }

    pub fn job_count(&self) -> usize {
        self.inner.jobs.read().len()
    }

    pub fn is_started(&self) -> bool {
        self.inner.started.load(Ordering::SeqCst)
    }

    pub fn is_refreshing(
        &self,
        key: &ResourceKey,
    ) -> bool {
        self.inner.flights.is_in_flight(key)
    }

    pub fn cache(&self) -> &Arc<TtlCache> {
        &self.inner.cache
    }
}
