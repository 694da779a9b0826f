use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::hash::Hasher;
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::RwLock;
use tokio::time::Instant;
use tokio_util::task::TaskTracker;
use tracing::debug;
use tracing::trace;

use super::CacheEntry;
use super::CacheUpdate;
use crate::metrics::CACHE_READS;
use crate::CacheConfig;
use crate::CacheError;
use crate::ProbeError;
use crate::ProbeFailure;
use crate::ProbeResult;
use crate::ResourceKey;
use crate::Snapshot;
use crate::TtlPolicy;

type Shard = RwLock<HashMap<ResourceKey, CacheEntry>>;

/// Sharded soft/hard TTL store.
///
/// Keys hash into independent shards, each behind its own lock, so a slow
/// writer on one resource never blocks readers of unrelated ones. Locks are
/// only held for map access; probe calls and refreshes run outside them.
pub struct TtlCache {
    shards: Box<[Shard]>,
    config: CacheConfig,
    /// Background refreshes started by stale reads.
    tracker: TaskTracker,
}

impl std::fmt::Debug for TtlCache {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("shards", &self.shards.len())
            .field("entries", &self.len())
            .finish()
    }
}

impl TtlCache {
    pub fn new(
        config: CacheConfig,
        tracker: TaskTracker,
    ) -> Self {
        let shards = (0..config.shard_count.max(1))
            .map(|_| RwLock::new(HashMap::new()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            shards,
            config,
            tracker,
        }
    }

    fn shard(
        &self,
        key: &ResourceKey,
    ) -> &Shard {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % self.shards.len()]
    }

    pub fn policy_for(
        &self,
        key: &ResourceKey,
    ) -> TtlPolicy {
        self.config.policy_for(key)
    }

    /// Point read. Never blocks on a refresh; `stale` is evaluated at read time.
    pub fn get(
        &self,
        key: &ResourceKey,
    ) -> Option<CacheEntry> {
        let now = Instant::now();
        self.shard(key).read().get(key).map(|entry| entry.observed_at(now))
    }

    /// Atomically overwrites the entry for `key` and bumps its sequence.
    ///
    /// On success the payload and both deadlines are replaced and the stale
    /// flag and last error are cleared. On failure the previous payload and
    /// deadlines are kept.
    pub fn set(
        &self,
        key: &ResourceKey,
        outcome: std::result::Result<Arc<Snapshot>, ProbeFailure>,
        policy: TtlPolicy,
    ) -> CacheUpdate {
        let now = Instant::now();
        let mut shard = self.shard(key).write();
        let entry = shard
            .entry(key.clone())
            .or_insert_with(|| CacheEntry::vacant(key.clone(), now));

        let previous = entry.payload.clone();
        match outcome {
            Ok(payload) => {
                entry.payload = Some(payload);
                entry.fetched_at = Some(now);
                entry.fetched_wall = Some(SystemTime::now());
                entry.soft_expires_at = now + policy.soft_ttl();
                entry.hard_expires_at = now + policy.hard_ttl().max(policy.soft_ttl());
                entry.stale = false;
                entry.last_error = None;
            }
            Err(failure) => {
                entry.stale = true;
                entry.last_error = Some(failure);
            }
        }
        entry.sequence += 1;

        trace!(%key, sequence = entry.sequence, stale = entry.stale, "cache entry written");
        CacheUpdate {
            entry: entry.clone(),
            previous,
        }
    }

    /// Folds one probe result into the cache under the key's TTL policy.
    pub fn record(
        &self,
        result: ProbeResult,
    ) -> CacheUpdate {
        let policy = self.policy_for(&result.key);
        let outcome = match result.outcome {
            Ok(snapshot) => Ok(Arc::new(snapshot)),
            Err(e) => Err(ProbeFailure::from(&e)),
        };
        self.set(&result.key, outcome, policy)
    }

    /// Serves `key` from cache, refreshing it according to its age.
    ///
    /// - inside the soft TTL the entry is returned as is
    /// - between soft and hard expiry (or after a failed probe) the entry is
    ///   returned and `refresh` runs in the background
    /// - past hard expiry, or with no payload at all, the caller waits for
    ///   `refresh` up to `query_timeout_ms`
    ///
    /// `refresh` is expected to be coalesced per key by the caller.
    pub async fn get_or_refresh<F, Fut>(
        &self,
        key: &ResourceKey,
        refresh: F,
    ) -> std::result::Result<CacheEntry, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<(), ProbeError>> + Send + 'static,
    {
        let now = Instant::now();
        if let Some(entry) = self.get(key) {
            if entry.is_servable(now) {
                if entry.stale {
                    CACHE_READS.with_label_values(&["stale"]).inc();
                    trace!(%key, "serving stale entry, refreshing in background");
                    let fut = refresh();
                    let task_key = key.clone();
                    self.tracker.spawn(async move {
                        if let Err(e) = fut.await {
                            debug!(key = %task_key, "background refresh failed: {}", e);
                        }
                    });
                } else {
                    CACHE_READS.with_label_values(&["fresh"]).inc();
                }
                return Ok(entry);
            }
        }

        let timeout = self.config.query_timeout();
        let outcome = match tokio::time::timeout(timeout, refresh()).await {
            Ok(outcome) => outcome,
            Err(_) => {
                CACHE_READS.with_label_values(&["miss"]).inc();
                return Err(CacheError::RefreshTimeout {
                    key: key.clone(),
                    duration: timeout,
                    last_error: self.get(key).and_then(|e| e.last_error),
                });
            }
        };

        match (outcome, self.get(key)) {
            (Ok(()), Some(entry)) if entry.payload.is_some() => {
                CACHE_READS.with_label_values(&["refreshed"]).inc();
                Ok(entry)
            }
            (Ok(()), entry) => {
                CACHE_READS.with_label_values(&["miss"]).inc();
                Err(CacheError::Miss {
                    key: key.clone(),
                    last_error: entry.and_then(|e| e.last_error),
                })
            }
            (Err(e), _) => {
                CACHE_READS.with_label_values(&["miss"]).inc();
                debug!(%key, "forced refresh failed: {}", e);
                Err(CacheError::Miss {
                    key: key.clone(),
                    last_error: Some(ProbeFailure::from(&e)),
                })
            }
        }
    }

    /// Drops the entry of a resource that no longer exists.
    pub fn remove(
        &self,
        key: &ResourceKey,
    ) -> Option<CacheEntry> {
        self.shard(key).write().remove(key)
    }

    pub fn keys(&self) -> Vec<ResourceKey> {
        self.shards
            .iter()
            .flat_map(|shard| shard.read().keys().cloned().collect::<Vec<_>>())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
