//! Per-key request coalescing.
//!
//! At most one computation per key is in flight. Later callers for the same
//! key attach to the running computation and observe its result. The
//! computation runs on its own task, so a caller that stops waiting (a
//! fire-and-forget refresh, a client that disconnects) never cancels it for
//! the others.

use std::future::Future;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::future::Shared;
use futures::FutureExt;
use tokio_util::task::TaskTracker;
use tracing::trace;
use tracing::warn;

use crate::metrics::SINGLEFLIGHT_JOINS;

/// Resolves to `None` only if the underlying task panicked or was aborted.
pub type FlightResult<V> = Shared<BoxFuture<'static, Option<V>>>;

struct Flight<V> {
    id: u64,
    result: FlightResult<V>,
}

pub struct SingleFlight<K, V> {
    inflight: Arc<DashMap<K, Flight<V>>>,
    next_id: AtomicU64,
    tracker: TaskTracker,
}

impl<K, V> std::fmt::Debug for SingleFlight<K, V>
where
    K: Eq + Hash,
{
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("SingleFlight")
            .field("inflight", &self.inflight.len())
            .finish_non_exhaustive()
    }
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(tracker: TaskTracker) -> Self {
        Self {
            inflight: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
            tracker,
        }
    }

    /// Returns the in-flight result for `key`, starting `make()` only when
    /// nothing is running for it yet. The boolean is `true` when the caller
    /// attached to an existing flight.
    pub fn run<F, Fut>(
        &self,
        key: K,
        make: F,
    ) -> (FlightResult<V>, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V> + Send + 'static,
    {
        match self.inflight.entry(key.clone()) {
            Entry::Occupied(flight) => {
                SINGLEFLIGHT_JOINS.inc();
                trace!(?key, flight_id = flight.get().id, "joined in-flight request");
                (flight.get().result.clone(), true)
            }
            Entry::Vacant(slot) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let inflight = Arc::clone(&self.inflight);
                let fut = make();
                let task_key = key.clone();

                // The shard lock is held until `slot.insert` below, so the
                // removal cannot run before the flight is visible.
                let handle = self.tracker.spawn(async move {
                    let value = AssertUnwindSafe(fut).catch_unwind().await;
                    inflight.remove_if(&task_key, |_, flight| flight.id == id);
                    if value.is_err() {
                        warn!(key = ?task_key, "single-flight task panicked");
                    }
                    value.ok()
                });

                let result = async move { handle.await.ok().flatten() }
                .boxed()
                .shared();

                slot.insert(Flight {
                    id,
                    result: result.clone(),
                });
                (result, false)
            }
        }
    }

    pub fn is_in_flight(
        &self,
        key: &K,
    ) -> bool {
        self.inflight.contains_key(key)
    }

    pub fn in_flight_count(&self) -> usize {
        self.inflight.len()
    }
}
