use std::sync::Arc;

use dashmap::DashMap;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;
use tracing::trace;

use crate::metrics::EVENTS_COALESCED;
use crate::DetectorConfig;
use crate::EventHub;
use crate::ResourceKey;
use crate::Snapshot;
use crate::Topic;

/// What [`ChangeDetector::observe`] did with a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// Same fingerprint as the previous value
    Unchanged,
    /// First value of the key, recorded without an event
    Baseline,
    /// Opened a debounce window
    Scheduled,
    /// Replaced the candidate of an open window
    Coalesced,
    /// Published right away (no debounce window); carries the sequence
    Emitted(u64),
    /// Change reverted to what was last emitted
    Suppressed,
}

#[derive(Debug, Default)]
struct KeyState {
    /// Fingerprint of the last published (or baseline) payload
    last_emitted: Option<u64>,
    /// Latest candidate inside the open window
    pending: Option<Arc<Snapshot>>,
}

struct DetectorInner {
    hub: EventHub,
    config: DetectorConfig,
    states: DashMap<ResourceKey, KeyState>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

/// Turns successive snapshots of a key into debounced change events.
///
/// A change opens a window of `debounce_ms`. Further changes inside the window
/// replace the candidate; when the window closes only the latest payload is
/// published, and only if it differs from what subscribers last saw.
#[derive(Clone)]
pub struct ChangeDetector {
    inner: Arc<DetectorInner>,
}

impl std::fmt::Debug for ChangeDetector {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ChangeDetector")
            .field("config", &self.inner.config)
            .field("keys", &self.inner.states.len())
            .finish()
    }
}

impl ChangeDetector {
    pub fn new(
        hub: EventHub,
        config: DetectorConfig,
        tracker: TaskTracker,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(DetectorInner {
                hub,
                config,
                states: DashMap::new(),
                tracker,
                shutdown,
            }),
        }
    }

    /// Feeds a successfully collected snapshot. `previous` is the payload the
    /// cache held before this write.
    pub fn observe(
        &self,
        key: &ResourceKey,
        current: Arc<Snapshot>,
        previous: Option<&Snapshot>,
    ) -> Observation {
        let fingerprint = current.fingerprint();
        match previous {
            None if !self.inner.config.emit_initial => {
                self.inner.states.entry(key.clone()).or_default().last_emitted = Some(fingerprint);
                trace!(%key, "baseline recorded");
                return Observation::Baseline;
            }
            Some(previous) if previous.fingerprint() == fingerprint => {
                return Observation::Unchanged;
            }
            _ => {}
        }

        if self.inner.config.debounce_ms == 0 {
            self.inner.states.entry(key.clone()).or_default().pending = Some(current);
            return match self.flush(key) {
                Some(sequence) => Observation::Emitted(sequence),
                None => Observation::Suppressed,
            };
        }

        {
            let mut state = self.inner.states.entry(key.clone()).or_default();
            if state.pending.replace(current).is_some() {
                EVENTS_COALESCED.with_label_values(&[key.namespace()]).inc();
                trace!(%key, "change coalesced into open window");
                return Observation::Coalesced;
            }
        }

        let deadline = Instant::now() + self.inner.config.debounce();
        let this = self.clone();
        let key = key.clone();
        self.inner.tracker.spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {}
                // Flush early so draining subscribers see the final state
                _ = this.inner.shutdown.cancelled() => {}
            }
            this.flush(&key);
        });
        Observation::Scheduled
    }

    /// Publishes the pending candidate of `key`, if it differs from the last
    /// emitted payload. Returns the event's sequence number.
    fn flush(
        &self,
        key: &ResourceKey,
    ) -> Option<u64> {
        let payload = {
            let mut state = self.inner.states.get_mut(key)?;
            let payload = state.pending.take()?;
            let fingerprint = payload.fingerprint();
            if state.last_emitted == Some(fingerprint) {
                trace!(%key, "change reverted inside window, nothing to emit");
                return None;
            }
            state.last_emitted = Some(fingerprint);
            payload
        };

        let topic = Topic::for_key(key);
        let sequence = self.inner.hub.publish(&topic, key.clone(), payload);
        debug!(%key, %topic, sequence, "change event published");
        Some(sequence)
    }

    /// Closes every open window now. Returns how many events were published.
    pub fn flush_all(&self) -> usize {
        let keys: Vec<ResourceKey> = self
            .inner
            .states
            .iter()
            .filter(|state| state.pending.is_some())
            .map(|state| state.key().clone())
            .collect();
        keys.iter().filter_map(|key| self.flush(key)).count()
    }

    /// Drops all state of a key that is no longer monitored.
    pub fn forget(
        &self,
        key: &ResourceKey,
    ) {
        self.inner.states.remove(key);
    }

    /// Keys with an open debounce window.
    pub fn pending_count(&self) -> usize {
        self.inner
            .states
            .iter()
            .filter(|state| state.pending.is_some())
            .count()
    }
}
