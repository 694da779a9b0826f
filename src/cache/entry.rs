use std::sync::Arc;
use std::time::SystemTime;

use tokio::time::Instant;

use crate::utils::time::epoch_millis;
use crate::Envelope;
use crate::ProbeFailure;
use crate::ResourceKey;
use crate::Snapshot;
use crate::Topic;

/// Last-known state of one resource.
///
/// `soft_expires_at <= hard_expires_at` always holds. A failed write keeps the
/// previous payload and the expiry deadlines of the last success; it only
/// flags the entry stale and records the error.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: ResourceKey,
    /// `None` until the first successful probe.
    pub payload: Option<Arc<Snapshot>>,
    pub fetched_at: Option<Instant>,
    /// Wall-clock twin of `fetched_at`, for display only.
    pub fetched_wall: Option<SystemTime>,
    pub soft_expires_at: Instant,
    pub hard_expires_at: Instant,
    pub stale: bool,
    pub last_error: Option<ProbeFailure>,
    /// Bumped on every write, successful or not.
    pub sequence: u64,
}

impl CacheEntry {
    /// Placeholder for a key that has never been fetched successfully.
    pub(crate) fn vacant(
        key: ResourceKey,
        now: Instant,
    ) -> Self {
        Self {
            key,
            payload: None,
            fetched_at: None,
            fetched_wall: None,
            soft_expires_at: now,
            hard_expires_at: now,
            stale: true,
            last_error: None,
            sequence: 0,
        }
    }

    pub fn is_stale(
        &self,
        now: Instant,
    ) -> bool {
        self.stale || now > self.soft_expires_at
    }

    pub fn is_hard_expired(
        &self,
        now: Instant,
    ) -> bool {
        now > self.hard_expires_at
    }

    /// An entry that can be handed to a reader without a forced refresh.
    pub fn is_servable(
        &self,
        now: Instant,
    ) -> bool {
        self.payload.is_some() && !self.is_hard_expired(now)
    }

    /// Copy with `stale` evaluated against `now`.
    pub(crate) fn observed_at(
        &self,
        now: Instant,
    ) -> Self {
        let mut entry = self.clone();
        entry.stale = self.is_stale(now);
        entry
    }

    pub fn last_updated_ms(&self) -> Option<u64> {
        self.fetched_wall.map(epoch_millis)
    }

    pub fn to_envelope(&self) -> Envelope {
        Envelope {
            key: self.key.clone(),
            topic: None,
            kind: self.payload.as_ref().map(|p| p.kind()),
            data: self.payload.clone(),
            sequence: self.sequence,
            stale: self.stale,
            last_updated_ms: self.last_updated_ms(),
            last_error: self.last_error.clone(),
        }
    }

    pub fn topic(&self) -> Topic {
        Topic::for_key(&self.key)
    }
}

/// Result of one cache write.
#[derive(Debug, Clone)]
pub struct CacheUpdate {
    pub entry: CacheEntry,
    /// Payload held before the write.
    pub previous: Option<Arc<Snapshot>>,
}

impl CacheUpdate {
    pub fn succeeded(&self) -> bool {
        self.entry.last_error.is_none() && self.entry.payload.is_some()
    }
}
