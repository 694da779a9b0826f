use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use tracing::warn;

use crate::Error;
use crate::ResourceKey;
use crate::Result;

/// Soft/hard expiry windows for one resource kind.
///
/// Inside `soft_ttl_ms` an entry is fresh. Between soft and hard it is served
/// as stale while a background refresh runs. Past `hard_ttl_ms` a reader
/// blocks on a forced refresh.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    pub soft_ttl_ms: u64,
    pub hard_ttl_ms: u64,
}

impl TtlPolicy {
    pub fn new(
        soft: Duration,
        hard: Duration,
    ) -> Self {
        Self {
            soft_ttl_ms: soft.as_millis() as u64,
            hard_ttl_ms: hard.as_millis() as u64,
        }
    }

    pub fn soft_ttl(&self) -> Duration {
        Duration::from_millis(self.soft_ttl_ms)
    }

    pub fn hard_ttl(&self) -> Duration {
        Duration::from_millis(self.hard_ttl_ms)
    }

    pub fn validate(
        &self,
        name: &str,
    ) -> Result<()> {
        if self.soft_ttl_ms == 0 {
            return Err(Error::InvalidConfig(format!(
                "{name}: soft_ttl_ms must be greater than 0"
            )));
        }
        if self.soft_ttl_ms > self.hard_ttl_ms {
            return Err(Error::InvalidConfig(format!(
                "{name}: soft_ttl_ms ({}) must not exceed hard_ttl_ms ({})",
                self.soft_ttl_ms, self.hard_ttl_ms
            )));
        }
        Ok(())
    }
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            soft_ttl_ms: default_soft_ttl_ms(),
            hard_ttl_ms: default_hard_ttl_ms(),
        }
    }
}

/// Value cache configuration
///
/// # Example
/// ```toml
/// [cache]
/// shard_count = 16
///
/// [cache.default_ttl]
/// soft_ttl_ms = 30000
/// hard_ttl_ms = 120000
///
/// # sensors are slow to read and change slowly
/// [cache.kind_ttl.sensors]
/// soft_ttl_ms = 300000
/// hard_ttl_ms = 900000
/// ```
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CacheConfig {
    /// Number of independently locked shards
    #[serde(default = "default_shard_count")]
    pub shard_count: usize,

    /// Policy for namespaces without an explicit entry
    #[serde(default)]
    pub default_ttl: TtlPolicy,

    /// Per-namespace overrides, keyed by the first key segment (`docker`, `ups`, ...)
    #[serde(default)]
    pub kind_ttl: HashMap<String, TtlPolicy>,

    /// Upper bound a reader waits on a forced refresh past hard expiry
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            shard_count: default_shard_count(),
            default_ttl: TtlPolicy::default(),
            kind_ttl: HashMap::new(),
            query_timeout_ms: default_query_timeout_ms(),
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<()> {
        if self.shard_count == 0 {
            return Err(Error::InvalidConfig("cache.shard_count must be greater than 0".into()));
        }
        if !self.shard_count.is_power_of_two() {
            warn!(
                "cache.shard_count ({}) is not a power of two; keys may spread unevenly",
                self.shard_count
            );
        }
        if self.query_timeout_ms == 0 {
            return Err(Error::InvalidConfig("cache.query_timeout_ms must be greater than 0".into()));
        }

        self.default_ttl.validate("cache.default_ttl")?;
        for (kind, policy) in &self.kind_ttl {
            policy.validate(&format!("cache.kind_ttl.{kind}"))?;
        }
        Ok(())
    }

    /// Resolves the TTL policy from the key's namespace.
    pub fn policy_for(
        &self,
        key: &ResourceKey,
    ) -> TtlPolicy {
        self.kind_ttl.get(key.namespace()).copied().unwrap_or(self.default_ttl)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

fn default_shard_count() -> usize {
    16
}
fn default_soft_ttl_ms() -> u64 {
    30_000
}
fn default_hard_ttl_ms() -> u64 {
    120_000
}
fn default_query_timeout_ms() -> u64 {
    10_000
}
