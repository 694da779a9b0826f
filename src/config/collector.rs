use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Probe scheduling defaults, used when a registration does not carry its own
/// interval or timeout.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CollectorConfig {
    /// Period between two scheduled refreshes of one key
    #[serde(default = "default_interval_ms")]
    pub default_interval_ms: u64,

    /// Deadline of a single probe invocation
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,

    /// First tick of every job is delayed by a random fraction of its
    /// interval (0.0 disables) so probes registered together do not fire in
    /// lockstep.
    #[serde(default = "default_jitter_ratio")]
    pub jitter_ratio: f64,

    /// How long shutdown waits for in-flight tasks after cancelling them
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            default_interval_ms: default_interval_ms(),
            default_timeout_ms: default_timeout_ms(),
            jitter_ratio: default_jitter_ratio(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

impl CollectorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.default_interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "collector.default_interval_ms must be greater than 0".into(),
            ));
        }
        if self.default_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "collector.default_timeout_ms must be greater than 0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter_ratio) {
            return Err(Error::InvalidConfig(format!(
                "collector.jitter_ratio ({}) must be within [0.0, 1.0]",
                self.jitter_ratio
            )));
        }
        Ok(())
    }

    pub fn default_interval(&self) -> Duration {
        Duration::from_millis(self.default_interval_ms)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

fn default_interval_ms() -> u64 {
    5_000
}
fn default_timeout_ms() -> u64 {
    2_000
}
fn default_jitter_ratio() -> f64 {
    0.1
}
fn default_shutdown_grace_ms() -> u64 {
    3_000
}
