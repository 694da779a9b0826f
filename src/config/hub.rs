use serde::Deserialize;
use serde::Serialize;
use tracing::warn;

use crate::Error;
use crate::Result;

/// What the hub does when a subscriber's buffer is full.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the oldest buffered event and enqueue the new one. Keeps the
    /// most recent state at the cost of older missed events.
    #[default]
    DropOldest,
    /// Close the subscription. The consumer must reconnect and re-read.
    Disconnect,
}

impl OverflowPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverflowPolicy::DropOldest => "drop_oldest",
            OverflowPolicy::Disconnect => "disconnect",
        }
    }
}

/// Event hub configuration
///
/// # Example
/// ```toml
/// [hub]
/// subscriber_buffer_size = 64
/// overflow_policy = "disconnect"
/// ```
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HubConfig {
    /// Per-subscriber delivery buffer capacity
    ///
    /// **Default**: 256
    #[serde(default = "default_subscriber_buffer_size")]
    pub subscriber_buffer_size: usize,

    /// Backpressure policy applied when the buffer is full
    ///
    /// **Default**: drop_oldest
    #[serde(default)]
    pub overflow_policy: OverflowPolicy,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            subscriber_buffer_size: default_subscriber_buffer_size(),
            overflow_policy: OverflowPolicy::default(),
        }
    }
}

impl HubConfig {
    pub fn validate(&self) -> Result<()> {
        if self.subscriber_buffer_size == 0 {
            return Err(Error::InvalidConfig(
                "hub.subscriber_buffer_size must be greater than 0".into(),
            ));
        }

        if self.subscriber_buffer_size > 100_000 {
            warn!(
                "hub.subscriber_buffer_size ({}) is very large; every subscriber may hold that many events",
                self.subscriber_buffer_size
            );
        }

        Ok(())
    }
}

const fn default_subscriber_buffer_size() -> usize {
    256
}
