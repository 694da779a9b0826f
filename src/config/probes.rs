use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::ResourceKey;
use crate::Result;

/// One externally implemented probe, run as a command whose stdout is a JSON
/// document.
///
/// ```toml
/// [[probes]]
/// key = "ups.status"
/// command = "/usr/local/bin/ups-probe"
/// args = ["--json"]
/// interval_ms = 10000
/// timeout_ms = 3000
/// ```
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProbeConfig {
    pub key: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Falls back to `collector.default_interval_ms`
    #[serde(default)]
    pub interval_ms: Option<u64>,
    /// Falls back to `collector.default_timeout_ms`
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl ProbeConfig {
    pub fn validate(&self) -> Result<()> {
        ResourceKey::parse(&self.key)?;
        if self.command.trim().is_empty() {
            return Err(Error::InvalidConfig(format!("probe {}: command cannot be empty", self.key)));
        }
        if self.interval_ms == Some(0) {
            return Err(Error::InvalidConfig(format!(
                "probe {}: interval_ms must be greater than 0",
                self.key
            )));
        }
        if self.timeout_ms == Some(0) {
            return Err(Error::InvalidConfig(format!(
                "probe {}: timeout_ms must be greater than 0",
                self.key
            )));
        }
        Ok(())
    }

    pub fn interval(&self) -> Option<Duration> {
        self.interval_ms.map(Duration::from_millis)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}
