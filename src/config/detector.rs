use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use tracing::warn;

use crate::Result;

/// Change detector configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DetectorConfig {
    /// Coalescing window. Qualifying changes to one key inside the window
    /// collapse into a single event carrying the latest payload. 0 emits
    /// every change immediately.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Emit an event for the first successful observation of a key
    #[serde(default)]
    pub emit_initial: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            emit_initial: false,
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.debounce_ms > 60_000 {
            warn!(
                "detector.debounce_ms ({}) exceeds one minute; subscribers will see changes late",
                self.debounce_ms
            );
        }
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

fn default_debounce_ms() -> u64 {
    1_000
}
