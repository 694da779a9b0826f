//! Configuration management for the telemetry core.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Configuration file named by `TELEHUB_CONFIG`
//! - Environment variable overrides (`TELEHUB__SECTION__FIELD`)
//! - Component-wise validation
mod cache;
mod collector;
mod detector;
mod hub;
mod monitoring;
mod probes;
pub use cache::*;
pub use collector::*;
pub use detector::*;
pub use hub::*;
pub use monitoring::*;
pub use probes::*;


use std::env;
use std::fmt::Debug;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::CONFIG_PATH_ENV;
use crate::constants::ENV_PREFIX;
use crate::Result;

/// Main configuration container for the telemetry core
///
/// Combines all subsystem configurations with hierarchical override support:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `TELEHUB_CONFIG`
/// 3. Environment variables (highest priority)
#[derive(Serialize, Deserialize, Clone, Default)]
pub struct Settings {
    /// TTL windows and sharding of the value cache
    #[serde(default)]
    pub cache: CacheConfig,
    /// Probe scheduling defaults
    #[serde(default)]
    pub collector: CollectorConfig,
    /// Change detection and debouncing
    #[serde(default)]
    pub detector: DetectorConfig,
    /// Event hub buffering and backpressure
    #[serde(default)]
    pub hub: HubConfig,
    /// Metrics exporter
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    /// Command probes registered by the daemon at startup
    #[serde(default)]
    pub probes: Vec<ProbeConfig>,
}

impl Debug for Settings {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("cache", &self.cache)
            .field("collector", &self.collector)
            .field("detector", &self.detector)
            .field("hub", &self.hub)
            .field("probes", &self.probes.len())
            .finish()
    }
}

impl Settings {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// Configuration sources are merged in the following order (later sources override earlier):
    /// 1. Type defaults (lowest priority)
    /// 2. Configuration file from `TELEHUB_CONFIG` environment variable (if set)
    /// 3. Environment variables with `TELEHUB__` prefix (highest priority)
    ///
    /// # Note
    /// Validation is deferred so further overrides can be applied with
    /// `with_override_config()`. Callers MUST call `validate()` before use.
    ///
    /// # Examples
    /// ```ignore
    /// std::env::set_var("TELEHUB_CONFIG", "config/telehub.toml");
    /// std::env::set_var("TELEHUB__HUB__SUBSCRIBER_BUFFER_SIZE", "128");
    /// let settings = Settings::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var(CONFIG_PATH_ENV) {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(env_source());

        let settings: Self = builder.build()?.try_deserialize()?;
        Ok(settings)
    }

    /// Applies additional configuration overrides from file without validation.
    ///
    /// Merging order (later sources override earlier):
    /// 1. Current configuration values
    /// 2. New configuration file
    /// 3. Latest environment variables (highest priority)
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let settings: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(env_source())
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    /// Validates configuration and returns validated instance.
    pub fn validate(self) -> Result<Self> {
        self.cache.validate()?;
        self.collector.validate()?;
        self.detector.validate()?;
        self.hub.validate()?;
        self.monitoring.validate()?;
        for probe in &self.probes {
            probe.validate()?;
        }
        Ok(self)
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .ignore_empty(true)
        .try_parsing(true)
}
