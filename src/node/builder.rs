//! Assembles a [`TelemetryCore`].
//!
//! Every component is constructed explicitly and handed to the components
//! that depend on it; there is no process-wide instance.
//!
//! ## Example
//! ```ignore
//! let core = CoreBuilder::new(settings).build()?;
//! core.register_probe("ups.status".into(), Arc::new(ups_probe), None, None)?;
//! core.start();
//! ```

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;

use super::TelemetryCore;
use crate::ChangeDetector;
use crate::Collector;
use crate::EventHub;
use crate::Result;
use crate::Settings;
use crate::SubscriberRegistry;
use crate::TtlCache;

pub struct CoreBuilder {
    settings: Settings,
    shutdown: Option<CancellationToken>,
}

impl CoreBuilder {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            shutdown: None,
        }
    }

    /// Loads settings from defaults, `TELEHUB_CONFIG` and the environment.
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(Settings::new()?))
    }

    /// Ties the core's lifetime to an external token. Cancelling it has the
    /// same effect as the first half of [`TelemetryCore::shutdown`].
    pub fn shutdown_token(
        mut self,
        token: CancellationToken,
    ) -> Self {
        self.shutdown = Some(token);
        self
    }

    /// Validates the settings and wires all components.
    pub fn build(self) -> Result<TelemetryCore> {
        let settings = self.settings.validate()?;
        debug!(?settings, "building telemetry core");

        let shutdown = self.shutdown.unwrap_or_default();
        let tracker = TaskTracker::new();

        let cache = Arc::new(TtlCache::new(settings.cache.clone(), tracker.clone()));
        let hub = EventHub::new(settings.hub.clone());
        let detector = ChangeDetector::new(
            hub.clone(),
            settings.detector.clone(),
            tracker.clone(),
            shutdown.clone(),
        );
        let collector = Collector::new(
            cache.clone(),
            detector.clone(),
            settings.collector.clone(),
            tracker.clone(),
            shutdown.clone(),
        );
        let registry = SubscriberRegistry::new(hub.clone(), tracker.clone());

        Ok(TelemetryCore {
            settings: Arc::new(settings),
            cache,
            collector,
            detector,
            hub,
            registry,
            tracker,
            shutdown,
        })
    }
}
