use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use super::Probe;
use super::ProbeResult;
use crate::metrics::PROBE_DURATION_METRIC;
use crate::metrics::PROBE_FAILURES;
use crate::ProbeError;
use crate::ResourceKey;

/// One bounded invocation request.
#[derive(Clone)]
pub struct ProbeCall {
    pub key: ResourceKey,
    pub probe: Arc<dyn Probe>,
    pub timeout: Duration,
}

impl std::fmt::Debug for ProbeCall {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ProbeCall")
            .field("key", &self.key)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Runs probes under a deadline and a cancellation scope.
///
/// Every invocation gets a child of the executor's token. The child is
/// cancelled when the deadline passes, when the executor shuts down, and
/// after the probe returns, so nothing a probe spawned outlives its call.
#[derive(Debug, Clone)]
pub struct ProbeExecutor {
    shutdown: CancellationToken,
}

impl ProbeExecutor {
    pub fn new(shutdown: CancellationToken) -> Self {
        Self { shutdown }
    }

    pub async fn execute(
        &self,
        call: ProbeCall,
    ) -> ProbeResult {
        let ProbeCall { key, probe, timeout } = call;
        let token = self.shutdown.child_token();
        let started = Instant::now();

        let outcome = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(ProbeError::Cancelled { key: key.clone() }),
            r = tokio::time::timeout(timeout, probe.fetch(&key, token.clone())) => match r {
                Ok(outcome) => outcome,
                Err(_) => Err(ProbeError::Timeout {
                    key: key.clone(),
                    duration: timeout,
                }),
            },
        };
        token.cancel();

        let duration = started.elapsed();
        PROBE_DURATION_METRIC
            .with_label_values(&[key.namespace()])
            .observe(duration.as_secs_f64() * 1000.0);

        match &outcome {
            Ok(_) => debug!(%key, ?duration, "probe completed"),
            Err(e) => {
                PROBE_FAILURES
                    .with_label_values(&[key.namespace(), e.kind().as_str()])
                    .inc();
                warn!(%key, ?duration, "probe failed: {}", e);
            }
        }

        ProbeResult { key, outcome, duration }
    }
}
