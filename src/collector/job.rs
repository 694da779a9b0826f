use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::Probe;
use crate::ProbeCall;
use crate::ResourceKey;

/// A recurring probe registration.
#[derive(Clone)]
pub struct Job {
    pub key: ResourceKey,
    pub probe: Arc<dyn Probe>,
    pub interval: Duration,
    pub timeout: Duration,
}

impl Job {
    pub(crate) fn call(&self) -> ProbeCall {
        ProbeCall {
            key: self.key.clone(),
            probe: self.probe.clone(),
            timeout: self.timeout,
        }
    }
}

impl std::fmt::Debug for Job {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("key", &self.key)
            .field("interval", &self.interval)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Registered job plus the token that stops its collection loop.
pub(crate) struct JobHandle {
    pub(crate) job: Arc<Job>,
    pub(crate) stop: CancellationToken,
}
