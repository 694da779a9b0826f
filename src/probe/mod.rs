//! Probe contract.
//!
//! A probe queries one external subsystem and returns a [`Snapshot`] within
//! the deadline it is given. Concrete probes live outside the core; the daemon
//! wires generic [`CommandProbe`]s and embedders implement [`Probe`] directly
//! or wrap a closure with [`probe_fn`].
//!
//! Probes are never called directly. [`ProbeExecutor`] owns deadlines,
//! cancellation and fan-out for every invocation.

mod command;
mod executor;

pub use command::*;
pub use executor::*;

#[cfg(test)]
mod executor_test;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio_util::sync::CancellationToken;

use crate::ProbeError;
use crate::ResourceKey;
use crate::Snapshot;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Probe: Send + Sync + 'static {
    /// Fetches a snapshot for `key`.
    ///
    /// Implementations must return promptly once `cancel` fires; any work
    /// they spawned must observe the same token.
    async fn fetch(
        &self,
        key: &ResourceKey,
        cancel: CancellationToken,
    ) -> std::result::Result<Snapshot, ProbeError>;
}

/// Output of one probe invocation. Folded into the cache entry and dropped.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub key: ResourceKey,
    pub outcome: std::result::Result<Snapshot, ProbeError>,
    pub duration: Duration,
}

/// Closure-backed probe.
pub struct FnProbe<F> {
    f: F,
}

/// Wraps `f` as a [`Probe`].
///
/// ```ignore
/// let probe = probe_fn(|key, _cancel| async move {
///     Ok(Snapshot::Raw(serde_json::json!({ "key": key.to_string() })))
/// });
/// ```
pub fn probe_fn<F, Fut>(f: F) -> FnProbe<F>
where
    F: Fn(ResourceKey, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<Snapshot, ProbeError>> + Send + 'static,
{
    FnProbe { f }
}

#[async_trait]
impl<F, Fut> Probe for FnProbe<F>
where
    F: Fn(ResourceKey, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<Snapshot, ProbeError>> + Send + 'static,
{
    async fn fetch(
        &self,
        key: &ResourceKey,
        cancel: CancellationToken,
    ) -> std::result::Result<Snapshot, ProbeError> {
        (self.f)(key.clone(), cancel).await
    }
}
