use std::future::Future;
use std::time::Duration;

use tokio_util::task::TaskTracker;
use tracing::error;
use tracing::warn;

use crate::Result;

/// Spawns a named background task on `tracker`, logging its error instead of
/// dropping it silently.
pub(crate) fn spawn_task<F, Fut>(
    tracker: &TaskTracker,
    name: &str,
    task_fn: F,
) -> tokio::task::JoinHandle<()>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    // Clone the name so it can be safely moved into the async block
    let name = name.to_string();
    tracker.spawn(async move {
        if let Err(e) = task_fn().await {
            error!("spawned task: {name} stopped or encountered an error: {:?}", e);
        }
    })
}

/// Closes `tracker` and waits for its tasks, giving up after `grace`.
///
/// Returns `false` when tasks were still running at the deadline.
pub(crate) async fn wait_tracked(
    tracker: &TaskTracker,
    grace: Duration,
) -> bool {
    tracker.close();
    match tokio::time::timeout(grace, tracker.wait()).await {
        Ok(()) => true,
        Err(_) => {
            warn!(
                remaining = tracker.len(),
                "background tasks still running after {:?} grace period", grace
            );
            false
        }
    }
}
