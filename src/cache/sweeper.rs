//! Background TTL sweep for a shared cache.

use super::content::ContentCache;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

/// Handle to a running sweeper task. Dropping it aborts the task.
pub struct SweeperHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Signal the task to stop and wait for it to exit.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map(|t| t.is_finished()).unwrap_or(true)
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Sweep `cache` every `interval` on the current tokio runtime.
///
/// The task holds only a weak reference and exits once the cache is dropped.
pub fn spawn_sweeper<V>(cache: &Arc<ContentCache<V>>, interval: Duration) -> SweeperHandle
where
    V: Clone + Send + 'static,
{
    let weak = Arc::downgrade(cache);
    let interval = interval.max(Duration::from_millis(1));
    let (tx, mut rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let Some(cache) = weak.upgrade() else { break };
                    let removed = cache.sweep();
                    if removed > 0 {
                        debug!(cache = %cache.config().name, removed, "background sweep");
                    }
                }
                _ = &mut rx => break,
            }
        }
    });

    SweeperHandle {
        shutdown: Some(tx),
        task: Some(task),
    }
}
