//! Bounded pool for running event handlers off the read path.
//!
//! Handlers are spawned as tracked tokio tasks and gated by a semaphore so
//! at most `size` of them run at once. A panicking handler is caught and
//! logged. Shutdown waits for running handlers up to a grace period, then
//! cancels whatever is left.

use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, warn};

/// Default time running handlers get to finish during teardown.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Twice the number of available CPUs.
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2)
        * 2
}

pub struct WorkerPool {
    tracker: TaskTracker,
    permits: Arc<Semaphore>,
    cancel: CancellationToken,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            tracker: TaskTracker::new(),
            permits: Arc::new(Semaphore::new(size)),
            cancel: CancellationToken::new(),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of spawned tasks that have not finished yet.
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_shut_down(&self) -> bool {
        self.tracker.is_closed()
    }

    /// Run `task` on the pool. Tasks submitted after shutdown are dropped.
    pub fn spawn<F>(&self, label: &str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.tracker.is_closed() {
            warn!("Worker pool shut down, dropping task for {}", label);
            return;
        }

        let permits = Arc::clone(&self.permits);
        let cancel = self.cancel.clone();
        let label = label.to_string();
        self.tracker.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Cancelled handler for {}", label);
                }
                result = AssertUnwindSafe(task).catch_unwind() => {
                    if let Err(panic) = result {
                        error!("Handler for {} panicked: {}", label, panic_message(&panic));
                    }
                }
            }
        });
    }

    /// Stop accepting work and wait up to `grace` for running tasks.
    ///
    /// Returns `false` if tasks had to be cancelled.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.tracker.close();
        if tokio::time::timeout(grace, self.tracker.wait()).await.is_ok() {
            return true;
        }
        warn!(
            "{} handler task(s) still running after {} ms, cancelling",
            self.tracker.len(),
            grace.as_millis()
        );
        self.cancel.cancel();
        self.permits.close();
        self.tracker.wait().await;
        false
    }
}

fn panic_message(panic: &Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_runs_tasks() {
        let pool = WorkerPool::new(2);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            let counter = counter.clone();
            pool.spawn("count", async move {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert!(pool.shutdown(Duration::from_secs(1)).await);
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn test_panic_does_not_affect_other_tasks() {
        let pool = WorkerPool::new(2);
        let counter = Arc::new(AtomicUsize::new(0));
        pool.spawn("panics", async { panic!("handler failure") });
        let c = counter.clone();
        pool.spawn("ok", async move {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert!(pool.shutdown(Duration::from_secs(1)).await);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let pool = WorkerPool::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        for _ in 0..8 {
            let running = running.clone();
            let peak = peak.clone();
            pool.spawn("bounded", async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            });
        }
        assert!(pool.shutdown(Duration::from_secs(2)).await);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_after_grace() {
        let pool = WorkerPool::new(1);
        pool.spawn("stuck", async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        let finished_cleanly = pool.shutdown(Duration::from_millis(20)).await;
        assert!(!finished_cleanly);
        assert_eq!(pool.pending(), 0);
    }

    #[tokio::test]
    async fn test_spawn_after_shutdown_is_dropped() {
        let pool = WorkerPool::new(1);
        pool.shutdown(Duration::from_millis(10)).await;
        assert!(pool.is_shut_down());
        pool.spawn("late", async {});
        assert_eq!(pool.pending(), 0);
    }

    #[test]
    fn test_default_worker_count() {
        assert!(default_worker_count() >= 2);
    }
}
