use std::ops::Deref;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{ReportError, Result};

/// Bounded pool for blocking work (file and SDK I/O).
///
/// Jobs run on tokio's blocking threads; the semaphore caps how many run at
/// once. Cloning shares the same bound and cancellation.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    cancel: CancellationToken,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            cancel: CancellationToken::new(),
            size,
        }
    }

    /// One slot per physical core.
    pub fn with_physical_cpus() -> Self {
        Self::new(num_cpus::get_physical())
    }

    pub fn from_config(workers: Option<usize>) -> Self {
        match workers {
            Some(size) => Self::new(size),
            None => Self::with_physical_cpus(),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Run `job` on a blocking thread once a slot frees up. Queued jobs fail
    /// with `Cancelled` when the pool shuts down before they start.
    pub async fn run<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            permit = self.permits.clone().acquire_owned() => permit.ok(),
        };
        let permit =
            permit.ok_or_else(|| ReportError::Cancelled("worker pool is shut down".into()))?;

        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job()
        });

        handle
            .await
            .map_err(|e| ReportError::Worker(e.to_string()))?
    }

    pub fn shutdown(&self) {
        if !self.cancel.is_cancelled() {
            debug!(size = self.size, "worker pool shutting down");
        }
        self.cancel.cancel();
        self.permits.close();
    }

    pub fn is_shutdown(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Guard that shuts the pool down when dropped, on every exit path.
    pub fn scope(&self) -> PoolScope {
        PoolScope { pool: self.clone() }
    }
}

pub struct PoolScope {
    pool: WorkerPool,
}

impl Deref for PoolScope {
    type Target = WorkerPool;

    fn deref(&self) -> &WorkerPool {
        &self.pool
    }
}

impl Drop for PoolScope {
    fn drop(&mut self) {
        self.pool.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_run_returns_job_output() {
        let pool = WorkerPool::new(2);
        let value = pool.run(|| Ok(21 * 2)).await.unwrap();
        assert_eq!(value, 42);

        let err = pool
            .run(|| -> Result<()> { Err(ReportError::InvalidInput("bad".into())) })
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_pool_bounds_concurrency() {
        let pool = WorkerPool::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut jobs = Vec::new();
        for _ in 0..8 {
            let pool = pool.clone();
            let running = running.clone();
            let peak = peak.clone();
            jobs.push(tokio::spawn(async move {
                pool.run(move || {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(20));
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
                .await
            }));
        }
        for job in jobs {
            job.await.unwrap().unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_jobs() {
        let pool = WorkerPool::new(1);
        pool.shutdown();
        assert!(pool.is_shutdown());
        let err = pool.run(|| Ok(())).await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_scope_shuts_down_on_drop() {
        let pool = WorkerPool::new(1);
        {
            let scope = pool.scope();
            scope.run(|| Ok(())).await.unwrap();
        }
        assert!(pool.is_shutdown());
    }

    #[test]
    fn test_zero_size_is_clamped() {
        assert_eq!(WorkerPool::new(0).size(), 1);
        assert!(WorkerPool::from_config(None).size() >= 1);
    }
}
