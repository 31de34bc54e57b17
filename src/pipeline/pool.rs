//! Bounded worker pool for blocking jobs.
//!
//! [`WorkerPool::submit`] queues a job; at most `capacity` jobs hold a
//! semaphore permit and run (on Tokio's blocking thread pool) at any moment.
//! Each submission owns its own result slot, the task's `JoinHandle`, which
//! is written exactly once when the job settles. [`WorkerPool::settle_all`]
//! waits for every slot and returns outcomes in submission order. Jobs never
//! share a result collection, so no lock is needed to gather them.
//!
//! A failing or panicking job only affects its own slot.

use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::debug;

/// How one submitted job settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome<T, E> {
    Succeeded(T),
    /// The job returned an error.
    Failed(E),
    /// The job panicked or was cancelled before finishing.
    Aborted(String),
}

impl<T, E> TaskOutcome<T, E> {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Succeeded(_))
    }

    /// Keep the value, drop the failure detail.
    pub fn ok(self) -> Option<T> {
        match self {
            TaskOutcome::Succeeded(v) => Some(v),
            _ => None,
        }
    }
}

type Slot<T, E> = JoinHandle<Result<Result<T, E>, String>>;

/// Semaphore-gated launcher for blocking jobs.
///
/// Must be used from within a Tokio runtime.
pub struct WorkerPool<T, E> {
    permits: Arc<Semaphore>,
    capacity: usize,
    slots: Vec<Slot<T, E>>,
}

impl<T, E> WorkerPool<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// A pool running at most `capacity` jobs at once (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
            slots: Vec::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of jobs submitted so far.
    pub fn submitted(&self) -> usize {
        self.slots.len()
    }

    /// Queue a job. It starts as soon as a permit is free.
    pub fn submit<F>(&mut self, job: F)
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        let slot = tokio::spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|e| format!("pool closed: {e}"))?;
            tokio::task::spawn_blocking(job)
                .await
                .map_err(|e| format!("job did not finish: {e}"))
        });
        self.slots.push(slot);
    }

    /// Wait until every submitted job has settled.
    ///
    /// Outcomes are returned in submission order, not completion order.
    pub async fn settle_all(self) -> Vec<TaskOutcome<T, E>> {
        debug!(
            "Waiting for {} jobs (capacity {})",
            self.slots.len(),
            self.capacity
        );
        join_all(self.slots)
            .await
            .into_iter()
            .map(|joined| match joined {
                Ok(Ok(Ok(value))) => TaskOutcome::Succeeded(value),
                Ok(Ok(Err(e))) => TaskOutcome::Failed(e),
                Ok(Err(detail)) => TaskOutcome::Aborted(detail),
                Err(e) => TaskOutcome::Aborted(format!("task did not finish: {e}")),
            })
            .collect()
    }
}
