//! Admission control for concurrent lookups
//!
//! A counting semaphore caps the number of running tasks. Submitting blocks the
//! caller until a permit is free; the permit travels into the spawned task and is
//! released when the task finishes.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Bounds the number of concurrently executing tasks
pub struct AdmissionController {
    semaphore: Arc<Semaphore>,
    limit: usize,
    tasks: JoinSet<()>,
}

impl AdmissionController {
    /// Creates a controller admitting at most `limit` tasks at once (minimum 1)
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
            tasks: JoinSet::new(),
        }
    }

    /// Schedules `task`, waiting first until fewer than `limit` tasks are running
    pub async fn submit<F>(&mut self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        // The semaphore is owned here and never closed
        let Ok(permit) = self.semaphore.clone().acquire_owned().await else {
            tracing::error!("Admission semaphore closed, dropping task");
            return;
        };

        self.tasks.spawn(async move {
            let _permit = permit;
            task.await;
        });

        // Reap finished tasks so the set does not grow with the input
        while let Some(result) = self.tasks.try_join_next() {
            log_join_failure(result);
        }
    }

    /// Waits until every submitted task has completed
    ///
    /// A task that panics is logged and does not stop the others.
    pub async fn await_all(&mut self) {
        while let Some(result) = self.tasks.join_next().await {
            log_join_failure(result);
        }
    }

    /// Number of tasks currently holding a permit
    pub fn in_flight(&self) -> usize {
        self.limit - self.semaphore.available_permits()
    }

    /// Maximum number of concurrent tasks
    pub fn limit(&self) -> usize {
        self.limit
    }
}

fn log_join_failure(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        tracing::error!("Lookup task failed: {}", e);
    }
}
