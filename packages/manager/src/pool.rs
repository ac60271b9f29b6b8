//! Dispatch of blocking store calls.

use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::error::{Error, Result};

/// Runs blocking closures on tokio's blocking thread pool.
///
/// Each call gets its own worker slot. When a limit is set, at most that
/// many calls are in flight at once; further calls wait for a free slot
/// before they are dispatched. A dispatched call always runs to completion,
/// even if the future awaiting it is dropped.
#[derive(Debug, Clone, Default)]
pub struct WorkerPool {
    limit: Option<Arc<Semaphore>>,
}

impl WorkerPool {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn bounded(max_workers: usize) -> Self {
        Self {
            limit: Some(Arc::new(Semaphore::new(max_workers))),
        }
    }

    pub fn from_limit(max_workers: Option<usize>) -> Self {
        match max_workers {
            Some(max_workers) => Self::bounded(max_workers),
            None => Self::unbounded(),
        }
    }

    /// Run `task` on a worker thread and wait for its result.
    pub async fn run<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce() -> riakpersist_client::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = match &self.limit {
            Some(semaphore) => Some(semaphore.clone().acquire_owned().await.map_err(|e| {
                Error::Worker {
                    message: e.to_string(),
                }
            })?),
            None => None,
        };

        let result = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            task()
        })
        .await
        .map_err(|e| Error::Worker {
            message: e.to_string(),
        })?;

        Ok(result?)
    }
}
