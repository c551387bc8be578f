//! Token-based admission control for concurrency-mode tests.
//!
//! The dispatcher acquires a token before launching each request and the
//! request's completion path releases it, keeping exactly `signal(n)`
//! requests in flight at any instant.

use std::sync::Arc;

use tokio::sync::Semaphore;

/// A counting semaphore with explicit `signal`/`acquire`/`release`.
///
/// Cheap to clone; clones share the same token pool.
#[derive(Clone, Debug)]
pub struct WorkerSemaphore {
    semaphore: Arc<Semaphore>,
}

impl WorkerSemaphore {
    /// Creates a semaphore with no tokens. Callers add capacity with
    /// [`WorkerSemaphore::signal`].
    pub fn new() -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(0)),
        }
    }

    /// Adds `n` tokens to the pool, waking blocked acquirers.
    pub fn signal(&self, n: usize) {
        self.semaphore.add_permits(n);
    }

    /// Blocks until a token is available, then takes it.
    pub async fn acquire(&self) {
        // The semaphore is never closed, so acquisition cannot fail.
        match self.semaphore.acquire().await {
            Ok(permit) => permit.forget(),
            Err(_) => unreachable!("worker semaphore is never closed"),
        }
    }

    /// Returns a token to the pool.
    pub fn release(&self) {
        self.semaphore.add_permits(1);
    }

    /// Number of tokens currently available.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

impl Default for WorkerSemaphore {
    fn default() -> Self {
        Self::new()
    }
}
