//! Bounded task queue.
//!
//! Every network operation runs as a tokio task that first acquires a permit
//! from a shared semaphore, so no more than `capacity` operations are in
//! flight at once. Each task returns a [`TaskHandle`], a cancellable future.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::{Error, Result};

/// Semaphore-gated executor for session operations.
#[derive(Debug, Clone)]
pub struct TaskQueue {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl TaskQueue {
    /// Create a queue allowing `capacity` concurrent operations.
    ///
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Maximum number of concurrent operations.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Permits not currently held by a running operation.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Schedule `operation`.
    ///
    /// The operation does not start until a permit is free. Cancelling the
    /// handle before then means it never starts; cancelling afterwards drops
    /// it at its next await point.
    pub fn spawn<F, T>(&self, operation: F) -> TaskHandle<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let token = CancellationToken::new();
        self.spawn_with_token(operation, token)
    }

    /// Schedule `operation` under an existing cancellation token.
    pub fn spawn_with_token<F, T>(&self, operation: F, token: CancellationToken) -> TaskHandle<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let permits = self.permits.clone();
        let cancel = token.clone();

        let join = tokio::spawn(async move {
            let _permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                permit = permits.acquire_owned() => {
                    permit.map_err(|_| Error::Task("task queue closed".to_string()))?
                }
            };
            trace!("Queued operation started");

            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(Error::Cancelled),
                result = operation => result,
            }
        });

        TaskHandle { join, token }
    }
}

/// Handle to a queued operation; await it for the result.
#[derive(Debug)]
pub struct TaskHandle<T> {
    join: JoinHandle<Result<T>>,
    token: CancellationToken,
}

impl<T> TaskHandle<T> {
    /// Request cancellation.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Token shared with the running operation.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Whether the operation has finished.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.join).poll(cx).map(|joined| match joined {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(Error::Cancelled),
            Err(e) => Err(Error::Task(e.to_string())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_spawn_returns_result() {
        let queue = TaskQueue::new(2);
        let value = queue.spawn(async { Ok(41 + 1) }).await.unwrap();
        assert_eq!(value, 42);
        assert_eq!(queue.available(), 2);
    }

    #[tokio::test]
    async fn test_zero_capacity_is_raised() {
        assert_eq!(TaskQueue::new(0).capacity(), 1);
    }

    #[tokio::test]
    async fn test_cancel_before_permit_never_runs() {
        let queue = TaskQueue::new(1);
        let ran = Arc::new(AtomicUsize::new(0));

        let blocker = queue.spawn(async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        });

        let flag = ran.clone();
        let waiting = queue.spawn(async move {
            flag.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        waiting.cancel();

        assert!(matches!(waiting.await, Err(Error::Cancelled)));
        blocker.await.unwrap();
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancel_running_operation() {
        let queue = TaskQueue::new(1);
        let handle = queue.spawn(async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.cancel();
        assert!(handle.await.unwrap_err().is_cancelled());
        assert_eq!(queue.available(), 1);
    }

    #[tokio::test]
    async fn test_panic_surfaces_as_task_error() {
        let queue = TaskQueue::new(1);
        let handle = queue.spawn(async {
            if true {
                panic!("boom");
            }
            Ok(())
        });
        assert!(matches!(handle.await, Err(Error::Task(_))));
    }
}
