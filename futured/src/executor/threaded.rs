//! Worker-thread adapter.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{oneshot, Semaphore};
use tracing::trace;

use super::panic_message;
use crate::error::Error;
use crate::handle::Handle;

/// Executor adapter dispatching closures onto worker threads.
///
/// `submit` enqueues the closure on tokio's blocking thread pool and never
/// blocks the caller; the returned [`Handle`] resolves to the closure's
/// return value. A panic inside the closure is captured as
/// [`Error::Execution`] on that handle alone.
///
/// Clones share the same closed flag and concurrency limit, so a clone can
/// be moved into a scope or task while `close` remains observable from the
/// original.
#[derive(Clone, Debug)]
pub struct Threaded {
    limit: Option<Arc<Semaphore>>,
    closed: Arc<AtomicBool>,
}

impl Threaded {
    /// New adapter with no concurrency bound of its own.
    pub fn new() -> Self {
        Self {
            limit: None,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// New adapter running at most `max_workers` closures at once.
    pub fn with_limit(max_workers: usize) -> Self {
        Self {
            limit: Some(Arc::new(Semaphore::new(max_workers.max(1)))),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Schedule one unit of work, returning a handle to its outcome.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// [`Error::ClosedExecutor`] after [`close`](Self::close).
    pub fn submit<T, F>(&self, f: F) -> Result<Handle<T>, Error>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        if self.is_closed() {
            return Err(Error::ClosedExecutor);
        }
        let (tx, rx) = oneshot::channel();
        let limit = self.limit.clone();
        tokio::spawn(async move {
            let _permit = match limit {
                Some(semaphore) => semaphore.acquire_owned().await.ok(),
                None => None,
            };
            let outcome = match tokio::task::spawn_blocking(f).await {
                Ok(value) => Ok(value),
                Err(err) if err.is_panic() => {
                    Err(Error::Execution(panic_message(err.into_panic())))
                }
                Err(_) => Err(Error::Canceled),
            };
            let _ = tx.send(outcome);
        });
        trace!("submitted closure to thread pool");
        Ok(Handle::new(rx))
    }

    /// Releases the adapter; later submissions fail with
    /// [`Error::ClosedExecutor`]. Work already submitted keeps running.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Whether the adapter has been released.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Scoped acquisition: runs `f` with a clone of the adapter, then closes
    /// it on the way out regardless of how `f`'s future resolved.
    pub async fn scope<Fut>(&self, f: impl FnOnce(Self) -> Fut) -> Fut::Output
    where
        Fut: std::future::Future,
    {
        let output = f(self.clone()).await;
        self.close();
        output
    }
}

impl Default for Threaded {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[tokio::test]
    async fn test_submit_returns_value() {
        let pool = Threaded::new();
        let handle = pool.submit(|| 2 + 2).unwrap();
        assert_eq!(handle.wait().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_panic_is_execution_error() {
        let pool = Threaded::new();
        let handle = pool.submit(|| -> i32 { panic!("boom") }).unwrap();
        match handle.await {
            Err(Error::Execution(msg)) => assert!(msg.contains("boom")),
            other => panic!("expected execution error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_submit_after_close_fails() {
        let pool = Threaded::new();
        pool.close();
        assert!(matches!(pool.submit(|| 1), Err(Error::ClosedExecutor)));
    }

    #[tokio::test]
    async fn test_scope_closes_on_exit() {
        let pool = Threaded::new();
        let value = pool
            .scope(|pool| async move { pool.submit(|| 5).unwrap().wait().await })
            .await
            .unwrap();
        assert_eq!(value, 5);
        assert!(pool.is_closed());
    }

    #[tokio::test]
    async fn test_limit_serializes() {
        let pool = Threaded::with_limit(1);
        let start = Instant::now();
        let first = pool
            .submit(|| std::thread::sleep(Duration::from_millis(100)))
            .unwrap();
        let second = pool
            .submit(|| std::thread::sleep(Duration::from_millis(100)))
            .unwrap();
        first.wait().await.unwrap();
        second.wait().await.unwrap();
        // With one permit the sleeps cannot overlap.
        assert!(start.elapsed() >= Duration::from_millis(180));
    }
}
