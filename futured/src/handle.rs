//! The uniform future contract shared by every execution substrate.
//!
//! A [`Handle`] refers to exactly one asynchronous operation. Whichever
//! substrate dispatched the work (thread pool, process pool, cooperative
//! scheduler) owns the running task and fulfills the handle through a
//! one-shot channel; the holder only observes the eventual outcome.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::Error;

/// Reference to one asynchronous operation's eventual outcome.
///
/// Resolves to the operation's value, or to the error it failed with. The
/// terminal value is delivered exactly once; the handle is consumed by
/// completion, so an operation can never be observed twice.
///
/// A handle whose producing task panicked resolves to [`Error::Execution`];
/// one whose producer was dropped before fulfilling it resolves to
/// [`Error::Canceled`].
pub struct Handle<T> {
    rx: oneshot::Receiver<Result<T, Error>>,
}

impl<T> Handle<T> {
    pub(crate) fn new(rx: oneshot::Receiver<Result<T, Error>>) -> Self {
        Self { rx }
    }

    /// Waits for the operation to complete and returns its outcome.
    ///
    /// Equivalent to awaiting the handle directly.
    pub async fn wait(self) -> Result<T, Error> {
        self.await
    }
}

impl<T> Future for Handle<T> {
    type Output = Result<T, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(Error::Canceled)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fulfilled_handle() {
        let (tx, rx) = oneshot::channel();
        let handle = Handle::new(rx);
        tx.send(Ok(7)).unwrap();
        assert_eq!(handle.wait().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_dropped_producer_is_canceled() {
        let (tx, rx) = oneshot::channel::<Result<i32, Error>>();
        let handle = Handle::new(rx);
        drop(tx);
        assert!(matches!(handle.await, Err(Error::Canceled)));
    }
}
