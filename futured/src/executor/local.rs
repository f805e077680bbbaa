//! Cooperative single-threaded adapter.

use std::future::Future;
use std::pin::Pin;

use futures::stream::{Stream, StreamExt};
use tokio::runtime::{Builder, Runtime};
use tokio::sync::oneshot;

use super::panic_message;
use crate::deferred::{results, Wait};
use crate::error::Error;
use crate::handle::Handle;

/// Executor adapter over a cooperative single-threaded scheduler.
///
/// Owns a current-thread tokio runtime. Submitted futures progress only
/// while the runtime is being driven — by [`run`](Local::run), by pulling a
/// [`BlockingIter`], or by awaiting handles through
/// [`results`](Local::results) — and suspension happens only at the
/// futures' own await points, never preemptively.
///
/// This is the bridge that makes asynchronous work consumable from
/// synchronous code; do not construct one inside an existing runtime.
#[derive(Debug)]
pub struct Local {
    rt: Runtime,
}

impl Local {
    /// Builds the adapter and its private current-thread runtime.
    ///
    /// # Errors
    ///
    /// [`Error::Io`] if the runtime cannot be created.
    pub fn new() -> Result<Self, Error> {
        let rt = Builder::new_current_thread().enable_all().build()?;
        Ok(Self { rt })
    }

    /// Schedule a future on the cooperative scheduler.
    ///
    /// The returned handle resolves once the runtime has been driven far
    /// enough to complete the future; a panic inside it becomes
    /// [`Error::Execution`] on the handle.
    pub fn submit<F>(&self, future: F) -> Handle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let task = self.rt.spawn(future);
        self.rt.spawn(async move {
            let outcome = match task.await {
                Ok(value) => Ok(value),
                Err(err) if err.is_panic() => {
                    Err(Error::Execution(panic_message(err.into_panic())))
                }
                Err(_) => Err(Error::Canceled),
            };
            let _ = tx.send(outcome);
        });
        Handle::new(rx)
    }

    /// Synchronously drives the scheduler until `future` completes and
    /// returns its value.
    pub fn run<F: Future>(&self, future: F) -> F::Output {
        self.rt.block_on(future)
    }

    /// Wraps an asynchronous sequence so each synchronous `next()` resumes
    /// the scheduler only as far as the next produced element.
    ///
    /// Works for finite or infinite streams; the iterator is not
    /// restartable.
    pub fn iter<S: Stream>(&self, stream: S) -> BlockingIter<'_, S> {
        BlockingIter {
            rt: &self.rt,
            stream: Box::pin(stream),
        }
    }

    /// Consume handles synchronously: submission order by default,
    /// completion order when `wait` asks for it, with `wait.timeout`
    /// bounding each completion wait.
    pub fn results<T, I>(
        &self,
        handles: I,
        wait: Wait,
    ) -> BlockingIter<'_, impl Stream<Item = Result<T, Error>>>
    where
        I: IntoIterator<Item = Handle<T>>,
    {
        self.iter(results(handles, wait))
    }
}

/// Iterator pulling elements out of a `Stream` by driving a runtime one
/// element at a time.
pub struct BlockingIter<'rt, S> {
    rt: &'rt Runtime,
    stream: Pin<Box<S>>,
}

impl<S: Stream> Iterator for BlockingIter<'_, S> {
    type Item = S::Item;

    fn next(&mut self) -> Option<S::Item> {
        self.rt.block_on(self.stream.next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{sleep, Duration};

    async fn asleep(ms: u64) -> u64 {
        sleep(Duration::from_millis(ms)).await;
        ms
    }

    #[test]
    fn test_run_drives_to_completion() {
        let local = Local::new().unwrap();
        assert_eq!(local.run(async { 1 + 1 }), 2);
    }

    #[test]
    fn test_results_in_submission_order() {
        let local = Local::new().unwrap();
        let handles: Vec<_> = [30, 20, 0].into_iter().map(|ms| local.submit(asleep(ms))).collect();
        let values: Vec<_> = local
            .results(handles, Wait::ordered())
            .map(Result::unwrap)
            .collect();
        assert_eq!(values, vec![30, 20, 0]);
    }

    #[test]
    fn test_results_in_completion_order() {
        let local = Local::new().unwrap();
        let handles: Vec<_> = [30, 20, 0].into_iter().map(|ms| local.submit(asleep(ms))).collect();
        let values: Vec<_> = local
            .results(handles, Wait::completed())
            .map(Result::unwrap)
            .collect();
        assert_eq!(values, vec![0, 20, 30]);
    }

    #[test]
    fn test_iter_resumes_per_element() {
        let local = Local::new().unwrap();
        let stream = futures::stream::iter(0..).then(|n| async move { n * 2 });
        let mut iter = local.iter(stream);
        // An infinite sequence, pulled one element at a time.
        assert_eq!(iter.next(), Some(0));
        assert_eq!(iter.next(), Some(2));
        assert_eq!(iter.next(), Some(4));
    }

    #[test]
    fn test_submit_panic_is_execution_error() {
        let local = Local::new().unwrap();
        let handle = local.submit(async { panic!("bad future") });
        match local.run(handle) {
            Err(Error::Execution(msg)) => assert!(msg.contains("bad future")),
            other => panic!("expected execution error, got {other:?}"),
        }
    }
}
