//! Completion streaming: drain a mutable set of in-flight operations as
//! they finish.
//!
//! A [`CompletionStream`] holds any number of pending futures — substrate
//! handles or keyed wrappers — and yields each one's outcome exactly once,
//! in completion order. The set can be extended between waits, including
//! from inside a scoped drain, and each wait cycle is bounded by the
//! configured timeout.

use std::future::Future;
use std::time::Duration;

use futures::stream::{FuturesUnordered, Stream, StreamExt};
use tracing::trace;

use crate::deferred::Wait;
use crate::error::Error;
use crate::handle::Handle;

/// A dynamically-updatable collection of in-flight operations, consumed in
/// completion order.
///
/// Invariants: an operation is removed from the set at the moment it is
/// yielded and is never yielded twice; the stream ends exactly when every
/// member has been yielded. A timed-out wait yields `Err(Error::Timeout)`
/// and leaves all pending operations pending — nothing is cancelled.
pub struct CompletionStream<F: Future> {
    inflight: FuturesUnordered<F>,
    timeout: Option<Duration>,
}

impl<F: Future> CompletionStream<F> {
    /// New empty stream with no wait bound.
    pub fn new() -> Self {
        Self {
            inflight: FuturesUnordered::new(),
            timeout: None,
        }
    }

    /// New empty stream whose every wait cycle is bounded by `limit`.
    pub fn with_timeout(limit: Duration) -> Self {
        Self {
            inflight: FuturesUnordered::new(),
            timeout: Some(limit),
        }
    }

    /// Set or clear the per-cycle wait bound.
    ///
    /// The bound resets on every wait; it is not a cumulative deadline
    /// across the whole iteration.
    pub fn set_timeout(&mut self, limit: Option<Duration>) {
        self.timeout = limit;
    }

    /// Insert another operation into the set.
    ///
    /// Legal at any point, including between completion waits; the added
    /// operation is eligible for the next wait cycle.
    pub fn add(&mut self, future: F) {
        self.inflight.push(future);
    }

    /// Number of operations still in flight.
    pub fn len(&self) -> usize {
        self.inflight.len()
    }

    /// Whether no operations remain.
    pub fn is_empty(&self) -> bool {
        self.inflight.is_empty()
    }
}

impl<T, F> CompletionStream<F>
where
    F: Future<Output = Result<T, Error>>,
{
    /// Wait for the next completion, bounded by the configured timeout.
    ///
    /// An empty set is never waited on — returns `None` immediately. An
    /// exhausted wait returns `Some(Err(Error::Timeout))`; the caller may
    /// keep iterating, the set is unchanged. A completed operation that
    /// failed still counts as a completion: its error is yielded in place
    /// of a value.
    pub async fn next_completed(&mut self) -> Option<Result<T, Error>> {
        if self.inflight.is_empty() {
            return None;
        }
        match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, self.inflight.next()).await {
                Ok(item) => item,
                Err(_) => {
                    trace!(pending = self.inflight.len(), "completion wait timed out");
                    Some(Err(Error::Timeout))
                }
            },
            None => self.inflight.next().await,
        }
    }

    /// Wait out every remaining operation, ignoring the timeout, and
    /// collect the outcomes.
    pub async fn drain(&mut self) -> Vec<Result<T, Error>> {
        let mut outcomes = Vec::with_capacity(self.inflight.len());
        while let Some(outcome) = self.inflight.next().await {
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Turn the set into a plain [`Stream`] of outcomes, honoring the
    /// per-cycle timeout.
    pub fn into_stream(self) -> impl Stream<Item = Result<T, Error>> {
        futures::stream::unfold(self, |mut stream| async move {
            stream
                .next_completed()
                .await
                .map(|outcome| (outcome, stream))
        })
    }

    /// Scoped use: run `f` with the stream, then wait out everything still
    /// pending before returning.
    ///
    /// The closure receives the stream by value and hands it back with its
    /// result, so it can add work, consume completions, or bail early with
    /// an `Err` result — the drain runs on every return path. No operation
    /// is abandoned silently.
    pub async fn scope<R, Fut>(self, f: impl FnOnce(Self) -> Fut) -> (R, Vec<Result<T, Error>>)
    where
        Fut: Future<Output = (Self, R)>,
    {
        let (mut stream, value) = f(self).await;
        let remainder = stream.drain().await;
        (value, remainder)
    }
}

impl<F: Future> Default for CompletionStream<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Future> Extend<F> for CompletionStream<F> {
    fn extend<I: IntoIterator<Item = F>>(&mut self, iter: I) {
        for future in iter {
            self.inflight.push(future);
        }
    }
}

impl<F: Future> FromIterator<F> for CompletionStream<F> {
    fn from_iter<I: IntoIterator<Item = F>>(iter: I) -> Self {
        let mut stream = Self::new();
        stream.extend(iter);
        stream
    }
}

/// Keyed completion: stream `(key, value)` pairs out of `(key, handle)`
/// pairs in completion order.
///
/// Each pair is wrapped into a single future before it enters the set, so
/// keys travel with their handles and need not be unique. Only
/// `wait.timeout` is consulted; keyed consumption is always in completion
/// order.
pub fn items<K, T, I>(
    pairs: I,
    wait: Wait,
) -> CompletionStream<impl Future<Output = Result<(K, T), Error>>>
where
    I: IntoIterator<Item = (K, Handle<T>)>,
{
    let mut stream = CompletionStream::new();
    stream.set_timeout(wait.timeout);
    for (key, handle) in pairs {
        stream.add(async move { Ok((key, handle.await?)) });
    }
    stream
}

/// Scoped waiting: build a [`CompletionStream`] from `handles`, run `f`
/// with it, and drain everything still pending on the way out.
///
/// Returns the closure's value alongside the drained outcomes.
pub async fn waiting<T, F, I, R, Fut>(
    handles: I,
    wait: Wait,
    f: impl FnOnce(CompletionStream<F>) -> Fut,
) -> (R, Vec<Result<T, Error>>)
where
    F: Future<Output = Result<T, Error>>,
    I: IntoIterator<Item = F>,
    Fut: Future<Output = (CompletionStream<F>, R)>,
{
    let mut stream: CompletionStream<F> = handles.into_iter().collect();
    stream.set_timeout(wait.timeout);
    stream.scope(f).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deferred::Deferred;
    use std::collections::BTreeSet;
    use std::time::Duration;

    fn snooze(ms: u64) -> u64 {
        std::thread::sleep(Duration::from_millis(ms));
        ms
    }

    #[tokio::test]
    async fn test_empty_stream_is_never_waited_on() {
        let mut stream: CompletionStream<Handle<u64>> = CompletionStream::with_timeout(Duration::ZERO);
        assert!(stream.next_completed().await.is_none());
    }

    #[tokio::test]
    async fn test_round_trip_yields_each_exactly_once() {
        let deferred = Deferred::threaded(snooze);
        let mut stream: CompletionStream<_> = (0..10)
            .map(|n| deferred.call(n % 3 * 10).unwrap())
            .collect();

        let mut count = 0;
        while let Some(outcome) = stream.next_completed().await {
            outcome.unwrap();
            count += 1;
        }
        assert_eq!(count, 10);
        assert!(stream.is_empty());
    }

    #[tokio::test]
    async fn test_add_mid_iteration() {
        let deferred = Deferred::threaded(snooze);
        let mut stream = CompletionStream::new();
        stream.add(deferred.call(0).unwrap());

        let first = stream.next_completed().await.unwrap().unwrap();
        assert_eq!(first, 0);

        // The set is drained but still open for insertion.
        stream.add(deferred.call(10).unwrap());
        let second = stream.next_completed().await.unwrap().unwrap();
        assert_eq!(second, 10);
        assert!(stream.next_completed().await.is_none());
    }

    #[tokio::test]
    async fn test_timeout_leaves_pending_operations_pending() {
        let deferred = Deferred::threaded(snooze);
        let mut stream = CompletionStream::with_timeout(Duration::from_millis(10));
        stream.add(deferred.call(200).unwrap());

        assert!(matches!(
            stream.next_completed().await,
            Some(Err(Error::Timeout))
        ));
        assert_eq!(stream.len(), 1);

        // The same operation still completes on a later, longer cycle.
        stream.set_timeout(Some(Duration::from_secs(5)));
        assert_eq!(stream.next_completed().await.unwrap().unwrap(), 200);
    }

    #[tokio::test]
    async fn test_failed_operation_counts_as_completed() {
        let deferred = Deferred::threaded(|_: u64| -> u64 { panic!("sick worker") });
        let mut stream = CompletionStream::new();
        stream.add(deferred.call(0).unwrap());

        match stream.next_completed().await {
            Some(Err(Error::Execution(msg))) => assert!(msg.contains("sick worker")),
            other => panic!("expected execution failure, got {other:?}"),
        }
        assert!(stream.next_completed().await.is_none());
    }

    #[tokio::test]
    async fn test_items_pairs_keys_with_values() {
        let deferred = Deferred::threaded(snooze);
        let pairs = ["slow", "quick"]
            .into_iter()
            .zip([deferred.call(100).unwrap(), deferred.call(0).unwrap()]);

        let keyed = items(pairs, Wait::completed()).drain().await;
        let got: Vec<_> = keyed.into_iter().map(Result::unwrap).collect();
        assert_eq!(got, [("quick", 0), ("slow", 100)]);
    }

    #[tokio::test]
    async fn test_waiting_drains_on_exit() {
        let deferred = Deferred::threaded(snooze);
        let handles = [20, 0, 10].map(|ms| deferred.call(ms).unwrap());

        let (consumed, remainder) = waiting(handles, Wait::ordered(), |mut stream| async move {
            // Consume one completion, add one more call, leave the rest.
            let first = stream.next_completed().await.unwrap().unwrap();
            stream.add(deferred.call(30).unwrap());
            (stream, first)
        })
        .await;

        assert_eq!(consumed, 0);
        let rest: BTreeSet<u64> = remainder.into_iter().map(Result::unwrap).collect();
        assert_eq!(rest, BTreeSet::from([10, 20, 30]));
    }
}
