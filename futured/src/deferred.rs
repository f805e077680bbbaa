//! Bound calls and the mapping surface.
//!
//! A [`Deferred`] pairs a function with a [`Threaded`] executor without
//! starting any work; every [`call`](Deferred::call) dispatches one unit of
//! work and returns a fresh [`Handle`]. Bound arguments are closure
//! captures; the call argument is appended at dispatch. Tuples serve where
//! the original design had `starmap`.

use std::time::Duration;

use futures::future::Either;
use futures::stream::{Stream, StreamExt};

use crate::error::Error;
use crate::executor::Threaded;
use crate::handle::Handle;
use crate::stream::{items, CompletionStream};

/// How a batch of handles should be consumed.
///
/// Without a completion-ordering request, results come back in submission
/// order. Requesting completion order — explicitly or by setting a timeout —
/// streams results as operations finish, each wait cycle bounded by the
/// timeout.
#[derive(Debug, Clone, Copy, Default)]
pub struct Wait {
    /// Yield results in completion order instead of submission order.
    pub as_completed: bool,
    /// Bound on each wait for the next completion.
    pub timeout: Option<Duration>,
}

impl Wait {
    /// Submission order (the default).
    pub fn ordered() -> Self {
        Self::default()
    }

    /// Completion order.
    pub fn completed() -> Self {
        Self {
            as_completed: true,
            timeout: None,
        }
    }

    /// Bound each wait for the next completion by `limit`.
    ///
    /// A timeout implies completion order.
    #[must_use]
    pub fn timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    pub(crate) fn wants_completion_order(self) -> bool {
        self.as_completed || self.timeout.is_some()
    }
}

/// Stream results out of a batch of handles.
///
/// In submission order each handle is awaited in turn; in completion order
/// the batch drains through a [`CompletionStream`], yielding
/// `Err(Error::Timeout)` for a wait cycle that produces nothing. Either way
/// every handle is yielded exactly once, a failed operation appearing as an
/// `Err` item in its place.
pub fn results<T, I>(handles: I, wait: Wait) -> impl Stream<Item = Result<T, Error>>
where
    I: IntoIterator<Item = Handle<T>>,
{
    if wait.wants_completion_order() {
        let mut stream = CompletionStream::new();
        stream.set_timeout(wait.timeout);
        stream.extend(handles);
        Either::Left(stream.into_stream())
    } else {
        Either::Right(futures::stream::iter(handles).then(|handle| handle))
    }
}

/// A function bound to an executor, callable into a [`Handle`].
///
/// Construction never starts work. The value is reusable: each `call`
/// schedules an independent unit of work. Types wanting selected operations
/// to run asynchronously hold one of these and route those operations
/// through it — composition rather than subclassing.
#[derive(Clone, Debug)]
pub struct Deferred<F> {
    executor: Threaded,
    func: F,
}

impl<F> Deferred<F> {
    /// Bind `func` to an existing executor.
    pub fn new(executor: Threaded, func: F) -> Self {
        Self { executor, func }
    }

    /// Bind `func` to a fresh unbounded [`Threaded`] executor.
    pub fn threaded(func: F) -> Self {
        Self::new(Threaded::new(), func)
    }

    /// The executor this call dispatches through.
    pub fn executor(&self) -> &Threaded {
        &self.executor
    }

    /// Dispatch one invocation with `arg`, returning a handle to the result.
    ///
    /// # Errors
    ///
    /// [`Error::ClosedExecutor`] if the executor has been released.
    pub fn call<A, T>(&self, arg: A) -> Result<Handle<T>, Error>
    where
        F: Fn(A) -> T + Clone + Send + 'static,
        A: Send + 'static,
        T: Send + 'static,
    {
        let func = self.func.clone();
        self.executor.submit(move || func(arg))
    }

    /// Dispatch one call per argument, then stream results per `wait`.
    ///
    /// All calls are submitted up front, so the batch runs concurrently
    /// regardless of consumption order.
    ///
    /// # Errors
    ///
    /// [`Error::ClosedExecutor`] if the executor has been released.
    pub fn map<A, T, I>(
        &self,
        args: I,
        wait: Wait,
    ) -> Result<impl Stream<Item = Result<T, Error>>, Error>
    where
        I: IntoIterator<Item = A>,
        F: Fn(A) -> T + Clone + Send + 'static,
        A: Send + 'static,
        T: Send + 'static,
    {
        let handles = args
            .into_iter()
            .map(|arg| self.call(arg))
            .collect::<Result<Vec<_>, Error>>()?;
        Ok(results(handles, wait))
    }

    /// Dispatch one call per argument and stream `(arg, value)` pairs in
    /// completion order, the argument cloned as the key.
    ///
    /// # Errors
    ///
    /// [`Error::ClosedExecutor`] if the executor has been released.
    pub fn mapzip<A, T, I>(
        &self,
        args: I,
        wait: Wait,
    ) -> Result<impl Stream<Item = Result<(A, T), Error>>, Error>
    where
        I: IntoIterator<Item = A>,
        F: Fn(A) -> T + Clone + Send + 'static,
        A: Clone + Send + 'static,
        T: Send + 'static,
    {
        let pairs = args
            .into_iter()
            .map(|arg| Ok((arg.clone(), self.call(arg)?)))
            .collect::<Result<Vec<_>, Error>>()?;
        Ok(items(pairs, wait).into_stream())
    }
}
