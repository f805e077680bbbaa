//! Futured - one uniform interface for invoking functions asynchronously,
//! whatever the execution substrate.
//!
//! Work runs on worker threads ([`Threaded`]), in isolated worker processes
//! ([`Processed`]), or on a cooperative single-threaded scheduler
//! ([`Local`]); every substrate hands back the same [`Handle`] to the
//! eventual outcome. Results are consumed either in submission order or as
//! they complete.
//!
//! Architecture:
//! - [`handle`] defines the uniform future contract all substrates share
//! - [`executor`] binds units of work to a substrate, selected at
//!   construction time
//! - [`deferred`] pairs a function with an executor and maps it over
//!   argument batches
//! - [`stream`] drains a mutable set of in-flight operations in completion
//!   order, with per-cycle timeouts and drain-on-exit scoping
//! - [`forked`](forked()) supervises one child process per input value under a
//!   concurrency cap, attributing failures to input data
//! - [`command`] wraps external processes behind the same contract, with
//!   stdout-to-stdin pipelining
//!
//! # Example
//!
//! ```no_run
//! use futured::{Deferred, Wait};
//! use futures::stream::StreamExt;
//!
//! # async fn demo() -> Result<(), futured::Error> {
//! let double = Deferred::threaded(|n: u64| n * 2);
//!
//! // Submission order, executed in parallel.
//! let doubled: Vec<_> = double.map(0..4, Wait::ordered())?.collect().await;
//!
//! // Completion order, each wait bounded.
//! let wait = Wait::completed().timeout(std::time::Duration::from_secs(1));
//! let mut racing = Box::pin(double.map(0..4, wait)?);
//! while let Some(outcome) = racing.next().await {
//!     println!("{outcome:?}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod deferred;
pub mod error;
pub mod executor;
pub mod forked;
pub mod handle;
pub mod stream;

pub use command::{command, Cmd, CmdSpec};
pub use deferred::{results, Deferred, Wait};
pub use error::{ChildError, Error};
pub use executor::{BlockingIter, Local, Processed, Threaded};
pub use forked::forked;
pub use handle::Handle;
pub use stream::{items, waiting, CompletionStream};
