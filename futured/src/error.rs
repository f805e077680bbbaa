//! Failure taxonomy.
//!
//! Every failure is deferred until the affected value is consulted: a failed
//! handle reports its error when awaited, a failed stream element appears as
//! an `Err` item in the position it would have occupied. No background
//! failure aborts unrelated in-flight work.

use std::fmt;
use std::io;
use std::process::ExitStatus;
use thiserror::Error;

/// Errors surfaced by handles, result streams, and external commands.
#[derive(Debug, Error)]
pub enum Error {
    /// A bounded wait produced zero completions within the configured
    /// duration. Pending operations are left pending.
    #[error("timed out waiting for a completion")]
    Timeout,

    /// The executor was released; no further work can be submitted.
    #[error("executor is closed")]
    ClosedExecutor,

    /// The deferred function panicked while executing.
    #[error("deferred call panicked: {0}")]
    Execution(String),

    /// The task producing this handle was dropped before completing.
    #[error("task was dropped before it completed")]
    Canceled,

    /// An external process could not be started.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// An external process exited with a nonzero status.
    #[error("{program} exited with {status}")]
    Command {
        /// Program that failed.
        program: String,
        /// Arguments it was invoked with.
        args: Vec<String>,
        /// Exit status reported by the OS.
        status: ExitStatus,
        /// Captured standard output.
        stdout: Vec<u8>,
        /// Captured standard error.
        stderr: Vec<u8>,
    },

    /// The bound placed on [`Cmd::result_timeout`](crate::command::Cmd::result_timeout)
    /// elapsed. The process is left running.
    #[error("{program} did not exit within the allotted time")]
    CommandTimeout {
        /// Program still running.
        program: String,
    },

    /// I/O failure while interacting with a running process or runtime.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

/// Failure of one supervised child, attributable to the input value it was
/// spawned for.
///
/// Yielded by [`forked`](crate::forked::forked) at the reap point where the
/// child's exit was collected, which may be during spawning of a later value
/// or during the final drain.
#[derive(Debug, Error)]
pub enum ChildError<T: fmt::Debug> {
    /// The child exited with a nonzero status.
    #[error("child spawned for {value:?} exited with {status}")]
    Exit {
        /// Exit status reported at reap time.
        status: ExitStatus,
        /// The input value the child was spawned for.
        value: T,
    },

    /// The child could not be spawned or waited on.
    #[error("child spawned for {value:?} failed: {source}")]
    Io {
        /// Underlying OS error.
        source: io::Error,
        /// The input value the child was spawned for.
        value: T,
    },
}

impl<T: fmt::Debug> ChildError<T> {
    /// The originating input value, for failure attribution.
    pub fn value(&self) -> &T {
        match self {
            Self::Exit { value, .. } | Self::Io { value, .. } => value,
        }
    }

    /// Consumes the error, returning the originating input value.
    pub fn into_value(self) -> T {
        match self {
            Self::Exit { value, .. } | Self::Io { value, .. } => value,
        }
    }
}
