//! Worker-process adapter.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::available_parallelism;

use tokio::sync::{oneshot, Semaphore};
use tracing::trace;

use crate::command::{feed_stdin, CmdSpec};
use crate::error::Error;
use crate::handle::Handle;

/// Executor adapter dispatching work as isolated OS processes.
///
/// Closures cannot cross a process boundary, so a unit of work is a
/// [`CmdSpec`] — program, arguments, optional stdin bytes — and the result
/// is the child's captured stdout. A nonzero exit fulfills the handle with
/// [`Error::Command`] carrying the captured output.
///
/// At most `max_workers` children run at once; `submit` never blocks, a
/// queued child waits for a permit before being spawned.
#[derive(Clone, Debug)]
pub struct Processed {
    semaphore: Arc<Semaphore>,
    closed: Arc<AtomicBool>,
}

impl Processed {
    /// New adapter running at most `max_workers` children at once;
    /// `0` means one per available CPU.
    pub fn new(max_workers: usize) -> Self {
        let max_workers = if max_workers == 0 {
            available_parallelism().map_or(1, std::num::NonZeroUsize::get)
        } else {
            max_workers
        };
        Self {
            semaphore: Arc::new(Semaphore::new(max_workers)),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Schedule one child process, returning a handle to its stdout.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// [`Error::ClosedExecutor`] after [`close`](Self::close). Spawn and
    /// exit failures surface on the returned handle, not here.
    pub fn submit(&self, spec: CmdSpec) -> Result<Handle<Vec<u8>>, Error> {
        if self.is_closed() {
            return Err(Error::ClosedExecutor);
        }
        let (tx, rx) = oneshot::channel();
        let semaphore = self.semaphore.clone();
        tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok();
            trace!(program = %spec.program, "running pooled child process");
            let _ = tx.send(run_spec(spec).await);
        });
        Ok(Handle::new(rx))
    }

    /// Number of children that could start immediately.
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Releases the adapter; later submissions fail with
    /// [`Error::ClosedExecutor`]. Children already queued keep running.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Whether the adapter has been released.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Scoped acquisition: runs `f` with a clone of the adapter, then closes
    /// it on the way out.
    pub async fn scope<Fut>(&self, f: impl FnOnce(Self) -> Fut) -> Fut::Output
    where
        Fut: std::future::Future,
    {
        let output = f(self.clone()).await;
        self.close();
        output
    }
}

impl Default for Processed {
    fn default() -> Self {
        Self::new(0)
    }
}

async fn run_spec(spec: CmdSpec) -> Result<Vec<u8>, Error> {
    let program = spec.program.clone();
    let args = spec.args.clone();
    let (mut command, stdin) = spec.into_parts();
    command.stdout(Stdio::piped()).stderr(Stdio::piped());

    let mut child = command.spawn().map_err(|source| Error::Spawn {
        program: program.clone(),
        source,
    })?;
    if let Some(bytes) = stdin {
        feed_stdin(&mut child, bytes);
    }

    let output = child.wait_with_output().await.map_err(Error::Io)?;
    if output.status.success() {
        Ok(output.stdout)
    } else {
        Err(Error::Command {
            program,
            args,
            status: output.status,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}
