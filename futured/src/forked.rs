//! Bounded process supervisor.
//!
//! [`forked`] spawns one child process per input value while capping the
//! number of simultaneously live children. At capacity the supervisor
//! blocks on a reap before the next spawn; a nonzero exit becomes a
//! [`ChildError`] carrying the originating value, so failures are
//! attributable to input data.

use std::fmt;
use std::thread::available_parallelism;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::command::{feed_stdin, CmdSpec};
use crate::error::ChildError;

/// Spawn one child process per value, at most `max_workers` live at once.
///
/// `make_cmd` derives each child's command from its value — the explicit
/// replacement for fork-style control-flow divergence: the child process
/// image performs the per-value work and exits, the parent keeps only the
/// (child, value) record.
///
/// The returned stream yields one item per value, in reap order (unrelated
/// to spawn order): `Ok(value)` for a zero exit, `Err(ChildError)` for a
/// nonzero exit or a spawn failure. Failures do not stop the supervisor —
/// remaining values are still spawned, and every live child is reaped
/// before the stream ends. Each call supervises a fresh batch; the stream
/// is not restartable.
///
/// `max_workers == 0` means one worker per available CPU. Must be called
/// from within a tokio runtime.
pub fn forked<T, I, F>(
    values: I,
    max_workers: usize,
    make_cmd: F,
) -> ReceiverStream<Result<T, ChildError<T>>>
where
    T: fmt::Debug + Send + 'static,
    I: IntoIterator<Item = T>,
    I::IntoIter: Send + 'static,
    F: Fn(&T) -> CmdSpec + Send + 'static,
{
    let max_workers = if max_workers == 0 {
        available_parallelism().map_or(1, std::num::NonZeroUsize::get)
    } else {
        max_workers
    };
    let (tx, rx) = mpsc::channel(max_workers);
    tokio::spawn(supervise(values.into_iter(), max_workers, make_cmd, tx));
    ReceiverStream::new(rx)
}

async fn supervise<T, F>(
    values: impl Iterator<Item = T>,
    max_workers: usize,
    make_cmd: F,
    tx: mpsc::Sender<Result<T, ChildError<T>>>,
) where
    T: fmt::Debug + Send + 'static,
    F: Fn(&T) -> CmdSpec,
{
    let mut children: JoinSet<(std::io::Result<std::process::ExitStatus>, T)> = JoinSet::new();

    for value in values {
        // Reap before spawning once the live-child table is full.
        while children.len() >= max_workers {
            if !reap(&mut children, &tx).await {
                return;
            }
        }

        let spec = make_cmd(&value);
        let program = spec.program.clone();
        let (mut command, stdin) = spec.into_parts();
        match command.spawn() {
            Ok(mut child) => {
                debug!(%program, value = ?value, "spawned supervised child");
                if let Some(bytes) = stdin {
                    feed_stdin(&mut child, bytes);
                }
                children.spawn(async move { (child.wait().await, value) });
            }
            Err(source) => {
                if tx.send(Err(ChildError::Io { source, value })).await.is_err() {
                    return;
                }
            }
        }
    }

    // Drain: no child is left unreaped on the way out.
    while !children.is_empty() {
        if !reap(&mut children, &tx).await {
            return;
        }
    }
}

/// Collects one exited child and reports its outcome. Returns `false` when
/// the consumer has gone away and supervision should stop.
async fn reap<T: fmt::Debug + 'static>(
    children: &mut JoinSet<(std::io::Result<std::process::ExitStatus>, T)>,
    tx: &mpsc::Sender<Result<T, ChildError<T>>>,
) -> bool {
    let Some(joined) = children.join_next().await else {
        return true;
    };
    let outcome = match joined {
        Ok((Ok(status), value)) if status.success() => Ok(value),
        Ok((Ok(status), value)) => Err(ChildError::Exit { status, value }),
        Ok((Err(source), value)) => Err(ChildError::Io { source, value }),
        Err(join_err) => {
            // The waiter task itself failed; the value is lost with it.
            warn!(error = %join_err, "child waiter task failed");
            return true;
        }
    };
    tx.send(outcome).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream::StreamExt;
    use std::collections::BTreeSet;
    use std::time::{Duration, Instant};

    fn sleep_cmd(secs: &f64) -> CmdSpec {
        CmdSpec::new("sleep").arg(format!("{secs}"))
    }

    #[tokio::test]
    async fn test_single_worker_serializes() {
        let start = Instant::now();
        let outcomes: Vec<_> = forked([0.15, 0.1, 0.05], 1, sleep_cmd).collect().await;
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(Result::is_ok));
        assert!(start.elapsed() >= Duration::from_millis(280));
    }

    #[tokio::test]
    async fn test_extra_workers_run_in_parallel() {
        let start = Instant::now();
        let outcomes: Vec<_> = forked([0.15, 0.1, 0.05], 3, sleep_cmd).collect().await;
        assert_eq!(outcomes.len(), 3);
        assert!(start.elapsed() < Duration::from_millis(280));
    }

    #[tokio::test]
    async fn test_failure_carries_original_value() {
        let exit_with = |code: &u8| CmdSpec::new("sh").args(["-c", &format!("exit {code}")]);
        let outcomes: Vec<_> = forked([0u8, 1, 2], 2, exit_with).collect().await;

        // Failures do not stop later spawns: all three values come back.
        let mut succeeded = BTreeSet::new();
        let mut failed = BTreeSet::new();
        for outcome in outcomes {
            match outcome {
                Ok(value) => {
                    succeeded.insert(value);
                }
                Err(err) => {
                    if let ChildError::Exit { status, value } = &err {
                        assert_eq!(status.code(), Some(i32::from(*value)));
                    }
                    failed.insert(err.into_value());
                }
            }
        }
        assert_eq!(succeeded, BTreeSet::from([0]));
        assert_eq!(failed, BTreeSet::from([1, 2]));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_reported_per_value() {
        let outcomes: Vec<_> = forked(["ok", "bad"], 2, |v| {
            if *v == "bad" {
                CmdSpec::new("missing_program_98765")
            } else {
                CmdSpec::new("true")
            }
        })
        .collect()
        .await;

        let (ok, err): (Vec<_>, Vec<_>) = outcomes.into_iter().partition(Result::is_ok);
        assert_eq!(ok.len(), 1);
        assert_eq!(err.len(), 1);
        assert!(matches!(
            err.into_iter().next().unwrap(),
            Err(ChildError::Io { value: "bad", .. })
        ));
    }

    #[tokio::test]
    async fn test_stdin_reaches_supervised_child() {
        let outcomes: Vec<_> = forked(["x"], 1, |_| {
            // `grep -q` exits zero only if the pattern is found on stdin.
            CmdSpec::new("grep").args(["-q", "needle"]).stdin(&b"hay needle hay"[..])
        })
        .collect()
        .await;
        assert!(matches!(outcomes.as_slice(), [Ok("x")]));
    }
}
