//! External commands with captured output and pipeline chaining.
//!
//! A [`Cmd`] starts its process the moment it is constructed, with stdout
//! and stderr captured rather than inherited. [`Cmd::pipe`] feeds one
//! command's stdout into the next command's stdin, forming a linear
//! pipeline of any length.

use std::io;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::debug;

use crate::error::Error;

/// Specification of one external process: program, arguments, and optional
/// bytes to feed on stdin.
///
/// This is the unit of work that crosses a process boundary — everything a
/// child receives is spelled out here, and everything it returns comes back
/// as captured stdout bytes.
#[derive(Debug, Clone, Default)]
pub struct CmdSpec {
    /// The program to execute.
    pub program: String,
    /// Arguments to pass to the program.
    pub args: Vec<String>,
    /// Bytes written to the child's stdin, if any.
    pub stdin: Option<Vec<u8>>,
}

impl CmdSpec {
    /// Create a spec for the given program.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
        }
    }

    /// Add an argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Feed the given bytes to the child's stdin.
    #[must_use]
    pub fn stdin(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(bytes.into());
        self
    }

    /// Builds the command, returning it alongside any stdin payload to be
    /// written once the child is running. Stdout/stderr disposition is left
    /// to the caller.
    pub(crate) fn into_parts(self) -> (Command, Option<Vec<u8>>) {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command.stdin(if self.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        (command, self.stdin)
    }
}

/// Writes `bytes` to the child's stdin from a background task, then closes
/// the pipe so the child sees end-of-input.
pub(crate) fn feed_stdin(child: &mut Child, bytes: Vec<u8>) {
    if let Some(mut pipe) = child.stdin.take() {
        tokio::spawn(async move {
            let _ = pipe.write_all(&bytes).await;
            let _ = pipe.shutdown().await;
        });
    }
}

/// A running external process with captured stdout and stderr.
///
/// Construction spawns the process immediately. Consuming the result — via
/// [`result`](Cmd::result), [`result_timeout`](Cmd::result_timeout), or
/// [`lines`](Cmd::lines) — waits for it to exit; a nonzero exit status maps
/// to [`Error::Command`] carrying the captured output.
#[derive(Debug)]
pub struct Cmd {
    child: Child,
    program: String,
    args: Vec<String>,
}

/// Spawn a command from a full argv, first element being the program.
///
/// # Errors
///
/// [`Error::Spawn`] if argv is empty or the program cannot be started.
pub fn command<I, S>(argv: I) -> Result<Cmd, Error>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut argv = argv.into_iter().map(Into::into);
    let program = argv.next().ok_or_else(|| Error::Spawn {
        program: String::new(),
        source: io::Error::new(io::ErrorKind::InvalidInput, "empty argv"),
    })?;
    Cmd::new(program, argv)
}

impl Cmd {
    /// Spawn `program` with `args`, stdin closed, output captured.
    ///
    /// # Errors
    ///
    /// [`Error::Spawn`] if the process cannot be started.
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::spawn(
            program.into(),
            args.into_iter().map(Into::into).collect(),
            Stdio::null(),
        )
    }

    fn spawn(program: String, args: Vec<String>, stdin: Stdio) -> Result<Self, Error> {
        let mut command = Command::new(&program);
        command
            .args(&args)
            .stdin(stdin)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let child = command.spawn().map_err(|source| Error::Spawn {
            program: program.clone(),
            source,
        })?;
        debug!(%program, "spawned command");

        Ok(Self {
            child,
            program,
            args,
        })
    }

    /// Start a new command whose stdin is this command's stdout.
    ///
    /// The earlier stage keeps running and is reaped in the background once
    /// it exits; its exit status is not part of the pipeline's result, as
    /// with a shell pipe. Each call returns a fresh `Cmd`, so longer chains
    /// compose the same way.
    ///
    /// # Errors
    ///
    /// [`Error::Spawn`] if the next process cannot be started, [`Error::Io`]
    /// if this command's stdout was already taken.
    pub fn pipe<I, S>(mut self, program: impl Into<String>, args: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let stdout = self.child.stdout.take().ok_or_else(|| {
            Error::Io(io::Error::other("command stdout already consumed"))
        })?;
        let stdin: Stdio = stdout.try_into().map_err(Error::Io)?;

        // Reap the earlier stage once it exits so it never lingers as a zombie.
        let mut upstream = self.child;
        tokio::spawn(async move {
            let _ = upstream.wait().await;
        });

        Self::spawn(
            program.into(),
            args.into_iter().map(Into::into).collect(),
            stdin,
        )
    }

    /// Wait for the process to exit and return its captured stdout.
    ///
    /// # Errors
    ///
    /// [`Error::Command`] carrying the exit status and captured output on a
    /// nonzero exit.
    pub async fn result(self) -> Result<Vec<u8>, Error> {
        let Self {
            child,
            program,
            args,
        } = self;
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

    /// Like [`result`](Cmd::result), but bounded by `limit`.
    ///
    /// On timeout the process is deliberately left running — nothing is
    /// killed — and [`Error::CommandTimeout`] is returned.
    pub async fn result_timeout(self, limit: Duration) -> Result<Vec<u8>, Error> {
        let program = self.program.clone();
        match timeout(limit, self.result()).await {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::CommandTimeout { program }),
        }
    }

    /// Wait for the process and return its stdout split into lines.
    ///
    /// Consumes the command; once the output has been read the process has
    /// already exited.
    pub async fn lines(self) -> Result<Vec<String>, Error> {
        let stdout = self.result().await?;
        Ok(String::from_utf8_lossy(&stdout)
            .lines()
            .map(ToString::to_string)
            .collect())
    }
}
