//! Spawning and supervising the external database tools.
//!
//! Every tool runs under a cancellation token and an optional deadline. When
//! either fires the process is killed; nothing outlives the request that
//! started it.

use std::ffi::OsStr;
use std::path::Path;
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::Sleep;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
pub enum ToolExit {
    Exited(ExitStatus),
    Cancelled,
    TimedOut,
}

impl ToolExit {
    pub fn success(&self) -> bool {
        matches!(self, ToolExit::Exited(status) if status.success())
    }
}

impl std::fmt::Display for ToolExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolExit::Exited(status) => match status.code() {
                Some(code) => write!(f, "exited with code {code}"),
                None => write!(f, "terminated by signal"),
            },
            ToolExit::Cancelled => write!(f, "cancelled"),
            ToolExit::TimedOut => write!(f, "timed out"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum LineLevel {
    Info,
    Warn,
}

/// Short name used to tag log lines, e.g. `pg_dump` for `/usr/bin/pg_dump`.
pub fn tool_name(program: &Path) -> String {
    program
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| program.to_string_lossy().to_string())
}

/// Starts `program` with stdout and stderr piped and stdin closed.
pub fn spawn_tool<I, S>(program: &Path, args: I) -> std::io::Result<Child>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
}

/// Forwards each line of `stream` to the log until it closes.
pub fn forward_lines<R>(tool: String, stream: R, level: LineLevel) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => match level {
                    LineLevel::Info => tracing::info!(tool = %tool, "{}", line),
                    LineLevel::Warn => tracing::warn!(tool = %tool, "{}", line),
                },
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!(tool = %tool, error = %e, "Stopped reading tool output");
                    break;
                }
            }
        }
    })
}

/// Cancellation token plus deadline shared by every wait on one tool run.
pub struct Supervisor {
    cancel: CancellationToken,
    deadline: Option<Pin<Box<Sleep>>>,
}

impl Supervisor {
    pub fn new(cancel: CancellationToken, timeout: Option<Duration>) -> Self {
        Self {
            cancel,
            deadline: timeout.map(|d| Box::pin(tokio::time::sleep(d))),
        }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Resolves once the token is cancelled or the deadline passes.
    pub async fn interrupted(&mut self) -> ToolExit {
        let Self { cancel, deadline } = self;
        let expired = async {
            match deadline.as_mut() {
                Some(sleep) => sleep.as_mut().await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => ToolExit::Cancelled,
            _ = expired => ToolExit::TimedOut,
        }
    }

    /// Waits for `child` to exit, killing it if interrupted first.
    pub async fn wait(&mut self, child: &mut Child) -> std::io::Result<ToolExit> {
        let outcome = tokio::select! {
            status = child.wait() => return Ok(ToolExit::Exited(status?)),
            outcome = self.interrupted() => outcome,
        };
        terminate(child).await;
        Ok(outcome)
    }
}

pub async fn terminate(child: &mut Child) {
    if let Err(e) = child.kill().await {
        tracing::warn!(error = %e, "Failed to kill tool process");
    }
}
