//! Database dump: runs the dump tool and tees its stdout into a new archive
//! and, when a client is attached, into the HTTP response.

use crate::models::archive;
use crate::services::process::{self, LineLevel, Supervisor, ToolExit};
use crate::services::retention;
use crate::services::tee::{SinkState, Tee};
use crate::state::AppState;
use anyhow::Context;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, DuplexStream};
use tokio::process::Child;

const READ_CHUNK: usize = 64 * 1024;
const STDERR_DRAIN: Duration = Duration::from_secs(5);
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Creates a fresh archive named after `at`, moving forward one millisecond
/// at a time while the name is taken. Existing archives are never truncated.
pub async fn create_archive(
    dir: &Path,
    at: chrono::DateTime<chrono::Utc>,
) -> anyhow::Result<(String, PathBuf, tokio::fs::File)> {
    let mut at = at;
    for _ in 0..MAX_NAME_ATTEMPTS {
        let (filename, path) = archive::archive_path(dir, at);
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => return Ok((filename, path, file)),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                at += chrono::Duration::milliseconds(1);
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to create archive {}", path.display()))
            }
        }
    }
    anyhow::bail!("No free archive name in {}", dir.display())
}

/// Marks an archive as in flight until dropped.
struct ArchiveLease {
    name: String,
    active: Arc<Mutex<HashSet<String>>>,
}

impl ArchiveLease {
    fn acquire(active: &Arc<Mutex<HashSet<String>>>, name: &str) -> Self {
        if let Ok(mut set) = active.lock() {
            set.insert(name.to_string());
        }
        Self {
            name: name.to_string(),
            active: active.clone(),
        }
    }
}

impl Drop for ArchiveLease {
    fn drop(&mut self) {
        if let Ok(mut set) = self.active.lock() {
            set.remove(&self.name);
        }
    }
}

#[derive(Debug)]
pub struct DumpReport {
    pub archive: String,
    pub bytes: u64,
    pub exit: ToolExit,
}

/// A dump whose archive file exists and whose tool is running.
pub struct DumpJob {
    filename: String,
    path: PathBuf,
    file: tokio::fs::File,
    child: Child,
    tool: String,
    backup_dir: PathBuf,
    retention: Option<usize>,
    lease: ArchiveLease,
}

impl DumpJob {
    /// Creates the archive file and starts the dump tool.
    pub async fn start(state: &AppState) -> anyhow::Result<Self> {
        let config = &state.config;
        let (filename, path, file) = create_archive(&config.backup_dir, chrono::Utc::now()).await?;
        let lease = ArchiveLease::acquire(&state.active_archives, &filename);

        let tool = process::tool_name(&config.pg_dump_bin);
        let child = process::spawn_tool(&config.pg_dump_bin, [&config.database_url])
            .with_context(|| format!("Failed to start {}", config.pg_dump_bin.display()))?;

        tracing::info!(archive = %filename, tool = %tool, "Dump started");

        Ok(Self {
            filename,
            path,
            file,
            child,
            tool,
            backup_dir: config.backup_dir.clone(),
            retention: config.archive_retention,
            lease,
        })
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Pumps the tool's stdout until it closes or the run is interrupted.
    ///
    /// `sink` receives the same bytes as the archive. If it closes early the
    /// run is cancelled and the tool killed.
    pub async fn run(
        mut self,
        sink: Option<DuplexStream>,
        mut supervisor: Supervisor,
    ) -> anyhow::Result<DumpReport> {
        let mut stdout = self
            .child
            .stdout
            .take()
            .context("Dump tool stdout was not captured")?;
        let stderr = self.child.stderr.take();
        let stderr_task =
            stderr.map(|s| process::forward_lines(self.tool.clone(), s, LineLevel::Warn));

        let has_sink = sink.is_some();
        let mut tee = Tee::new(self.file, sink);
        let mut buf = vec![0u8; READ_CHUNK];
        let mut interrupted = None;

        loop {
            let n = tokio::select! {
                read = stdout.read(&mut buf) => read.context("Failed to read dump output")?,
                outcome = supervisor.interrupted() => {
                    interrupted = Some(outcome);
                    break;
                }
            };
            if n == 0 {
                break;
            }

            // A client that stops reading must not hold off the deadline.
            let state = tokio::select! {
                written = tee.write(&buf[..n]) => written
                    .with_context(|| format!("Failed to write archive {}", self.path.display()))?,
                outcome = supervisor.interrupted() => {
                    interrupted = Some(outcome);
                    break;
                }
            };
            if has_sink && state == SinkState::Detached {
                tracing::warn!(archive = %self.filename, "Client disconnected, cancelling dump");
                supervisor.cancel_token().cancel();
            }
        }

        drop(stdout);

        let exit = match interrupted {
            Some(outcome) => {
                process::terminate(&mut self.child).await;
                outcome
            }
            None => supervisor.wait(&mut self.child).await?,
        };

        if let Some(task) = stderr_task {
            let _ = tokio::time::timeout(STDERR_DRAIN, task).await;
        }

        let bytes = tee.bytes_written();
        if exit.success() {
            tracing::info!(archive = %self.filename, bytes, "Dump completed");
        } else {
            tracing::error!(archive = %self.filename, bytes, "Dump tool {}", exit);
        }

        let active = self.lease.active.clone();
        drop(self.lease);

        if let Some(keep) = self.retention {
            let dir = self.backup_dir.clone();
            let in_flight = active.lock().map(|set| set.clone()).unwrap_or_default();
            match tokio::task::spawn_blocking(move || retention::prune_archives(&dir, keep, &in_flight))
                .await
            {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "Archive retention failed"),
                Err(e) => tracing::warn!(error = %e, "Archive retention task failed"),
            }
        }

        // The sink is closed last so a finished response implies a settled archive.
        tee.finish().await.context("Failed to flush archive")?;

        Ok(DumpReport {
            archive: self.filename,
            bytes,
            exit,
        })
    }
}
