//! Database restore: replays an SQL file through the replay tool.

use crate::config::AppConfig;
use crate::services::process::{self, LineLevel, Supervisor, ToolExit};
use anyhow::Context;
use std::ffi::OsString;
use std::path::Path;
use std::time::Duration;

const OUTPUT_DRAIN: Duration = Duration::from_secs(5);

pub fn replay_args(database_url: &str, sql_file: &Path) -> Vec<OsString> {
    vec![
        "-X".into(),
        "-v".into(),
        "ON_ERROR_STOP=1".into(),
        "-d".into(),
        database_url.into(),
        "-f".into(),
        sql_file.as_os_str().to_owned(),
    ]
}

/// Runs the replay tool against `sql_file`. Tool output goes to the log only.
pub async fn replay(
    config: &AppConfig,
    sql_file: &Path,
    mut supervisor: Supervisor,
) -> anyhow::Result<ToolExit> {
    let tool = process::tool_name(&config.psql_bin);
    let mut child =
        process::spawn_tool(&config.psql_bin, replay_args(&config.database_url, sql_file))
            .with_context(|| format!("Failed to start {}", config.psql_bin.display()))?;

    tracing::info!(tool = %tool, file = %sql_file.display(), "Restore started");

    let mut forwarders = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        forwarders.push(process::forward_lines(tool.clone(), stdout, LineLevel::Info));
    }
    if let Some(stderr) = child.stderr.take() {
        forwarders.push(process::forward_lines(tool.clone(), stderr, LineLevel::Warn));
    }

    let exit = supervisor.wait(&mut child).await?;

    for task in forwarders {
        let _ = tokio::time::timeout(OUTPUT_DRAIN, task).await;
    }

    if exit.success() {
        tracing::info!(tool = %tool, "Restore completed");
    } else {
        tracing::error!(tool = %tool, "Restore tool {}", exit);
    }

    Ok(exit)
}
