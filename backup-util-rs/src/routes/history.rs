use crate::error::AppError;
use crate::models::archive::{self, ArchiveEntry};
use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use std::sync::Arc;

/// GET /api/history - list archives in the backup directory
pub async fn history(State(state): State<Arc<AppState>>) -> Result<Json<Vec<ArchiveEntry>>, AppError> {
    let dir = state.config.backup_dir.clone();
    let entries = tokio::task::spawn_blocking(move || archive::list_archives(&dir))
        .await
        .map_err(|e| anyhow::anyhow!(e))?
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to read backup directory");
            AppError::Storage("Failed to read backup history".into())
        })?;

    Ok(Json(entries))
}
