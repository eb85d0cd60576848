use crate::error::AppError;
use crate::services::process::Supervisor;
use crate::services::restore::replay;
use crate::state::AppState;
use axum::extract::multipart::Field;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;

const RESTORE_OK: &str = "Restore completed successfully";
const RESTORE_FAILED: &str = "Restore failed";
const NO_FILE: &str = "No file uploaded";

fn is_file_field(field: &Field<'_>) -> bool {
    field.file_name().is_some() || field.name() == Some("file")
}

/// Streams the first file field into a temporary file in `upload_dir`.
///
/// The returned path deletes the file when dropped.
async fn receive_upload(
    upload_dir: PathBuf,
    multipart: &mut Multipart,
) -> Result<Option<TempPath>, AppError> {
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?
    {
        if !is_file_field(&field) {
            continue;
        }

        let original_name = field.file_name().unwrap_or("upload").to_string();
        let named = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new()
                .prefix("restore_")
                .suffix(".sql")
                .tempfile_in(upload_dir)
        })
        .await
        .map_err(|e| anyhow::anyhow!(e))?
        .map_err(|e| anyhow::anyhow!("Failed to create upload file: {}", e))?;

        let (file, path) = named.into_parts();
        let mut file = tokio::fs::File::from_std(file);

        let mut size = 0u64;
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?
        {
            file.write_all(&chunk)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to write upload: {}", e))?;
            size += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to flush upload: {}", e))?;

        tracing::info!(file = %original_name, size, "Received restore upload");
        return Ok(Some(path));
    }

    Ok(None)
}

async fn remove_upload(path: TempPath) {
    let shown = path.display().to_string();
    match tokio::task::spawn_blocking(move || path.close()).await {
        Ok(Ok(())) => tracing::debug!(path = %shown, "Removed restore upload"),
        Ok(Err(e)) => tracing::warn!(path = %shown, error = %e, "Failed to remove restore upload"),
        Err(e) => tracing::warn!(path = %shown, error = %e, "Upload cleanup task failed"),
    }
}

/// POST /api/restore - replay an uploaded SQL file into the database
pub async fn restore(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let Some(upload) = receive_upload(state.config.upload_dir.clone(), &mut multipart).await?
    else {
        return Ok((StatusCode::BAD_REQUEST, NO_FILE).into_response());
    };

    let supervisor = Supervisor::new(state.request_token(), state.config.tool_timeout);
    let result = replay(&state.config, &upload, supervisor).await;
    remove_upload(upload).await;

    match result {
        Ok(exit) if exit.success() => Ok((StatusCode::OK, RESTORE_OK).into_response()),
        Ok(_) => Ok((StatusCode::INTERNAL_SERVER_ERROR, RESTORE_FAILED).into_response()),
        Err(e) => {
            tracing::error!("Restore failed: {e:#}");
            Ok((StatusCode::INTERNAL_SERVER_ERROR, RESTORE_FAILED).into_response())
        }
    }
}
