use crate::error::AppError;
use crate::services::dump::DumpJob;
use crate::services::process::Supervisor;
use crate::state::AppState;
use axum::body::Body;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use tokio_util::io::ReaderStream;

/// How far the archive may run ahead of a slow client.
const RESPONSE_BUFFER: usize = 256 * 1024;

/// GET /api/backup - stream a fresh dump and keep a copy as an archive
pub async fn backup(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    let job = DumpJob::start(&state).await?;
    let filename = job.filename().to_string();

    let (writer, reader) = tokio::io::duplex(RESPONSE_BUFFER);
    let supervisor = Supervisor::new(state.request_token(), state.config.tool_timeout);

    tokio::spawn(async move {
        if let Err(e) = job.run(Some(writer), supervisor).await {
            tracing::error!("Dump failed: {e:#}");
        }
    });

    let headers = [
        (header::CONTENT_TYPE, "application/sql".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        ),
    ];

    Ok((headers, Body::from_stream(ReaderStream::new(reader))).into_response())
}
