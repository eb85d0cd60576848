pub mod backup;
pub mod health;
pub mod history;
pub mod restore;

use crate::state::AppState;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/backup", get(backup::backup))
        .route(
            "/api/restore",
            post(restore::restore).layer(DefaultBodyLimit::disable()),
        )
        .route("/api/history", get(history::history))
        .route("/health", get(health::health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
