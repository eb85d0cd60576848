use crate::config::AppConfig;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio_util::sync::CancellationToken;

pub struct AppState {
    pub config: AppConfig,
    /// Root token; every tool invocation runs under a child of it.
    pub shutdown: CancellationToken,
    pub started_at: Instant,
    /// Archive names whose dump is still being written.
    pub active_archives: Arc<Mutex<HashSet<String>>>,
}

impl AppState {
    pub fn new(config: AppConfig, shutdown: CancellationToken) -> Self {
        Self {
            config,
            shutdown,
            started_at: Instant::now(),
            active_archives: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn request_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }
}
