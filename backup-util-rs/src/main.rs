use anyhow::Context;
use backup_util::services::backup_scheduler::BackupScheduler;
use backup_util::{create_router, utils, AppConfig, AppState};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to listen on (overrides PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Archive directory (overrides BACKUP_DIR)
    #[arg(short, long, value_name = "DIR")]
    backup_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration, command line wins over the environment
    let mut config = AppConfig::from_env()?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(dir) = args.backup_dir {
        config.backup_dir = dir;
    }
    if let Some(level) = args.log_level {
        config.log_level = level;
    }

    // Initialize logging
    utils::logger::init(&config.log_level)?;

    // Ensure archive and upload directories exist
    std::fs::create_dir_all(&config.backup_dir)
        .with_context(|| format!("Failed to create {}", config.backup_dir.display()))?;
    std::fs::create_dir_all(&config.upload_dir)
        .with_context(|| format!("Failed to create {}", config.upload_dir.display()))?;

    tracing::info!(
        "Starting backup-util v{} (archives in {})",
        env!("CARGO_PKG_VERSION"),
        config.backup_dir.display()
    );

    // Build application state
    let cancel = CancellationToken::new();
    let state = Arc::new(AppState::new(config.clone(), cancel.clone()));

    // Initialize cron scheduler
    let scheduler = match &config.backup_schedule {
        Some(cron) => Some(start_scheduler(state.clone(), cron).await?),
        None => None,
    };

    // Build router
    let app = create_router(state.clone());

    // Start HTTP server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to listen on {addr} (port already in use?)"))?;
    tracing::info!("Listening on {}", addr);

    // Graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await?;

    // Cleanup
    tracing::info!("Shutting down...");
    cancel.cancel();

    // Stop scheduler
    if let Some(s) = scheduler {
        if let Err(e) = s.shutdown().await {
            tracing::warn!("Scheduler shutdown error: {}", e);
        }
    }

    tracing::info!("Server stopped");
    Ok(())
}

async fn start_scheduler(state: Arc<AppState>, cron: &str) -> anyhow::Result<BackupScheduler> {
    let scheduler = BackupScheduler::new(state).await?;
    scheduler
        .schedule(cron)
        .await
        .with_context(|| format!("Invalid BACKUP_SCHEDULE: {cron}"))?;
    scheduler.start().await?;
    Ok(scheduler)
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to listen for ctrl+c");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to listen for SIGTERM")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }

    cancel.cancel();
}
