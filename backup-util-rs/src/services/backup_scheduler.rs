use crate::services::dump::DumpJob;
use crate::services::process::Supervisor;
use crate::state::AppState;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};

/// Runs archive-only dumps on a cron schedule.
pub struct BackupScheduler {
    scheduler: Mutex<JobScheduler>,
    state: Arc<AppState>,
    running: Arc<AtomicBool>,
}

impl BackupScheduler {
    pub async fn new(state: Arc<AppState>) -> anyhow::Result<Self> {
        let scheduler = JobScheduler::new().await?;
        Ok(Self {
            scheduler: Mutex::new(scheduler),
            state,
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    pub async fn schedule(&self, cron_expression: &str) -> anyhow::Result<()> {
        let state = self.state.clone();
        let running = self.running.clone();

        let job = Job::new_async(cron_expression, move |_uuid, _lock| {
            let state = state.clone();
            let running = running.clone();
            Box::pin(async move {
                run_exclusive(&running, &state).await;
            })
        })?;

        self.scheduler.lock().await.add(job).await?;
        tracing::info!(cron = %cron_expression, "Scheduled dump registered");
        Ok(())
    }

    pub async fn start(&self) -> anyhow::Result<()> {
        self.scheduler.lock().await.start().await?;
        Ok(())
    }

    pub async fn shutdown(&self) -> anyhow::Result<()> {
        self.scheduler.lock().await.shutdown().await?;
        Ok(())
    }
}

/// Clears the running flag when the run ends, including on panic.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Runs one scheduled dump unless another is still in progress.
///
/// Returns `false` when the run was skipped.
async fn run_exclusive(running: &AtomicBool, state: &AppState) -> bool {
    if running.swap(true, Ordering::SeqCst) {
        tracing::warn!("Skipping scheduled dump: previous run still in progress");
        return false;
    }
    let _guard = RunGuard(running);

    run_scheduled_dump(state).await;
    true
}

async fn run_scheduled_dump(state: &AppState) {
    let job = match DumpJob::start(state).await {
        Ok(job) => job,
        Err(e) => {
            tracing::error!("Scheduled dump failed to start: {e:#}");
            return;
        }
    };

    tracing::info!(archive = %job.filename(), "Starting scheduled dump");
    let supervisor = Supervisor::new(state.request_token(), state.config.tool_timeout);
    if let Err(e) = job.run(None, supervisor).await {
        tracing::error!("Scheduled dump failed: {e:#}");
    }
}
