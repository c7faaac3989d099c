use crate::pipeline::Pipeline;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::info;

/// Register the pipeline on a cron schedule and start ticking.
///
/// Runs never overlap: a tick that fires mid-run waits for it, and ticks
/// beyond the one already waiting are skipped.
pub async fn start(pipeline: Arc<Pipeline>, cron: &str) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await.context("Failed to create scheduler")?;

    let job = Job::new_async(cron, move |_id, _scheduler| {
        let pipeline = pipeline.clone();
        Box::pin(async move {
            pipeline.run_scheduled().await;
        })
    })
    .with_context(|| format!("Invalid schedule '{}'", cron))?;

    scheduler.add(job).await.context("Failed to register job")?;
    scheduler.start().await.context("Failed to start scheduler")?;
    info!("⏰ Scheduled runs on '{}'", cron);
    Ok(scheduler)
}

/// Run once now, keep running on schedule until Ctrl-C
pub async fn run_forever(pipeline: Arc<Pipeline>, cron: &str) -> Result<()> {
    let mut scheduler = start(pipeline.clone(), cron).await?;

    pipeline.run_scheduled().await;

    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
    info!("Shutting down...");
    scheduler.shutdown().await.context("Failed to stop scheduler")?;
    Ok(())
}
