//! `tubesync retry <id>` – put a failed job back in the download queue.

use anyhow::Result;
use tubesync_core::config::TubesyncConfig;
use tubesync_core::job_store::JobStore;

use super::build_engine;

pub async fn run_retry(store: JobStore, cfg: TubesyncConfig, id: i64) -> Result<()> {
    let engine = build_engine(store, cfg).await?;
    let job = engine.retry_job(id).await?;
    println!("Re-queued job {id}: {}", job.title);
    Ok(())
}
