//! `tubesync status` – show job counts, the last sync run and quota state.

use anyhow::Result;
use tubesync_core::config::TubesyncConfig;
use tubesync_core::job_store::{JobStatus, JobStore};
use tubesync_core::scheduler::SyncRun;

use super::build_engine;

const RECENT_FAILURES: u32 = 5;

pub async fn run_status(store: JobStore, cfg: TubesyncConfig) -> Result<()> {
    let engine = build_engine(store, cfg).await?;
    let status = engine.status().await?;

    println!("{:<12} {}", "STATUS", "JOBS");
    for s in JobStatus::ALL {
        println!("{:<12} {}", s.as_str(), status.jobs.count(s));
    }
    println!("{:<12} {}", "total", status.jobs.total);
    println!();

    match &status.sync {
        Some(run) => print_sync(run),
        None => println!("No sync has run yet."),
    }

    if status.quota.exceeded {
        match status.quota.reset_at {
            Some(at) => println!("Quota exhausted; resets at {at} (unix)"),
            None => println!("Quota exhausted"),
        }
    }

    let failed = engine
        .list_jobs(Some(JobStatus::Failed), 1, RECENT_FAILURES)
        .await?;
    if !failed.jobs.is_empty() {
        println!();
        println!("{:<6} {:<14} {}", "ID", "VIDEO", "ERROR");
        for j in failed.jobs {
            println!(
                "{:<6} {:<14} {}",
                j.id,
                j.video_id,
                j.error_message.as_deref().unwrap_or("-")
            );
        }
    }
    Ok(())
}

fn print_sync(run: &SyncRun) {
    println!(
        "Last sync: {:?} ({:?}), {}/{} channels, {} new videos",
        run.status,
        run.trigger,
        run.channels_scanned,
        run.channels_total,
        run.total_videos_found
    );
    for e in &run.channel_errors {
        println!("  {} ({}): {}", e.channel_name, e.channel_id, e.error);
    }
    if let Some(err) = &run.error {
        println!("  error: {err}");
    }
}
