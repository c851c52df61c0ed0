//! `tubesync remove <id>` – remove a job; optionally delete its local
//! artifact with --delete-files.

use anyhow::Result;
use tubesync_core::config::TubesyncConfig;
use tubesync_core::job_store::JobStore;

use super::build_engine;

pub async fn run_remove(
    store: JobStore,
    cfg: TubesyncConfig,
    id: i64,
    delete_files: bool,
) -> Result<()> {
    let engine = build_engine(store, cfg).await?;
    let job = engine.remove_job(id, delete_files).await?;
    match (delete_files, job.file_path.as_deref()) {
        (true, Some(path)) => println!("Removed job {id} and {path}"),
        _ => println!("Removed job {id}"),
    }
    Ok(())
}
