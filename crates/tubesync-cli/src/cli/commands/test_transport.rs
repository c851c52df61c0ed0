//! `tubesync test-transport` – check the configured share.

use anyhow::{bail, Result};
use tubesync_core::config::TubesyncConfig;
use tubesync_core::job_store::JobStore;

use super::build_engine;

pub async fn run_test_transport(store: JobStore, cfg: TubesyncConfig) -> Result<()> {
    let engine = build_engine(store, cfg).await?;
    let check = engine.test_transport(None).await;
    println!("{}", check.message);
    if !check.success {
        bail!("transport check failed");
    }
    Ok(())
}
