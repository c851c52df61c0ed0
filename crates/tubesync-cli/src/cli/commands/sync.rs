//! `tubesync sync` – trigger a sync run. Goes through the running server when
//! there is one; otherwise runs once in this process.

use anyhow::{bail, Result};
use std::io::ErrorKind;
use std::path::Path;
use tubesync_core::config::TubesyncConfig;
use tubesync_core::control::default_control_socket_path;
use tubesync_core::job_store::JobStore;
use tubesync_core::scheduler::{SyncStatus, SyncTrigger};

use super::build_engine;
use crate::cli::control_socket::{self, ControlCommand};

pub async fn run_sync(store: JobStore, cfg: TubesyncConfig) -> Result<()> {
    let socket = default_control_socket_path()?;
    if let Some(reply) = ask_server(&socket).await? {
        match reply.as_str() {
            "ok" => println!("Sync started on the running server"),
            "busy" => println!("A sync is already running"),
            other => bail!("server refused sync: {other}"),
        }
        return Ok(());
    }

    let engine = build_engine(store, cfg).await?;
    let run = engine.scheduler().run_once(SyncTrigger::Manual).await?;
    println!(
        "Scanned {}/{} channels, queued {} new videos",
        run.channels_scanned, run.channels_total, run.total_videos_found
    );
    for e in &run.channel_errors {
        println!("  {} ({}): {}", e.channel_name, e.channel_id, e.error);
    }
    if run.quota.is_some_and(|q| q.exceeded) {
        println!("Quota exhausted; remaining channels wait for the next run");
    }
    if run.status == SyncStatus::Failed {
        bail!(
            "sync failed: {}",
            run.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

/// Ask the running server to sync. `None` when nothing listens on `socket`,
/// including a socket file left behind by a server that did not exit cleanly.
async fn ask_server(socket: &Path) -> Result<Option<String>> {
    if !socket.exists() {
        return Ok(None);
    }
    match control_socket::send_command(socket, ControlCommand::Sync).await {
        Ok(reply) => Ok(Some(reply)),
        Err(e) if is_unreachable(&e) => {
            tracing::warn!(
                socket = %socket.display(),
                "control socket not answering, syncing in this process: {e:#}"
            );
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

fn is_unreachable(err: &anyhow::Error) -> bool {
    err.downcast_ref::<std::io::Error>().is_some_and(|e| {
        matches!(e.kind(), ErrorKind::ConnectionRefused | ErrorKind::NotFound)
    })
}
