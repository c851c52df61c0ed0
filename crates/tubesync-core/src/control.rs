//! Control surface: queries and commands consumed by the presentation layer.
//!
//! Every command is idempotent here: pausing an already paused pool or
//! resuming a running one succeeds without effect. The HTTP API and the
//! Unix control socket both go through these methods.

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::engine::Engine;
use crate::job_store::{JobId, JobPage, JobStats, JobStatus, StoreError, VideoJob};
use crate::pause::{PauseState, PauseTarget};
use crate::progress::Direction;
use crate::quota::QuotaStatus;
use crate::scheduler::{SyncError, SyncRun};
use crate::events::TransferProgress;
use crate::transport::{ConnectionCheck, Credentials};

/// Everything a dashboard shows at a glance.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub jobs: JobStats,
    pub pause: PauseState,
    pub quota: QuotaStatus,
    pub sync: Option<SyncRun>,
    pub sync_running: bool,
}

impl Engine {
    pub async fn stats(&self) -> Result<JobStats, StoreError> {
        self.ctx.store.stats().await
    }

    pub async fn status(&self) -> Result<StatusSnapshot, StoreError> {
        Ok(StatusSnapshot {
            jobs: self.ctx.store.stats().await?,
            pause: self.pause_state(),
            quota: self.quota_status(),
            sync: self.current_sync(),
            sync_running: self.scheduler.is_running(),
        })
    }

    pub async fn list_jobs(
        &self,
        status: Option<JobStatus>,
        page: u32,
        per_page: u32,
    ) -> Result<JobPage, StoreError> {
        self.ctx.store.list_jobs(status, page, per_page).await
    }

    pub async fn get_job(&self, id: JobId) -> Result<VideoJob, StoreError> {
        self.ctx.store.get_job(id).await
    }

    /// Retry a failed job with a fresh retry budget. A job whose upload
    /// failed and whose artifact is still on disk goes back to the upload
    /// queue; anything else is downloaded again.
    pub async fn retry_job(&self, id: JobId) -> Result<VideoJob, StoreError> {
        let current = self.ctx.store.get_job(id).await?;
        let job = if current.status == JobStatus::Failed && current.has_local_artifact().await {
            tracing::info!(job_id = id, video_id = %current.video_id, "retrying upload of kept artifact");
            self.ctx.store.retry_upload(id).await?
        } else {
            self.ctx.store.retry_job(id).await?
        };
        self.ctx.publish_stats().await;
        Ok(job)
    }

    /// Delete a job record; with `delete_files`, also its local artifact.
    /// Artifact removal is best effort.
    pub async fn remove_job(&self, id: JobId, delete_files: bool) -> Result<VideoJob, StoreError> {
        let job = self.ctx.store.remove_job(id).await?;
        if delete_files {
            if let Some(path) = job.file_path.as_deref() {
                remove_artifact(Path::new(path)).await;
            }
        }
        self.ctx.publish_stats().await;
        Ok(job)
    }

    /// The running sync, or the last finished one.
    pub fn current_sync(&self) -> Option<SyncRun> {
        self.scheduler.current()
    }

    /// Start a manual sync in the background.
    pub fn trigger_sync(&self) -> Result<(), SyncError> {
        self.scheduler.trigger_manual()
    }

    pub fn pause_state(&self) -> PauseState {
        self.ctx.pause.state()
    }

    pub fn set_paused(&self, target: PauseTarget, paused: bool) -> PauseState {
        if self.ctx.pause.set_paused(target, paused) {
            tracing::info!(%target, paused, "pause state changed");
        }
        self.ctx.pause.state()
    }

    pub fn quota_status(&self) -> QuotaStatus {
        self.quota.snapshot()
    }

    pub fn active_downloads(&self) -> Vec<TransferProgress> {
        self.ctx.transfers.snapshot(Direction::Download)
    }

    pub fn active_uploads(&self) -> Vec<TransferProgress> {
        self.ctx.transfers.snapshot(Direction::Upload)
    }

    /// Check the transport with `credentials`, or the configured ones.
    pub async fn test_transport(&self, credentials: Option<Credentials>) -> ConnectionCheck {
        let cfg = self.ctx.config.current();
        let credentials = credentials.unwrap_or_else(|| cfg.transport.credentials());
        let result = self
            .transport
            .test_connection(&credentials, &cfg.transport.path)
            .await;
        let check = ConnectionCheck::from_result(result);
        tracing::info!(success = check.success, "transport check: {}", check.message);
        check
    }
}

async fn remove_artifact(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::info!(path = %path.display(), "deleted artifact"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), "delete artifact: {e}"),
    }
}

/// Default path for the control socket (same XDG state dir as the DB).
pub fn default_control_socket_path() -> std::io::Result<PathBuf> {
    let dir = xdg::BaseDirectories::with_prefix("tubesync")?.get_state_home();
    Ok(dir.join("control.sock"))
}
