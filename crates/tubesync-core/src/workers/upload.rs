//! Upload pool: copies downloaded artifacts to the remote share.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::job_store::{unix_timestamp, JobStatus, JobUpdate, KindFilter, StoreError, VideoJob};
use crate::naming::{remote_destination, remote_file_name};
use crate::pause::PauseTarget;
use crate::progress::{Direction, ProgressReporter};
use crate::retry::{classify_transport_error, plan_failure};
use crate::transport::Transport;

use super::{worker_loop, WorkerContext};

pub struct UploadPool {
    ctx: WorkerContext,
    transport: Arc<dyn Transport>,
}

impl UploadPool {
    pub fn new(ctx: WorkerContext, transport: Arc<dyn Transport>) -> Self {
        Self { ctx, transport }
    }

    /// Spawn `max_concurrent_uploads` workers.
    pub fn spawn(self: &Arc<Self>, tasks: &mut JoinSet<()>, shutdown: &CancellationToken) {
        for i in 0..self.ctx.config.current().max_concurrent_uploads {
            let name = format!("upload-{i}");
            let pool = Arc::clone(self);
            let worker = name.clone();
            tasks.spawn(worker_loop(
                self.ctx.clone(),
                name,
                PauseTarget::Uploads,
                shutdown.clone(),
                move || {
                    let pool = Arc::clone(&pool);
                    let worker = worker.clone();
                    async move { pool.process_next(&worker).await }
                },
            ));
        }
    }

    /// Claim and run at most one downloaded job. Returns whether a job was run.
    pub async fn process_next(&self, worker: &str) -> Result<bool, StoreError> {
        let Some(job) = self
            .ctx
            .store
            .claim_next(JobStatus::Downloaded, 1, KindFilter::Any, worker)
            .await?
            .pop()
        else {
            return Ok(false);
        };

        if self.ctx.pause.is_paused(PauseTarget::Uploads) {
            self.ctx.store.release(job.id).await?;
            return Ok(false);
        }

        let job_id = job.id;
        if let Err(e) = self.run_job(worker, job).await {
            self.ctx.abandon_after_error(job_id, worker, &e).await;
            return Err(e);
        }
        self.ctx.publish_stats().await;
        Ok(true)
    }

    async fn run_job(&self, worker: &str, job: VideoJob) -> Result<(), StoreError> {
        let store = &self.ctx.store;
        let cfg = self.ctx.config.current();
        let job = store
            .transition(job.id, JobStatus::Downloaded, JobStatus::Uploading, JobUpdate::default())
            .await?;

        let recorded = job.file_path.as_deref().map(PathBuf::from);
        let exists = match &recorded {
            Some(path) => tokio::fs::metadata(path).await.is_ok(),
            None => false,
        };
        let local = match recorded {
            Some(path) if exists => path,
            other => {
                let message = match other {
                    Some(path) => format!("local file not found: {}", path.display()),
                    None => "no local file recorded".to_string(),
                };
                tracing::warn!(job_id = job.id, "cannot upload: {message}");
                store
                    .transition(
                        job.id,
                        JobStatus::Uploading,
                        JobStatus::Failed,
                        JobUpdate::default().with_error(message),
                    )
                    .await?;
                return Ok(());
            }
        };

        let directory = cfg.transport.directory_for(job.is_short());
        let remote = remote_destination(
            directory,
            &remote_file_name(&job.video_id, &job.title, &local),
        );
        let credentials = cfg.transport.credentials();
        tracing::info!(job_id = job.id, worker, remote = %remote, "upload started");

        let outcome = {
            let reporter = ProgressReporter::new(
                Direction::Upload,
                &job,
                worker,
                store.events().clone(),
                self.ctx.transfers.clone(),
            );
            self.transport
                .upload(&local, &remote, &credentials, &reporter)
                .await
        };

        match outcome {
            Ok(()) => {
                let job = store
                    .transition(
                        job.id,
                        JobStatus::Uploading,
                        JobStatus::Uploaded,
                        JobUpdate::default().with_remote_path(remote).clear_error(),
                    )
                    .await?;
                tracing::info!(job_id = job.id, "upload finished");
                if cfg.delete_after_upload {
                    self.delete_local(&job, &local).await;
                }
            }
            Err(err) => {
                let kind = classify_transport_error(&err);
                let plan = plan_failure(
                    &self.ctx.retry,
                    &job,
                    JobStatus::Downloaded,
                    kind,
                    &err.to_string(),
                    unix_timestamp(),
                );
                tracing::warn!(
                    job_id = job.id,
                    attempt = job.retry_count + 1,
                    next = %plan.to,
                    "upload failed: {err}"
                );
                store
                    .transition(job.id, JobStatus::Uploading, plan.to, plan.update)
                    .await?;
            }
        }
        Ok(())
    }

    /// Runs only after `Uploaded` is durable. A failure here is logged and
    /// the job stays `Uploaded`.
    async fn delete_local(&self, job: &VideoJob, path: &Path) {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                tracing::info!(job_id = job.id, path = %path.display(), "deleted local artifact");
                if let Err(e) = self.ctx.store.forget_artifact(job.id).await {
                    tracing::warn!(job_id = job.id, "clear artifact path: {e}");
                }
            }
            Err(e) => {
                tracing::warn!(
                    job_id = job.id,
                    path = %path.display(),
                    "delete local artifact after upload: {e}"
                );
            }
        }
    }
}
