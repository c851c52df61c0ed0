//! Download pools: regular videos and shorts, plus the duration classifier.

use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::fetch::{FetchError, FetchRequest, Fetcher};
use crate::job_store::{
    unix_timestamp, JobStatus, JobUpdate, KindFilter, StoreError, VideoJob, VideoKind,
};
use crate::pause::PauseTarget;
use crate::progress::{Direction, ProgressReporter};
use crate::retry::{classify_fetch_error, plan_failure};

use super::{worker_loop, WorkerContext};

/// Both download pools share one fetcher; each worker claims only its kind.
pub struct DownloadPool {
    ctx: WorkerContext,
    fetcher: Arc<dyn Fetcher>,
}

impl DownloadPool {
    pub fn new(ctx: WorkerContext, fetcher: Arc<dyn Fetcher>) -> Self {
        Self { ctx, fetcher }
    }

    /// Spawn `max_concurrent_downloads` regular workers,
    /// `max_concurrent_shorts_downloads` shorts workers and one classifier.
    pub fn spawn(self: &Arc<Self>, tasks: &mut JoinSet<()>, shutdown: &CancellationToken) {
        let cfg = self.ctx.config.current();
        let slots = (0..cfg.max_concurrent_downloads)
            .map(|i| (format!("download-{i}"), VideoKind::Regular))
            .chain(
                (0..cfg.max_concurrent_shorts_downloads)
                    .map(|i| (format!("shorts-{i}"), VideoKind::Short)),
            );

        for (name, kind) in slots {
            let pool = Arc::clone(self);
            let worker = name.clone();
            tasks.spawn(worker_loop(
                self.ctx.clone(),
                name,
                PauseTarget::Downloads,
                shutdown.clone(),
                move || {
                    let pool = Arc::clone(&pool);
                    let worker = worker.clone();
                    async move { pool.process_next(&worker, kind).await }
                },
            ));
        }

        let pool = Arc::clone(self);
        let shutdown = shutdown.clone();
        tasks.spawn(async move { pool.classifier_loop(shutdown).await });
    }

    /// Claim and run at most one pending job of `kind`. Returns whether a job
    /// was run.
    pub async fn process_next(&self, worker: &str, kind: VideoKind) -> Result<bool, StoreError> {
        let Some(job) = self
            .ctx
            .store
            .claim_next(JobStatus::Pending, 1, KindFilter::Only(kind), worker)
            .await?
            .pop()
        else {
            return Ok(false);
        };

        // a pause that landed between the loop's check and the claim
        if self.ctx.pause.is_paused(PauseTarget::Downloads) {
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
            .transition(job.id, JobStatus::Pending, JobStatus::Downloading, JobUpdate::default())
            .await?;
        tracing::info!(job_id = job.id, video_id = %job.video_id, worker, "download started");

        let request = FetchRequest {
            video_id: job.video_id.clone(),
            title: job.title.clone(),
            target_dir: cfg.download_dir.clone(),
            quality: cfg.video_quality,
        };
        let outcome = {
            let reporter = ProgressReporter::new(
                Direction::Download,
                &job,
                worker,
                store.events().clone(),
                self.ctx.transfers.clone(),
            );
            self.fetcher.fetch(&request, &reporter).await
        };

        match outcome {
            Ok(video) => {
                let mut update = JobUpdate::default()
                    .with_artifact(video.path.to_string_lossy(), video.size as i64)
                    .clear_error()
                    .with_retry(0, 0);
                if let Some(secs) = video.duration_secs {
                    update = update.with_duration(secs as i64);
                }
                store
                    .transition(job.id, JobStatus::Downloading, JobStatus::Downloaded, update)
                    .await?;
                tracing::info!(
                    job_id = job.id,
                    size = video.size,
                    path = %video.path.display(),
                    "download finished"
                );
            }
            Err(err) => {
                let kind = classify_fetch_error(&err);
                let plan = plan_failure(
                    &self.ctx.retry,
                    &job,
                    JobStatus::Pending,
                    kind,
                    &err.to_string(),
                    unix_timestamp(),
                );
                tracing::warn!(
                    job_id = job.id,
                    video_id = %job.video_id,
                    attempt = job.retry_count + 1,
                    next = %plan.to,
                    "download failed: {err}"
                );
                store
                    .transition(job.id, JobStatus::Downloading, plan.to, plan.update)
                    .await?;
            }
        }
        Ok(())
    }

    /// Probe durations of unclassified pending jobs and assign them a pool.
    /// Returns how many jobs were handled.
    pub async fn classify_pending(&self) -> Result<usize, StoreError> {
        let store = &self.ctx.store;
        let threshold = self.ctx.config.current().shorts_max_duration_secs;
        let jobs = store.unclassified_jobs(16).await?;
        let mut handled = 0;

        for job in jobs {
            match self.fetcher.probe_duration(&job.video_id).await {
                Ok(duration) => {
                    let kind = match VideoKind::classify(duration, threshold) {
                        VideoKind::Unclassified => VideoKind::Regular,
                        kind => kind,
                    };
                    if store.classify(job.id, kind, duration).await? {
                        tracing::debug!(job_id = job.id, ?duration, kind = kind.as_str(), "classified");
                        handled += 1;
                    }
                }
                Err(FetchError::LiveInProgress) => {
                    store
                        .transition(
                            job.id,
                            JobStatus::Pending,
                            JobStatus::Skipped,
                            JobUpdate::default().with_error(FetchError::LiveInProgress.to_string()),
                        )
                        .await?;
                    handled += 1;
                }
                Err(FetchError::Unavailable(reason)) => {
                    store
                        .transition(
                            job.id,
                            JobStatus::Pending,
                            JobStatus::Failed,
                            JobUpdate::default()
                                .with_error(FetchError::Unavailable(reason).to_string()),
                        )
                        .await?;
                    handled += 1;
                }
                Err(err) => {
                    // the download itself retries transient failures
                    tracing::debug!(job_id = job.id, "duration probe failed, queueing as regular: {err}");
                    if store.classify(job.id, VideoKind::Regular, None).await? {
                        handled += 1;
                    }
                }
            }
        }
        Ok(handled)
    }

    async fn classifier_loop(&self, shutdown: CancellationToken) {
        let idle = self.ctx.config.current().workers.idle_poll();
        loop {
            let handled = tokio::select! {
                res = self.classify_pending() => res,
                _ = shutdown.cancelled() => break,
            };
            match handled {
                Ok(n) if n > 0 => continue,
                Ok(_) => {}
                Err(e) => tracing::warn!("classifier: job store error: {e}"),
            }
            tokio::select! {
                _ = tokio::time::sleep(idle) => {}
                _ = shutdown.cancelled() => break,
            }
        }
    }
}
