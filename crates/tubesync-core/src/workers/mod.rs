//! Long-lived worker loops over the job store.
//!
//! Every worker runs the same loop: wait while its pool is paused, claim one
//! job, run it to a durable status, repeat; sleep `idle_poll` when nothing is
//! claimable. Shutdown is observed between jobs only, so a running transfer is
//! never cut short by the loop itself.

mod download;
mod registry;
mod upload;
mod watchdog;

pub use download::DownloadPool;
pub use registry::{LiveWorkers, WorkerRegistration};
pub use upload::UploadPool;
pub use watchdog::{reap_orphans, run_watchdog};

use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::ConfigHandle;
use crate::job_store::{JobId, JobStore, StoreError};
use crate::pause::{PauseController, PauseTarget};
use crate::progress::ActiveTransfers;
use crate::retry::RetryPolicy;

/// State shared by every worker of every pool.
#[derive(Clone)]
pub struct WorkerContext {
    pub store: JobStore,
    pub pause: Arc<PauseController>,
    /// Read per job, so settings changes apply to the next claim.
    pub config: Arc<ConfigHandle>,
    pub retry: RetryPolicy,
    pub transfers: ActiveTransfers,
    pub live: LiveWorkers,
}

impl WorkerContext {
    pub fn new(store: JobStore, pause: Arc<PauseController>, config: Arc<ConfigHandle>) -> Self {
        let retry = config.current().retry.policy();
        Self {
            store,
            pause,
            config,
            retry,
            transfers: ActiveTransfers::new(),
            live: LiveWorkers::new(),
        }
    }

    /// Publish fresh aggregate counts. Failures are logged; observers can
    /// always pull stats.
    pub(crate) async fn publish_stats(&self) {
        if let Err(e) = self.store.publish_stats().await {
            tracing::debug!("stats for event: {e}");
        }
    }

    /// Best-effort cleanup when a job run failed on the store side: revert
    /// the job so another attempt can claim it.
    pub(crate) async fn abandon_after_error(&self, job_id: JobId, worker: &str, err: &StoreError) {
        tracing::warn!(job_id, worker, "job run interrupted by store error: {err}");
        if let Err(e) = self.store.abandon(job_id).await {
            tracing::warn!(job_id, worker, "abandon after store error: {e}");
        }
    }
}

/// Drive one worker until `shutdown` is cancelled. `step` claims and runs at
/// most one job and reports whether it did.
pub(crate) async fn worker_loop<F, Fut>(
    ctx: WorkerContext,
    name: String,
    target: PauseTarget,
    shutdown: CancellationToken,
    mut step: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, StoreError>>,
{
    let _registration = ctx.live.register(&name);
    let idle = ctx.config.current().workers.idle_poll();
    tracing::debug!(worker = %name, "worker started");

    loop {
        if shutdown.is_cancelled() {
            break;
        }
        if ctx.pause.is_paused(target) {
            tokio::select! {
                _ = ctx.pause.wait_until_resumed(target) => continue,
                _ = shutdown.cancelled() => break,
            }
        }

        match step().await {
            Ok(true) => continue,
            Ok(false) => {}
            Err(e) => tracing::warn!(worker = %name, "job store error, retrying next poll: {e}"),
        }

        tokio::select! {
            _ = tokio::time::sleep(idle) => {}
            _ = shutdown.cancelled() => break,
        }
    }

    tracing::debug!(worker = %name, "worker stopped");
}
