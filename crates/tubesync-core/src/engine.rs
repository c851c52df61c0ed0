//! Engine: wires the store, pools, scheduler and watchdog together and owns
//! their tasks.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::{ConfigChange, ConfigError, ConfigHandle, ConfigUpdate, TubesyncConfig};
use crate::events::EventBus;
use crate::fetch::Fetcher;
use crate::job_store::{JobStore, StoreError, QUOTA_KEY};
use crate::metadata::MetadataSource;
use crate::pause::PauseController;
use crate::quota::{QuotaState, QuotaStatus};
use crate::scheduler::SyncScheduler;
use crate::transport::Transport;
use crate::workers::{run_watchdog, DownloadPool, UploadPool, WorkerContext};

/// External collaborators the engine drives.
#[derive(Clone)]
pub struct Collaborators {
    pub fetcher: Arc<dyn Fetcher>,
    pub metadata: Arc<dyn MetadataSource>,
    pub transport: Arc<dyn Transport>,
}

pub struct Engine {
    pub(crate) ctx: WorkerContext,
    pub(crate) quota: Arc<QuotaState>,
    pub(crate) scheduler: Arc<SyncScheduler>,
    pub(crate) transport: Arc<dyn Transport>,
    downloads: Arc<DownloadPool>,
    uploads: Arc<UploadPool>,
    shutdown: CancellationToken,
    tasks: Mutex<JoinSet<()>>,
}

impl Engine {
    /// Build an engine over `store`, restoring quota and last-sync state.
    /// Pass a [`ConfigHandle::persisted`] handle to have settings changes
    /// written back to the config file.
    pub async fn new(
        store: JobStore,
        config: impl Into<ConfigHandle>,
        collaborators: Collaborators,
    ) -> Result<Self, StoreError> {
        let config = Arc::new(config.into());
        let pause = Arc::new(PauseController::new());
        let ctx = WorkerContext::new(store.clone(), pause, Arc::clone(&config));

        let quota: Option<QuotaStatus> = store.load_state(QUOTA_KEY).await?;
        let quota = Arc::new(quota.map(QuotaState::restore).unwrap_or_default());

        let shutdown = CancellationToken::new();
        let scheduler = Arc::new(SyncScheduler::new(
            store,
            collaborators.metadata,
            Arc::clone(&quota),
            config,
            shutdown.clone(),
        ));
        scheduler.restore().await?;

        Ok(Self {
            downloads: Arc::new(DownloadPool::new(ctx.clone(), collaborators.fetcher)),
            uploads: Arc::new(UploadPool::new(ctx.clone(), Arc::clone(&collaborators.transport))),
            transport: collaborators.transport,
            ctx,
            quota,
            scheduler,
            shutdown,
            tasks: Mutex::new(JoinSet::new()),
        })
    }

    pub fn store(&self) -> &JobStore {
        &self.ctx.store
    }

    pub fn events(&self) -> &EventBus {
        self.ctx.store.events()
    }

    /// Snapshot of the current settings.
    pub fn config(&self) -> Arc<TubesyncConfig> {
        self.ctx.config.current()
    }

    /// Apply a partial settings change. Most settings apply to the next job
    /// or sync run; `restart_required` reports the ones that do not.
    pub fn update_config(&self, update: ConfigUpdate) -> Result<ConfigChange, ConfigError> {
        match self.ctx.config.update(update) {
            Ok(change) => {
                tracing::info!(restart_required = change.restart_required, "settings updated");
                Ok(change)
            }
            Err(e) => {
                tracing::warn!("settings update rejected: {e}");
                Err(e)
            }
        }
    }

    pub fn scheduler(&self) -> &Arc<SyncScheduler> {
        &self.scheduler
    }

    /// Recover leases left by a previous process, then spawn every pool, the
    /// scheduler loop and the lease watchdog.
    pub async fn start(&self) -> Result<(), StoreError> {
        let recovered = self.ctx.store.recover_leases().await?;
        if recovered > 0 {
            tracing::info!(recovered, "recovered jobs interrupted by a previous run");
        }

        let cfg = self.ctx.config.current();
        let mut tasks = self.tasks.lock().await;
        self.downloads.spawn(&mut tasks, &self.shutdown);
        if cfg.transport.enabled {
            self.uploads.spawn(&mut tasks, &self.shutdown);
        } else {
            tracing::info!("transport disabled, upload pool not started");
        }
        tasks.spawn(Arc::clone(&self.scheduler).run_loop(self.shutdown.clone()));
        tasks.spawn(run_watchdog(
            self.ctx.store.clone(),
            self.ctx.live.clone(),
            Duration::from_secs(cfg.workers.watchdog_interval_secs),
            self.shutdown.clone(),
        ));

        tracing::info!(
            downloads = cfg.max_concurrent_downloads,
            shorts = cfg.max_concurrent_shorts_downloads,
            uploads = if cfg.transport.enabled { cfg.max_concurrent_uploads } else { 0 },
            "engine started"
        );
        Ok(())
    }

    /// Token cancelled when shutdown begins.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stop claiming and syncing, wait up to `grace` for running jobs, abort
    /// the rest and revert any lease still held.
    pub async fn shutdown(&self, grace: Duration) {
        self.shutdown.cancel();
        let mut tasks = std::mem::take(&mut *self.tasks.lock().await);

        let drained = tokio::time::timeout(grace, async {
            self.scheduler.join_manual().await;
            while tasks.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            tracing::warn!(remaining = tasks.len(), "grace period elapsed, aborting workers");
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }

        match self.abandon_leased().await {
            Ok(0) => {}
            Ok(n) => tracing::info!(abandoned = n, "reverted in-flight jobs on shutdown"),
            Err(e) => tracing::warn!("revert leases on shutdown: {e}"),
        }
        tracing::info!("engine stopped");
    }

    async fn abandon_leased(&self) -> Result<usize, StoreError> {
        let mut abandoned = 0;
        for job in self.ctx.store.leased_jobs().await? {
            match self.ctx.store.abandon(job.id).await {
                Ok(_) => abandoned += 1,
                Err(e) if e.is_conflict() => {}
                Err(e) => return Err(e),
            }
        }
        Ok(abandoned)
    }
}
