//! Sync scheduler: discovers new videos on subscribed channels.
//!
//! Runs on a fixed interval and on manual request. At most one run exists at
//! a time; a manual request while one is running is rejected with
//! [`SyncError::Busy`]. The latest run is kept in memory for observers and
//! persisted when it finishes so it survives restarts.

mod run;
mod types;

pub use types::{ChannelError, ChannelResult, SyncError, SyncRun, SyncStatus, SyncTrigger};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ConfigHandle;
use crate::job_store::{JobStore, StoreError, LAST_SYNC_KEY};
use crate::metadata::MetadataSource;
use crate::quota::QuotaState;

pub struct SyncScheduler {
    store: JobStore,
    metadata: Arc<dyn MetadataSource>,
    quota: Arc<QuotaState>,
    config: Arc<ConfigHandle>,
    running: Arc<AtomicBool>,
    current: RwLock<Option<SyncRun>>,
    shutdown: CancellationToken,
    manual: Mutex<Option<JoinHandle<()>>>,
}

/// Holds the single-run slot; released on drop, including when a run is
/// cancelled mid-way.
pub(crate) struct RunGuard {
    running: Arc<AtomicBool>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

impl SyncScheduler {
    pub fn new(
        store: JobStore,
        metadata: Arc<dyn MetadataSource>,
        quota: Arc<QuotaState>,
        config: Arc<ConfigHandle>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store,
            metadata,
            quota,
            config,
            running: Arc::new(AtomicBool::new(false)),
            current: RwLock::new(None),
            shutdown,
            manual: Mutex::new(None),
        }
    }

    /// Load the last persisted run so it is displayed after a restart.
    pub async fn restore(&self) -> Result<(), StoreError> {
        let last: Option<SyncRun> = self.store.load_state(LAST_SYNC_KEY).await?;
        if let Some(run) = last {
            *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(run);
        }
        Ok(())
    }

    /// The running run, or the last finished one.
    pub fn current(&self) -> Option<SyncRun> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn set_current(&self, run: &SyncRun) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(run.clone());
    }

    fn begin(&self) -> Result<RunGuard, SyncError> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| SyncError::Busy)?;
        Ok(RunGuard {
            running: Arc::clone(&self.running),
        })
    }

    /// Run one sync pass to completion.
    pub async fn run_once(&self, trigger: SyncTrigger) -> Result<SyncRun, SyncError> {
        let guard = self.begin()?;
        Ok(self.execute(trigger, guard).await)
    }

    /// Start a manual run in the background. Fails immediately with
    /// `Busy` if a run is in progress. The run stops at the next await point
    /// once shutdown begins.
    pub fn trigger_manual(self: &Arc<Self>) -> Result<(), SyncError> {
        let guard = self.begin()?;
        let scheduler = Arc::clone(self);
        let shutdown = self.shutdown.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = scheduler.execute(SyncTrigger::Manual, guard) => {}
                _ = shutdown.cancelled() => {
                    tracing::info!("manual sync interrupted by shutdown");
                }
            }
        });
        *self.manual.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        Ok(())
    }

    /// Wait for the last manual run started by [`Self::trigger_manual`].
    pub async fn join_manual(&self) {
        let handle = self
            .manual
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!("manual sync task: {e}");
            }
        }
    }

    /// Periodic loop: wait the startup delay, then run every
    /// `sync_interval_secs` while auto sync is enabled. Both settings are
    /// re-read each round.
    pub async fn run_loop(self: Arc<Self>, shutdown: CancellationToken) {
        tokio::select! {
            _ = tokio::time::sleep(self.config.current().sync_startup_delay()) => {}
            _ = shutdown.cancelled() => return,
        }

        loop {
            if self.config.current().auto_sync_enabled {
                tokio::select! {
                    result = self.run_once(SyncTrigger::Scheduled) => {
                        if let Err(SyncError::Busy) = result {
                            tracing::debug!("scheduled sync skipped, a run is in progress");
                        }
                    }
                    _ = shutdown.cancelled() => break,
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.current().sync_interval()) => {}
                _ = shutdown.cancelled() => break,
            }
        }
    }
}
