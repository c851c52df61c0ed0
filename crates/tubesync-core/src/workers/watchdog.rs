//! Orphaned-lease watchdog.
//!
//! A lease is orphaned when its owner is no longer a live worker (the task
//! panicked or was aborted), or when a job sat leased in a non-transfer status
//! long past the moment a claim turns into a transfer.

use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::job_store::{unix_timestamp, JobStore, StoreError};

use super::LiveWorkers;

/// A claimed job moves to its in-flight status right away; anything leased
/// but idle for longer than this is stale.
const STALE_CLAIM_SECS: i64 = 300;

/// Abandon orphaned leases. Returns how many jobs were reverted.
pub async fn reap_orphans(store: &JobStore, live: &LiveWorkers) -> Result<usize, StoreError> {
    let now = unix_timestamp();
    let mut reaped = 0;
    for job in store.leased_jobs().await? {
        let owner = job.lease_owner.as_deref().unwrap_or_default();
        let dead_owner = !live.is_alive(owner);
        let stale_claim =
            !job.status.is_in_flight() && now - job.updated_at > STALE_CLAIM_SECS;
        if !dead_owner && !stale_claim {
            continue;
        }
        match store.abandon(job.id).await {
            Ok(after) => {
                tracing::warn!(
                    job_id = job.id,
                    owner,
                    from = %job.status,
                    to = %after.status,
                    "reclaimed orphaned lease"
                );
                reaped += 1;
            }
            Err(e) if e.is_conflict() => {}
            Err(e) => return Err(e),
        }
    }
    Ok(reaped)
}

/// Run [`reap_orphans`] every `interval` until shutdown.
pub async fn run_watchdog(
    store: JobStore,
    live: LiveWorkers,
    interval: Duration,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.cancelled() => break,
        }
        if let Err(e) = reap_orphans(&store, &live).await {
            tracing::warn!("lease watchdog: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job_store::{
        open_memory, JobId, JobStatus, JobUpdate, KindFilter, NewVideoJob, VideoKind,
    };

    async fn leased_job(store: &JobStore, video_id: &str, owner: &str) -> JobId {
        let job = NewVideoJob {
            video_id: video_id.to_string(),
            channel_id: "UC1".to_string(),
            channel_name: "Channel One".to_string(),
            title: format!("Video {video_id}"),
            duration_secs: Some(600),
            published_at: None,
            kind: VideoKind::Regular,
        };
        store.create_if_absent(&job).await.unwrap();
        store
            .claim_next(JobStatus::Pending, 1, KindFilter::Any, owner)
            .await
            .unwrap()
            .pop()
            .unwrap()
            .id
    }

    async fn backdate(store: &JobStore, id: JobId, secs: i64) {
        sqlx::query("UPDATE jobs SET updated_at = updated_at - ?1 WHERE id = ?2")
            .bind(secs)
            .bind(id)
            .execute(&store.pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn lease_of_dead_worker_is_reverted() {
        let store = open_memory().await.unwrap();
        let id = leased_job(&store, "v1", "download-9").await;
        store
            .transition(id, JobStatus::Pending, JobStatus::Downloading, JobUpdate::default())
            .await
            .unwrap();

        let live = LiveWorkers::new();
        assert_eq!(reap_orphans(&store, &live).await.unwrap(), 1);
        let job = store.get_job(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.lease_owner.is_none());
    }

    #[tokio::test]
    async fn live_worker_keeps_its_lease() {
        let store = open_memory().await.unwrap();
        let live = LiveWorkers::new();
        let _worker = live.register("download-0");
        let id = leased_job(&store, "v1", "download-0").await;
        store
            .transition(id, JobStatus::Pending, JobStatus::Downloading, JobUpdate::default())
            .await
            .unwrap();
        // a long transfer is not stale
        backdate(&store, id, STALE_CLAIM_SECS * 10).await;

        assert_eq!(reap_orphans(&store, &live).await.unwrap(), 0);
        let job = store.get_job(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Downloading);
        assert_eq!(job.lease_owner.as_deref(), Some("download-0"));
    }

    #[tokio::test]
    async fn claim_that_never_started_is_released_when_stale() {
        let store = open_memory().await.unwrap();
        let live = LiveWorkers::new();
        let _worker = live.register("download-0");
        let id = leased_job(&store, "v1", "download-0").await;

        assert_eq!(reap_orphans(&store, &live).await.unwrap(), 0);

        backdate(&store, id, STALE_CLAIM_SECS + 1).await;
        assert_eq!(reap_orphans(&store, &live).await.unwrap(), 1);
        let job = store.get_job(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.lease_owner.is_none());
    }
}
