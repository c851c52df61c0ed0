//! Shared harness for integration tests: a file-backed store in a temp dir,
//! a fast config and an engine wired to the fakes.

#![allow(dead_code)]

pub mod fakes;

use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use tubesync_core::config::TubesyncConfig;
use tubesync_core::events::EventBus;
use tubesync_core::job_store::{JobId, JobStatus, JobStore, NewVideoJob, VideoJob, VideoKind};
use tubesync_core::{Collaborators, Engine};

use fakes::{FakeFetcher, FakeMetadata, FakeTransport};

pub struct Harness {
    pub dir: TempDir,
    pub store: JobStore,
    pub config: TubesyncConfig,
}

impl Harness {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::open_at(dir.path().join("jobs.db"), EventBus::new(1024))
            .await
            .unwrap();
        let config = fast_config(&dir);
        Self { dir, store, config }
    }

    pub async fn engine(
        &self,
        fetcher: Arc<FakeFetcher>,
        metadata: Arc<FakeMetadata>,
        transport: Arc<FakeTransport>,
    ) -> Engine {
        Engine::new(
            self.store.clone(),
            self.config.clone(),
            Collaborators {
                fetcher,
                metadata,
                transport,
            },
        )
        .await
        .unwrap()
    }
}

/// Short polls, immediate retries, no automatic sync.
pub fn fast_config(dir: &TempDir) -> TubesyncConfig {
    let mut cfg = TubesyncConfig {
        download_dir: dir.path().join("downloads"),
        max_concurrent_downloads: 1,
        max_concurrent_shorts_downloads: 1,
        max_concurrent_uploads: 1,
        auto_sync_enabled: false,
        sync_startup_delay_secs: 3600,
        channel_scan_delay_ms: 0,
        ..TubesyncConfig::default()
    };
    cfg.retry.base_delay_secs = 0.0;
    cfg.workers.idle_poll_ms = 10;
    cfg.transport.enabled = true;
    cfg.transport.host = "nas.local".to_string();
    cfg
}

pub fn new_job(video_id: &str, kind: VideoKind) -> NewVideoJob {
    NewVideoJob {
        video_id: video_id.to_string(),
        channel_id: "UC1".to_string(),
        channel_name: "Channel One".to_string(),
        title: format!("Video {video_id}"),
        duration_secs: match kind {
            VideoKind::Short => Some(30),
            VideoKind::Regular => Some(600),
            VideoKind::Unclassified => None,
        },
        published_at: None,
        kind,
    }
}

pub async fn enqueue(store: &JobStore, video_id: &str, kind: VideoKind) -> JobId {
    store.create_if_absent(&new_job(video_id, kind)).await.unwrap();
    store.find_by_video_id(video_id).await.unwrap().unwrap().id
}

/// Poll until the job reaches `status`, failing after ten seconds.
pub async fn wait_for_status(store: &JobStore, id: JobId, status: JobStatus) -> VideoJob {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let job = store.get_job(id).await.unwrap();
        if job.status == status {
            return job;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {id} stuck in {} waiting for {status}",
            job.status
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub async fn count(store: &JobStore, status: JobStatus) -> u64 {
    store.stats().await.unwrap().count(status)
}
