//! Integration test: operator commands on the engine's control surface.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::fakes::{FakeFetcher, FakeMetadata, FakeTransport, FetchBehavior, UploadBehavior};
use common::{enqueue, wait_for_status, Harness};
use tubesync_core::job_store::{JobStatus, JobUpdate, KindFilter, StoreError, VideoKind};
use tubesync_core::pause::PauseTarget;
use tubesync_core::transport::Credentials;
use tubesync_core::Engine;

async fn engine(h: &Harness, upload: UploadBehavior) -> Engine {
    h.engine(
        Arc::new(FakeFetcher::new(FetchBehavior::Succeed)),
        Arc::new(FakeMetadata::new()),
        Arc::new(FakeTransport::new(upload)),
    )
    .await
}

#[tokio::test]
async fn retry_moves_failed_job_back_to_pending() {
    let h = Harness::new().await;
    let engine = engine(&h, UploadBehavior::Succeed).await;
    let id = enqueue(&h.store, "v1", VideoKind::Regular).await;
    h.store
        .transition(
            id,
            JobStatus::Pending,
            JobStatus::Failed,
            JobUpdate::default().with_error("gone").with_retry(3, 0),
        )
        .await
        .unwrap();

    let job = engine.retry_job(id).await.unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.retry_count, 0);
    assert!(job.error_message.is_none());

    // only failed jobs can be retried
    let err = engine.retry_job(id).await.unwrap_err();
    assert!(matches!(err, StoreError::Conflict { .. } | StoreError::InvalidTransition { .. }));
}

#[tokio::test]
async fn retry_after_upload_failure_reuses_the_artifact() {
    let h = Harness::new().await;
    let fetcher = Arc::new(FakeFetcher::new(FetchBehavior::Succeed));
    let failing = h
        .engine(
            fetcher.clone(),
            Arc::new(FakeMetadata::new()),
            Arc::new(FakeTransport::new(UploadBehavior::FailAuth)),
        )
        .await;
    let id = enqueue(&h.store, "up1", VideoKind::Regular).await;
    failing.start().await.unwrap();
    wait_for_status(&h.store, id, JobStatus::Failed).await;
    failing.shutdown(Duration::from_secs(5)).await;

    let job = failing.retry_job(id).await.unwrap();
    assert_eq!(job.status, JobStatus::Downloaded);
    assert_eq!(job.retry_count, 0);
    assert!(job.error_message.is_none());
    assert!(job.has_local_artifact().await);

    let transport = Arc::new(FakeTransport::new(UploadBehavior::Succeed));
    let working = h
        .engine(fetcher.clone(), Arc::new(FakeMetadata::new()), transport.clone())
        .await;
    working.start().await.unwrap();
    wait_for_status(&h.store, id, JobStatus::Uploaded).await;
    working.shutdown(Duration::from_secs(5)).await;

    assert_eq!(fetcher.calls(), 1);
    assert_eq!(transport.uploads().len(), 1);
}

#[tokio::test]
async fn retry_downloads_again_when_the_artifact_is_gone() {
    let h = Harness::new().await;
    let engine = engine(&h, UploadBehavior::Succeed).await;
    let id = enqueue(&h.store, "up2", VideoKind::Regular).await;
    let missing = h.dir.path().join("up2.mp4");
    for (from, to, update) in [
        (JobStatus::Pending, JobStatus::Downloading, JobUpdate::default()),
        (
            JobStatus::Downloading,
            JobStatus::Downloaded,
            JobUpdate::default().with_artifact(missing.to_string_lossy(), 4),
        ),
        (JobStatus::Downloaded, JobStatus::Uploading, JobUpdate::default()),
        (
            JobStatus::Uploading,
            JobStatus::Failed,
            JobUpdate::default().with_error("authentication failed"),
        ),
    ] {
        h.store.transition(id, from, to, update).await.unwrap();
    }

    let job = engine.retry_job(id).await.unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert!(job.file_path.is_none());
}

#[tokio::test]
async fn remove_with_files_deletes_the_artifact() {
    let h = Harness::new().await;
    let engine = engine(&h, UploadBehavior::Succeed).await;
    let id = enqueue(&h.store, "v2", VideoKind::Regular).await;
    let artifact = h.dir.path().join("v2.mp4");
    std::fs::write(&artifact, b"data").unwrap();
    h.store
        .transition(id, JobStatus::Pending, JobStatus::Downloading, JobUpdate::default())
        .await
        .unwrap();
    h.store
        .transition(
            id,
            JobStatus::Downloading,
            JobStatus::Downloaded,
            JobUpdate::default().with_artifact(artifact.to_string_lossy(), 4),
        )
        .await
        .unwrap();

    let removed = engine.remove_job(id, true).await.unwrap();
    assert_eq!(removed.video_id, "v2");
    assert!(!artifact.exists());
    assert!(matches!(engine.get_job(id).await, Err(StoreError::NotFound(_))));
}

#[tokio::test]
async fn leased_jobs_cannot_be_removed() {
    let h = Harness::new().await;
    let engine = engine(&h, UploadBehavior::Succeed).await;
    let id = enqueue(&h.store, "v3", VideoKind::Regular).await;
    h.store
        .claim_next(JobStatus::Pending, 1, KindFilter::Any, "download-0")
        .await
        .unwrap();

    let err = engine.remove_job(id, false).await.unwrap_err();
    assert!(matches!(err, StoreError::Leased { .. }));
}

#[tokio::test]
async fn status_snapshot_reflects_pause_and_counts() {
    let h = Harness::new().await;
    let engine = engine(&h, UploadBehavior::Succeed).await;
    enqueue(&h.store, "a", VideoKind::Regular).await;
    enqueue(&h.store, "b", VideoKind::Short).await;

    let state = engine.set_paused(PauseTarget::Uploads, true);
    assert!(state.uploads_paused && !state.downloads_paused);

    let status = engine.status().await.unwrap();
    assert_eq!(status.jobs.count(JobStatus::Pending), 2);
    assert_eq!(status.jobs.total, 2);
    assert!(status.pause.uploads_paused);
    assert!(!status.quota.exceeded);
    assert!(status.sync.is_none());
    assert!(!status.sync_running);

    let page = engine.list_jobs(Some(JobStatus::Pending), 1, 1).await.unwrap();
    assert_eq!(page.total, 2);
    assert_eq!(page.jobs.len(), 1);
}

#[tokio::test]
async fn transport_check_reports_configuration_and_auth() {
    let h = Harness::new().await;
    let ok = engine(&h, UploadBehavior::Succeed).await;
    let check = ok.test_transport(None).await;
    assert!(check.success, "{}", check.message);

    let check = ok.test_transport(Some(Credentials::default())).await;
    assert!(!check.success);
    assert!(check.message.starts_with("NOT CONFIGURED"));

    let denied = engine(&h, UploadBehavior::FailAuth).await;
    let check = denied.test_transport(None).await;
    assert!(!check.success);
    assert!(check.message.starts_with("AUTH FAILED"));
}
