//! Job write operations: enqueue, status transitions, retry, remove.

use super::super::db::{unix_timestamp, JobStore};
use super::super::error::StoreError;
use super::super::types::{JobId, JobStatus, JobUpdate, NewVideoJob, VideoJob, VideoKind};
use crate::events::{Event, StatusChange};

impl JobStore {
    /// Insert a pending job unless one already exists for the same video id.
    /// Returns whether a row was created.
    pub async fn create_if_absent(&self, job: &NewVideoJob) -> Result<bool, StoreError> {
        let now = unix_timestamp();
        let result = sqlx::query(
            r#"
            INSERT INTO jobs (
                video_id, channel_id, channel_name, title, duration_secs, kind,
                status, version, retry_count, next_attempt_at, published_at,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6,
                      'pending', 0, 0, 0, ?7,
                      ?8, ?8)
            ON CONFLICT(video_id) DO NOTHING
            "#,
        )
        .bind(&job.video_id)
        .bind(&job.channel_id)
        .bind(&job.channel_name)
        .bind(&job.title)
        .bind(job.duration_secs.map(|d| d as i64))
        .bind(job.kind.as_str())
        .bind(job.published_at)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        self.events.publish(Event::StatusChange(StatusChange {
            job_id: result.last_insert_rowid(),
            video_id: job.video_id.clone(),
            from: None,
            to: JobStatus::Pending,
            error: None,
        }));
        Ok(true)
    }

    /// Compare-and-set status change. Fails with `Conflict` (and changes
    /// nothing) when the job is not in `from`. The lease survives only into
    /// an in-flight status. The status change is published before returning.
    pub async fn transition(
        &self,
        id: JobId,
        from: JobStatus,
        to: JobStatus,
        update: JobUpdate,
    ) -> Result<VideoJob, StoreError> {
        if !from.can_transition_to(to) {
            return Err(StoreError::InvalidTransition { from, to });
        }

        let mut job = self.get_job(id).await?;
        if job.status != from {
            return Err(StoreError::Conflict {
                id,
                expected: from,
                actual: job.status,
            });
        }

        let expected_version = job.version;
        let now = unix_timestamp();
        update.apply(&mut job);
        job.status = to;
        job.version += 1;
        job.updated_at = now;
        if !to.is_in_flight() {
            job.lease_owner = None;
        }
        match to {
            JobStatus::Downloaded => job.downloaded_at = Some(now),
            JobStatus::Uploaded => job.uploaded_at = Some(now),
            _ => {}
        }

        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = ?1,
                lease_owner = ?2,
                version = ?3,
                retry_count = ?4,
                next_attempt_at = ?5,
                error_message = ?6,
                file_path = ?7,
                file_size = ?8,
                remote_path = ?9,
                duration_secs = ?10,
                updated_at = ?11,
                downloaded_at = ?12,
                uploaded_at = ?13
            WHERE id = ?14 AND status = ?15 AND version = ?16
            "#,
        )
        .bind(to.as_str())
        .bind(&job.lease_owner)
        .bind(job.version)
        .bind(i64::from(job.retry_count))
        .bind(job.next_attempt_at)
        .bind(&job.error_message)
        .bind(&job.file_path)
        .bind(job.file_size)
        .bind(&job.remote_path)
        .bind(job.duration_secs)
        .bind(now)
        .bind(job.downloaded_at)
        .bind(job.uploaded_at)
        .bind(id)
        .bind(from.as_str())
        .bind(expected_version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let actual = self.get_job(id).await?.status;
            return Err(StoreError::Conflict {
                id,
                expected: from,
                actual,
            });
        }

        self.events
            .publish(Event::StatusChange(StatusChange::for_job(&job, Some(from))));
        Ok(job)
    }

    /// Put a failed job back in the download queue with a fresh retry
    /// budget. Any recorded artifact path is dropped; the download writes a
    /// new one.
    pub async fn retry_job(&self, id: JobId) -> Result<VideoJob, StoreError> {
        self.transition(
            id,
            JobStatus::Failed,
            JobStatus::Pending,
            JobUpdate::default()
                .clear_error()
                .with_retry(0, 0)
                .without_artifact(),
        )
        .await
    }

    /// Send a job whose upload failed back to the upload queue, keeping its
    /// artifact. `Failed` only re-enters a stage through its in-flight
    /// status, so the job passes through `Uploading` unleased and is
    /// released to `Downloaded` for the upload pool to claim.
    pub async fn retry_upload(&self, id: JobId) -> Result<VideoJob, StoreError> {
        let job = self
            .transition(
                id,
                JobStatus::Failed,
                JobStatus::Uploading,
                JobUpdate::default().clear_error().with_retry(0, 0),
            )
            .await?;
        self.transition(job.id, JobStatus::Uploading, JobStatus::Downloaded, JobUpdate::default())
            .await
    }

    /// Re-queue a rediscovered video whose download failed. A failed job
    /// that still has its artifact on disk failed at upload and is left for
    /// an operator retry. Returns whether the job was re-queued.
    pub async fn requeue_failed(&self, video_id: &str) -> Result<bool, StoreError> {
        let Some(job) = self.find_by_video_id(video_id).await? else {
            return Ok(false);
        };
        if job.status != JobStatus::Failed || job.has_local_artifact().await {
            return Ok(false);
        }
        match self.retry_job(job.id).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_conflict() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Delete an unleased job and return its last state.
    pub async fn remove_job(&self, id: JobId) -> Result<VideoJob, StoreError> {
        let job = self.get_job(id).await?;
        if let Some(owner) = job.lease_owner.clone() {
            return Err(StoreError::Leased { id, owner });
        }
        let result = sqlx::query("DELETE FROM jobs WHERE id = ?1 AND lease_owner IS NULL")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            let current = self.get_job(id).await?;
            return Err(StoreError::Leased {
                id,
                owner: current.lease_owner.unwrap_or_default(),
            });
        }
        Ok(job)
    }

    /// Clear the local artifact path after the file was deleted. Size is kept
    /// for byte accounting.
    pub async fn forget_artifact(&self, id: JobId) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET file_path = NULL, version = version + 1, updated_at = ?1
            WHERE id = ?2
            "#,
        )
        .bind(unix_timestamp())
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    /// Assign a pool to an unclassified pending job. Returns false if the job
    /// was claimed or classified concurrently.
    pub async fn classify(
        &self,
        id: JobId,
        kind: VideoKind,
        duration_secs: Option<u64>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET kind = ?1,
                duration_secs = COALESCE(?2, duration_secs),
                version = version + 1,
                updated_at = ?3
            WHERE id = ?4
              AND kind = 'unclassified'
              AND status = 'pending'
              AND lease_owner IS NULL
            "#,
        )
        .bind(kind.as_str())
        .bind(duration_secs.map(|d| d as i64))
        .bind(unix_timestamp())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
