//! Job read operations: get, list, stats, lease inspection.

use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::super::db::JobStore;
use super::super::error::StoreError;
use super::super::types::{JobId, JobPage, JobStats, JobStatus, VideoJob};
use crate::events::Event;

pub(crate) const JOB_COLUMNS: &str = "id, video_id, channel_id, channel_name, title, \
     duration_secs, kind, status, lease_owner, version, retry_count, next_attempt_at, \
     error_message, file_path, file_size, remote_path, published_at, created_at, \
     updated_at, downloaded_at, uploaded_at";

pub(crate) fn job_from_row(row: &SqliteRow) -> Result<VideoJob, StoreError> {
    let status: String = row.try_get("status")?;
    let kind: String = row.try_get("kind")?;
    let retry_count: i64 = row.try_get("retry_count")?;
    Ok(VideoJob {
        id: row.try_get("id")?,
        video_id: row.try_get("video_id")?,
        channel_id: row.try_get("channel_id")?,
        channel_name: row.try_get("channel_name")?,
        title: row.try_get("title")?,
        duration_secs: row.try_get("duration_secs")?,
        kind: kind.parse().map_err(StoreError::Corrupt)?,
        status: status.parse().map_err(StoreError::Corrupt)?,
        lease_owner: row.try_get("lease_owner")?,
        version: row.try_get("version")?,
        retry_count: u32::try_from(retry_count.max(0)).unwrap_or(u32::MAX),
        next_attempt_at: row.try_get("next_attempt_at")?,
        error_message: row.try_get("error_message")?,
        file_path: row.try_get("file_path")?,
        file_size: row.try_get("file_size")?,
        remote_path: row.try_get("remote_path")?,
        published_at: row.try_get("published_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        downloaded_at: row.try_get("downloaded_at")?,
        uploaded_at: row.try_get("uploaded_at")?,
    })
}

impl JobStore {
    /// Fetch a job by id.
    pub async fn get_job(&self, id: JobId) -> Result<VideoJob, StoreError> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound(id))?;
        job_from_row(&row)
    }

    /// Fetch a job by its external video id.
    pub async fn find_by_video_id(&self, video_id: &str) -> Result<Option<VideoJob>, StoreError> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE video_id = ?1");
        let row = sqlx::query(&sql)
            .bind(video_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(job_from_row).transpose()
    }

    /// One page of jobs, newest first, optionally restricted to a status.
    /// `page` is 1-based.
    pub async fn list_jobs(
        &self,
        status: Option<JobStatus>,
        page: u32,
        per_page: u32,
    ) -> Result<JobPage, StoreError> {
        let page = page.max(1);
        let per_page = per_page.clamp(1, 500);
        let status_str = status.map(JobStatus::as_str);

        let total: i64 = sqlx::query(
            r#"
            SELECT COUNT(*) AS n FROM jobs
            WHERE (?1 IS NULL OR status = ?1)
            "#,
        )
        .bind(status_str)
        .fetch_one(&self.pool)
        .await?
        .try_get("n")?;

        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM jobs \
             WHERE (?1 IS NULL OR status = ?1) \
             ORDER BY created_at DESC, id DESC \
             LIMIT ?2 OFFSET ?3"
        );
        let rows = sqlx::query(&sql)
            .bind(status_str)
            .bind(i64::from(per_page))
            .bind(i64::from(page - 1) * i64::from(per_page))
            .fetch_all(&self.pool)
            .await?;
        let jobs = rows.iter().map(job_from_row).collect::<Result<Vec<_>, _>>()?;

        Ok(JobPage {
            total: total.max(0) as u64,
            page,
            per_page,
            jobs,
        })
    }

    /// Jobs currently carrying a lease.
    pub async fn leased_jobs(&self) -> Result<Vec<VideoJob>, StoreError> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE lease_owner IS NOT NULL ORDER BY id");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(job_from_row).collect()
    }

    /// Unleased pending jobs whose duration is still unknown.
    pub async fn unclassified_jobs(&self, limit: u32) -> Result<Vec<VideoJob>, StoreError> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM jobs \
             WHERE status = 'pending' AND kind = 'unclassified' AND lease_owner IS NULL \
             ORDER BY id LIMIT ?1"
        );
        let rows = sqlx::query(&sql)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(job_from_row).collect()
    }

    /// Aggregate counts by status plus total recorded artifact bytes.
    pub async fn stats(&self) -> Result<JobStats, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT status, COUNT(*) AS n, COALESCE(SUM(file_size), 0) AS bytes
            FROM jobs
            GROUP BY status
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut stats = JobStats::default();
        for row in rows {
            let status: String = row.try_get("status")?;
            let status: JobStatus = status.parse().map_err(StoreError::Corrupt)?;
            let n: i64 = row.try_get("n")?;
            let bytes: i64 = row.try_get("bytes")?;
            stats.add(status, n.max(0) as u64);
            stats.total_bytes += bytes.max(0) as u64;
        }
        Ok(stats)
    }

    /// Compute stats and publish them as a `stats_update` event.
    pub async fn publish_stats(&self) -> Result<JobStats, StoreError> {
        let stats = self.stats().await?;
        self.events.publish(Event::StatsUpdate(stats.clone()));
        Ok(stats)
    }
}
