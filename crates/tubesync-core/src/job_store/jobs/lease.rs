//! Leases: claim, release, abandon, startup recovery.
//!
//! A claim is a compare-and-set on `(id, version, lease_owner IS NULL)`, so two
//! concurrent callers can select the same candidate but only one update lands.

use sqlx::Row;

use super::super::db::{unix_timestamp, JobStore};
use super::super::error::StoreError;
use super::super::types::{JobId, JobStatus, JobUpdate, KindFilter, VideoJob};
use super::read::{job_from_row, JOB_COLUMNS};

impl JobStore {
    /// Lease up to `limit` unleased jobs in `status` that are due
    /// (`next_attempt_at <= now`). Candidates lost to a concurrent claimer are
    /// skipped, so fewer than `limit` may be returned.
    pub async fn claim_next(
        &self,
        status: JobStatus,
        limit: u32,
        filter: KindFilter,
        owner: &str,
    ) -> Result<Vec<VideoJob>, StoreError> {
        let now = unix_timestamp();
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM jobs \
             WHERE status = ?1 \
               AND lease_owner IS NULL \
               AND next_attempt_at <= ?2 \
               AND (?3 = 'any' \
                    OR (?3 = 'only' AND kind = ?4) \
                    OR (?3 = 'except' AND kind <> ?4)) \
             ORDER BY created_at, id \
             LIMIT ?5"
        );
        let rows = sqlx::query(&sql)
            .bind(status.as_str())
            .bind(now)
            .bind(filter.mode())
            .bind(filter.kind())
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        let mut claimed = Vec::with_capacity(rows.len());
        for row in rows {
            let mut job = job_from_row(&row)?;
            let result = sqlx::query(
                r#"
                UPDATE jobs
                SET lease_owner = ?1,
                    version = version + 1,
                    updated_at = ?2
                WHERE id = ?3
                  AND version = ?4
                  AND status = ?5
                  AND lease_owner IS NULL
                "#,
            )
            .bind(owner)
            .bind(now)
            .bind(job.id)
            .bind(job.version)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
            if result.rows_affected() == 1 {
                job.lease_owner = Some(owner.to_string());
                job.version += 1;
                job.updated_at = now;
                claimed.push(job);
            }
        }
        Ok(claimed)
    }

    /// Clear a job's lease without changing its status.
    pub async fn release(&self, id: JobId) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET lease_owner = NULL, version = version + 1, updated_at = ?1
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

    /// Give up on a leased job: an in-flight job reverts to its pre-claim
    /// status (publishing the change), any other job just loses its lease.
    pub async fn abandon(&self, id: JobId) -> Result<VideoJob, StoreError> {
        let job = self.get_job(id).await?;
        if job.status.is_in_flight() {
            let from = job.status;
            return self
                .transition(id, from, from.pre_claim(), JobUpdate::default())
                .await;
        }
        self.release(id).await?;
        self.get_job(id).await
    }

    /// Startup recovery: nothing can hold a lease before workers start, so
    /// every in-flight job reverts to its pre-claim status and every lease is
    /// cleared. Returns the number of rows touched.
    pub async fn recover_leases(&self) -> Result<u64, StoreError> {
        let now = unix_timestamp();
        let mut touched = 0;
        for from in [JobStatus::Downloading, JobStatus::Uploading] {
            let result = sqlx::query(
                r#"
                UPDATE jobs
                SET status = ?1, lease_owner = NULL, version = version + 1, updated_at = ?2
                WHERE status = ?3
                "#,
            )
            .bind(from.pre_claim().as_str())
            .bind(now)
            .bind(from.as_str())
            .execute(&self.pool)
            .await?;
            touched += result.rows_affected();
        }
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET lease_owner = NULL, version = version + 1, updated_at = ?1
            WHERE lease_owner IS NOT NULL
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?;
        touched += result.rows_affected();
        if touched > 0 {
            tracing::info!(touched, "recovered stranded job leases");
        }
        Ok(touched)
    }

    /// Number of jobs currently leased by `owner`.
    pub async fn leases_held_by(&self, owner: &str) -> Result<u64, StoreError> {
        let n: i64 = sqlx::query("SELECT COUNT(*) AS n FROM jobs WHERE lease_owner = ?1")
            .bind(owner)
            .fetch_one(&self.pool)
            .await?
            .try_get("n")?;
        Ok(n.max(0) as u64)
    }
}
