//! Key/value process state (last sync run, quota) stored as JSON.

use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::Row;

use super::db::{unix_timestamp, JobStore};
use super::error::StoreError;

/// Key of the most recent `SyncRun`.
pub const LAST_SYNC_KEY: &str = "last_sync";
/// Key of the persisted quota state.
pub const QUOTA_KEY: &str = "youtube_quota";

impl JobStore {
    /// Read and decode a state value; `None` when the key was never written.
    pub async fn load_state<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let row = sqlx::query("SELECT value FROM app_state WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let raw: String = row.try_get("value")?;
                Ok(Some(serde_json::from_str(&raw)?))
            }
            None => Ok(None),
        }
    }

    /// Encode and upsert a state value.
    pub async fn save_state<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let raw = serde_json::to_string(value)?;
        sqlx::query(
            r#"
            INSERT INTO app_state (key, value, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(raw)
        .bind(unix_timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
