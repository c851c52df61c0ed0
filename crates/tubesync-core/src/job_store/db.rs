//! SQLite-backed job store implementation.
//!
//! Handles connection, migrations, and timestamp helpers. Job CRUD lives in `jobs`,
//! key/value process state in `app_state`.

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::events::EventBus;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS jobs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        video_id TEXT NOT NULL UNIQUE,
        channel_id TEXT NOT NULL,
        channel_name TEXT NOT NULL,
        title TEXT NOT NULL,
        duration_secs INTEGER,
        kind TEXT NOT NULL,
        status TEXT NOT NULL,
        lease_owner TEXT,
        version INTEGER NOT NULL DEFAULT 0,
        retry_count INTEGER NOT NULL DEFAULT 0,
        next_attempt_at INTEGER NOT NULL DEFAULT 0,
        error_message TEXT,
        file_path TEXT,
        file_size INTEGER,
        remote_path TEXT,
        published_at INTEGER,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        downloaded_at INTEGER,
        uploaded_at INTEGER
    );
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS jobs_claim_idx
        ON jobs (status, kind, next_attempt_at);
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS app_state (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        updated_at INTEGER NOT NULL
    );
    "#,
];

/// Handle to the SQLite-backed job store.
///
/// The database file is stored under the XDG state directory:
/// `~/.local/state/tubesync/jobs.db` on Debian. Every successful status
/// transition is published on the store's [`EventBus`].
#[derive(Clone)]
pub struct JobStore {
    pub(crate) pool: Pool<Sqlite>,
    pub(crate) events: EventBus,
}

impl JobStore {
    /// Open (or create) the default job store and run migrations.
    pub async fn open_default(events: EventBus) -> Result<Self> {
        let xdg_dirs = xdg::BaseDirectories::with_prefix("tubesync")?;
        let db_path = xdg_dirs.place_state_file("jobs.db")?;
        Self::open_at(db_path, events).await
    }

    /// Open (or create) the store at a specific path. Creates parent dirs if needed.
    pub async fn open_at(path: impl AsRef<Path>, events: EventBus) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;
        let store = JobStore { pool, events };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Event bus that receives status changes from this store.
    pub fn events(&self) -> &EventBus {
        &self.events
    }
}

/// Current time as Unix seconds (for DB timestamps).
pub fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
/// Open an in-memory store for tests (no disk I/O).
pub(crate) async fn open_memory() -> Result<JobStore> {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    let store = JobStore {
        pool,
        events: EventBus::new(64),
    };
    store.migrate().await?;
    Ok(store)
}
