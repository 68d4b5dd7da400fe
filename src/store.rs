// src/store.rs
//! Durable dedup store: the set of `(source_id, key)` pairs that were fully
//! delivered, with the time of delivery for retention pruning.
//!
//! Every commit is its own SQLite transaction with `synchronous = FULL`, so a
//! record that `commit` reported is on disk before the relay moves on.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::Row;

use crate::error::StoreError;
use crate::ingest::types::SourceId;

/// Store operations the relay needs. Implemented by [`SqliteStore`]; tests wrap
/// it to inject faults.
#[async_trait]
pub trait DedupStore: Send + Sync {
    async fn exists(&self, source: SourceId, key: &str) -> Result<bool, StoreError>;

    /// Persist a delivery record. Must be durable when this returns `Ok`.
    async fn commit(&self, source: SourceId, key: &str, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Delete records delivered before `cutoff`; returns how many went away.
    async fn prune(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;

    async fn close(&self) {}
}

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database file. Any failure here is fatal for a run.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await
            .map_err(StoreError::Unavailable)?;

        let store = Self { pool };
        store.init_schema().await?;
        tracing::info!(path = %path.display(), "dedup store opened");
        Ok(store)
    }

    /// Private in-memory database, mainly for tests.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:").map_err(StoreError::Unavailable)?;
        // One connection that never expires: each connection has its own memory DB.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await
            .map_err(StoreError::Unavailable)?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        for stmt in [
            r#"
            CREATE TABLE IF NOT EXISTS delivered_items (
                source_id    TEXT    NOT NULL,
                item_key     TEXT    NOT NULL,
                delivered_at INTEGER NOT NULL,
                PRIMARY KEY (source_id, item_key)
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_delivered_items_delivered_at ON delivered_items(delivered_at)",
            r#"
            CREATE TABLE IF NOT EXISTS relay_meta (
                name  TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        ] {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(StoreError::Unavailable)?;
        }
        self.import_legacy().await
    }

    /// Databases written by the previous bot keep posted URLs in `posted_content`.
    /// Carry them over once so an upgrade does not repost recent items.
    async fn import_legacy(&self) -> Result<(), StoreError> {
        let has_legacy = sqlx::query(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'posted_content'",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::Unavailable)?
        .is_some();
        if !has_legacy {
            return Ok(());
        }
        let done = sqlx::query("SELECT 1 FROM relay_meta WHERE name = 'legacy_imported'")
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::Unavailable)?
            .is_some();
        if done {
            return Ok(());
        }

        let rows = sqlx::query("SELECT url, source, CAST(posted_at AS TEXT) AS posted_at FROM posted_content")
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::Unavailable)?;

        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(StoreError::Unavailable)?;
        let mut imported = 0usize;
        for row in rows {
            let url: String = row.try_get("url").map_err(StoreError::Unavailable)?;
            let source: Option<String> = row.try_get("source").unwrap_or(None);
            let posted_at: Option<String> = row.try_get("posted_at").unwrap_or(None);
            let Some((source_id, key)) = legacy_key(source.as_deref().unwrap_or_default(), &url)
            else {
                continue;
            };
            let at = posted_at
                .as_deref()
                .and_then(parse_sqlite_timestamp)
                .unwrap_or(now);
            sqlx::query(
                "INSERT OR IGNORE INTO delivered_items (source_id, item_key, delivered_at) VALUES (?, ?, ?)",
            )
            .bind(source_id.as_str())
            .bind(&key)
            .bind(at.timestamp())
            .execute(&mut *tx)
            .await
            .map_err(StoreError::Unavailable)?;
            imported += 1;
        }
        sqlx::query("INSERT OR REPLACE INTO relay_meta (name, value) VALUES ('legacy_imported', ?)")
            .bind(now.to_rfc3339())
            .execute(&mut *tx)
            .await
            .map_err(StoreError::Unavailable)?;
        tx.commit().await.map_err(StoreError::Unavailable)?;

        tracing::info!(imported, "imported legacy posted_content records");
        Ok(())
    }

    /// Number of records currently held.
    pub async fn len(&self) -> Result<u64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM delivered_items")
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::Query)?;
        let n: i64 = row.try_get("n").map_err(StoreError::Query)?;
        Ok(n.max(0) as u64)
    }

    pub async fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len().await? == 0)
    }
}

#[async_trait]
impl DedupStore for SqliteStore {
    async fn exists(&self, source: SourceId, key: &str) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 FROM delivered_items WHERE source_id = ? AND item_key = ?")
            .bind(source.as_str())
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::Query)?;
        Ok(row.is_some())
    }

    async fn commit(&self, source: SourceId, key: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT OR IGNORE INTO delivered_items (source_id, item_key, delivered_at) VALUES (?, ?, ?)",
        )
        .bind(source.as_str())
        .bind(key)
        .bind(at.timestamp())
        .execute(&self.pool)
        .await
        .map_err(StoreError::Write)?;
        tracing::debug!(source = %source, key, "marked as delivered");
        Ok(())
    }

    async fn prune(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let res = sqlx::query("DELETE FROM delivered_items WHERE delivered_at < ?")
            .bind(cutoff.timestamp())
            .execute(&self.pool)
            .await
            .map_err(StoreError::Write)?;
        Ok(res.rows_affected())
    }

    async fn close(&self) {
        self.pool.close().await;
        tracing::info!("dedup store closed");
    }
}

/// Map an old `(source name, url)` row to the new composite key.
fn legacy_key(source_name: &str, url: &str) -> Option<(SourceId, String)> {
    let source = match source_name {
        "X/Twitter" => SourceId::X,
        "YouTube" => SourceId::Youtube,
        "Ultraman News" => SourceId::UltramanNews,
        "Ultraman Columns" => SourceId::UltramanColumn,
        _ => return None,
    };
    let key = match source {
        SourceId::Youtube => url.split_once("v=").map(|(_, rest)| rest.split('&').next().unwrap_or(rest)),
        _ => url.trim_end_matches('/').rsplit('/').next(),
    }?;
    (!key.is_empty()).then(|| (source, key.to_string()))
}

/// `CURRENT_TIMESTAMP` in SQLite is `YYYY-MM-DD HH:MM:SS` in UTC.
fn parse_sqlite_timestamp(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s.trim(), "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|n| n.and_utc())
        .or_else(|| DateTime::parse_from_rfc3339(s.trim()).ok().map(|d| d.with_timezone(&Utc)))
}
