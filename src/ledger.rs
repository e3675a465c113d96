//! Persisted "already processed" ledger.
//!
//! Keyed by the literal album directory path; both operations are
//! idempotent. The scheduler only consults key existence.

use std::path::Path;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait ProcessedLedger: Send + Sync {
    async fn is_processed(&self, path: &Path) -> Result<bool, LedgerError>;
    async fn mark_processed(&self, path: &Path) -> Result<(), LedgerError>;
}

/// SQLite-backed ledger, one row per processed album directory.
pub struct SqliteLedger {
    pool: SqlitePool,
}

impl SqliteLedger {
    pub async fn open(db_path: &Path) -> Result<Self, LedgerError> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS processed_albums (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT NOT NULL UNIQUE,
                processed_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
        )
        .execute(&pool)
        .await?;
        info!("ledger database ready at {}", db_path.display());
        Ok(SqliteLedger { pool })
    }
}

#[async_trait]
impl ProcessedLedger for SqliteLedger {
    async fn is_processed(&self, path: &Path) -> Result<bool, LedgerError> {
        let row = sqlx::query("SELECT COUNT(*) FROM processed_albums WHERE path = ?")
            .bind(path.to_string_lossy())
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>(0) > 0)
    }

    async fn mark_processed(&self, path: &Path) -> Result<(), LedgerError> {
        sqlx::query("INSERT OR IGNORE INTO processed_albums (path) VALUES (?)")
            .bind(path.to_string_lossy())
            .execute(&self.pool)
            .await?;
        info!("marked {} as processed", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mark_then_check_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let ledger = SqliteLedger::open(&tmp.path().join("ledger.db"))
            .await
            .unwrap();

        let album = Path::new("/drop/Artist - Album (1999)");
        assert!(!ledger.is_processed(album).await.unwrap());
        ledger.mark_processed(album).await.unwrap();
        assert!(ledger.is_processed(album).await.unwrap());
        // Marking again is a no-op, not an error.
        ledger.mark_processed(album).await.unwrap();
        assert!(ledger.is_processed(album).await.unwrap());
    }

    #[tokio::test]
    async fn keys_are_literal_paths() {
        let tmp = tempfile::tempdir().unwrap();
        let ledger = SqliteLedger::open(&tmp.path().join("ledger.db"))
            .await
            .unwrap();

        ledger.mark_processed(Path::new("/drop/a")).await.unwrap();
        assert!(!ledger.is_processed(Path::new("/drop/a/")).await.unwrap());
        assert!(!ledger.is_processed(Path::new("/drop/b")).await.unwrap());
    }
}
