//! SQLite handle for the durable store
//!
//! All local state lives in one key-value table, so there is no migration
//! history to speak of: opening the store creates the file if needed,
//! switches the journal to WAL, and applies the schema idempotently.

use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use crate::StoreError;

const SCHEMA: &str = include_str!("migrations/20260301_initial.sql");

/// Shared handle to the store's SQLite database.
///
/// Reads happen from the UI thread while the flush path is persisting a
/// queue, so the journal runs in WAL mode and writers get a busy timeout
/// instead of an immediate `SQLITE_BUSY`.
pub struct StorePool {
    pool: SqlitePool,
}

impl StorePool {
    /// Opens the database at `path`, creating the file and any missing
    /// parent directories, and applies the schema.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::ConnectionFailed(format!(
                    "creating store directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        // Every write is a single-row upsert on one table; a couple of
        // connections cover concurrent readers during a flush.
        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await
            .map_err(|e| {
                StoreError::ConnectionFailed(format!("opening store at {}: {e}", path.display()))
            })?;

        Self::apply_schema(&pool).await?;

        tracing::info!(path = %path.display(), "Store opened");
        Ok(Self { pool })
    }

    /// Opens a throwaway in-memory store for tests.
    ///
    /// Capped at one connection: each SQLite in-memory connection is its
    /// own database, so a second connection would see an empty store.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| {
                StoreError::ConnectionFailed(format!("opening in-memory store: {e}"))
            })?;

        Self::apply_schema(&pool).await?;
        Ok(Self { pool })
    }

    /// The underlying sqlx pool, for adapters built on top of this handle
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn apply_schema(pool: &SqlitePool) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(pool)
            .await
            .map_err(|e| StoreError::MigrationFailed(format!("applying store schema: {e}")))?;
        Ok(())
    }
}
