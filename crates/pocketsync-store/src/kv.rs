//! Key-value adapters implementing the `IKeyValueStore` port
//!
//! Two adapters:
//! - [`SqliteKeyValueStore`] - the production adapter, one `kv_entries`
//!   table behind the [`StorePool`](crate::StorePool)
//! - [`MemoryKeyValueStore`] - a HashMap-backed adapter for tests and
//!   short-lived embeddings; same contract, nothing durable

use std::collections::HashMap;
use std::sync::Mutex;

use sqlx::{Row, SqlitePool};

use pocketsync_core::ports::IKeyValueStore;

// ============================================================================
// SqliteKeyValueStore
// ============================================================================

/// SQLite-backed durable key-value store
pub struct SqliteKeyValueStore {
    pool: SqlitePool,
}

impl SqliteKeyValueStore {
    /// Creates a new store over the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl IKeyValueStore for SqliteKeyValueStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM kv_entries WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.get::<String, _>("value")))
    }

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO kv_entries (key, value) VALUES (?1, ?2) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove(&self, key: &str) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM kv_entries WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

// ============================================================================
// MemoryKeyValueStore
// ============================================================================

/// In-memory `IKeyValueStore` for tests and embedding.
///
/// Lock discipline: the mutex is only held across the map operation itself,
/// never across an await point.
#[derive(Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.entries.lock().expect("kv mutex poisoned").len()
    }

    /// Returns true if nothing is stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl IKeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self
            .entries
            .lock()
            .expect("kv mutex poisoned")
            .get(key)
            .cloned())
    }

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.entries
            .lock()
            .expect("kv mutex poisoned")
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.entries.lock().expect("kv mutex poisoned").remove(key);
        Ok(())
    }
}
