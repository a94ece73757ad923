//! Persisted sync watermark.
//!
//! Kept in its own key-value database so that it survives independently of
//! the catalog store.

use crate::error::{CatalogError, CatalogResult};
use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SchemaMigrator, SqlType, Table, VersionedSchema};
use crate::timestamps::latest_timestamp;
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

pub const LAST_SYNC_AT_KEY: &str = "sheetmusic.lastSyncAt";

/// A single persisted timestamp. `""` means no sync has happened yet.
#[async_trait]
pub trait WatermarkStore: Send + Sync {
    async fn get(&self) -> CatalogResult<String>;

    async fn set(&self, value: &str) -> CatalogResult<()>;

    /// Moves the watermark to the later of its current value and `candidate`
    /// and returns the stored value. Never moves it backwards.
    async fn advance(&self, candidate: &str) -> CatalogResult<String> {
        let current = self.get().await?;
        let next = latest_timestamp([current.as_str(), candidate]);
        if next.is_empty() || next == current {
            return Ok(current);
        }
        self.set(&next).await?;
        Ok(next)
    }
}

const KV_STATE_TABLE: Table = Table {
    name: "kv_state",
    columns: &[
        sqlite_column!("key", &SqlType::Text, is_primary_key = true),
        sqlite_column!("value", &SqlType::Text, non_null = true),
    ],
    unique_constraints: &[],
};

const STATE_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[KV_STATE_TABLE],
    indices: &[],
    migration: None,
}];

const STATE_MIGRATOR: SchemaMigrator = SchemaMigrator::new("state", STATE_VERSIONED_SCHEMAS);

#[derive(Clone)]
pub struct SqliteWatermarkStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteWatermarkStore {
    pub async fn open<P: AsRef<Path>>(db_path: P) -> CatalogResult<Self> {
        let path: PathBuf = db_path.as_ref().to_path_buf();
        tokio::task::spawn_blocking(move || {
            info!("Opening state database at {:?}", path);
            let conn = Connection::open(&path)
                .with_context(|| format!("Failed to open state database at {:?}", path))
                .map_err(CatalogError::StoreUnavailable)?;
            Self::from_connection(conn)
        })
        .await?
    }

    pub fn open_in_memory() -> CatalogResult<Self> {
        let conn = Connection::open_in_memory()
            .context("Failed to open in-memory state database")
            .map_err(CatalogError::StoreUnavailable)?;
        Self::from_connection(conn)
    }

    fn from_connection(mut conn: Connection) -> CatalogResult<Self> {
        STATE_MIGRATOR
            .run(&mut conn)
            .map_err(CatalogError::StoreUnavailable)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> CatalogResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> CatalogResult<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| anyhow!("State database lock poisoned"))?;
            f(&guard)
        })
        .await?
    }
}

#[async_trait]
impl WatermarkStore for SqliteWatermarkStore {
    async fn get(&self) -> CatalogResult<String> {
        self.with_conn(|conn| {
            let value: Option<String> = conn
                .query_row(
                    "SELECT value FROM kv_state WHERE key = ?1",
                    params![LAST_SYNC_AT_KEY],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(value.unwrap_or_default())
        })
        .await
    }

    async fn set(&self, value: &str) -> CatalogResult<()> {
        let value = value.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO kv_state (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![LAST_SYNC_AT_KEY, value],
            )?;
            debug!("Watermark set to {}", value);
            Ok(())
        })
        .await
    }
}

/// Process-local watermark, for tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct InMemoryWatermark {
    value: Mutex<String>,
}

impl InMemoryWatermark {
    pub fn new(initial: &str) -> Self {
        Self {
            value: Mutex::new(initial.to_string()),
        }
    }
}

#[async_trait]
impl WatermarkStore for InMemoryWatermark {
    async fn get(&self) -> CatalogResult<String> {
        let guard = self
            .value
            .lock()
            .map_err(|_| anyhow!("Watermark lock poisoned"))?;
        Ok(guard.clone())
    }

    async fn set(&self, value: &str) -> CatalogResult<()> {
        let mut guard = self
            .value
            .lock()
            .map_err(|_| anyhow!("Watermark lock poisoned"))?;
        *guard = value.to_string();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_absent_watermark_is_empty() {
        let store = SqliteWatermarkStore::open_in_memory().unwrap();
        assert_eq!(store.get().await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_watermark_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("state.db");

        let store = SqliteWatermarkStore::open(&db_path).await.unwrap();
        store.set("2024-03-01T00:00:00.000Z").await.unwrap();
        drop(store);

        let store = SqliteWatermarkStore::open(&db_path).await.unwrap();
        assert_eq!(store.get().await.unwrap(), "2024-03-01T00:00:00.000Z");
    }

    #[tokio::test]
    async fn test_advance_never_moves_backwards() {
        let store = SqliteWatermarkStore::open_in_memory().unwrap();

        assert_eq!(
            store.advance("2024-03-01T00:00:00.000Z").await.unwrap(),
            "2024-03-01T00:00:00.000Z"
        );
        assert_eq!(
            store.advance("2023-01-01T00:00:00.000Z").await.unwrap(),
            "2024-03-01T00:00:00.000Z"
        );
        assert_eq!(
            store.advance("not a date").await.unwrap(),
            "2024-03-01T00:00:00.000Z"
        );
        assert_eq!(
            store.advance("2025-01-01").await.unwrap(),
            "2025-01-01T00:00:00.000Z"
        );
        assert_eq!(store.get().await.unwrap(), "2025-01-01T00:00:00.000Z");
    }

    #[tokio::test]
    async fn test_in_memory_watermark() {
        let watermark = InMemoryWatermark::default();
        assert_eq!(watermark.get().await.unwrap(), "");
        assert_eq!(watermark.advance("").await.unwrap(), "");
        watermark.advance("2024-01-01T00:00:00.000Z").await.unwrap();
        assert_eq!(watermark.get().await.unwrap(), "2024-01-01T00:00:00.000Z");

        let seeded = InMemoryWatermark::new("2025-06-01T00:00:00.000Z");
        assert_eq!(
            seeded.advance("2025-01-01T00:00:00.000Z").await.unwrap(),
            "2025-06-01T00:00:00.000Z"
        );
    }
}
