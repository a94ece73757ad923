//! Named cache generations, persisted in SQLite.

use super::models::AssetResponse;
use crate::sqlite_column;
use crate::sqlite_persistence::{
    Column, IndexSpec, SchemaMigrator, SqlType, Table, VersionedSchema,
};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Storage for cache generations. A generation exists as long as it holds
/// at least one entry.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    async fn put(&self, cache_name: &str, key: &str, response: &AssetResponse) -> Result<()>;

    async fn get(&self, cache_name: &str, key: &str) -> Result<Option<AssetResponse>>;

    async fn cache_names(&self) -> Result<Vec<String>>;

    /// Returns false if there was no such generation.
    async fn delete_cache(&self, cache_name: &str) -> Result<bool>;
}

const CACHE_ENTRIES_TABLE: Table = Table {
    name: "cache_entries",
    columns: &[
        sqlite_column!("cache_name", &SqlType::Text, non_null = true),
        sqlite_column!("url", &SqlType::Text, non_null = true),
        sqlite_column!("status", &SqlType::Integer, non_null = true),
        sqlite_column!(
            "headers",
            &SqlType::Text,
            non_null = true,
            default_value = Some("'[]'")
        ), // JSON array of [name, value]
        sqlite_column!("body", &SqlType::Blob, non_null = true),
        sqlite_column!("stored_at", &SqlType::Integer, non_null = true),
    ],
    unique_constraints: &[&["cache_name", "url"]],
};

const ASSET_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[CACHE_ENTRIES_TABLE],
    indices: &[IndexSpec::single("cacheName", "cache_name")],
    migration: None,
}];

const ASSET_MIGRATOR: SchemaMigrator = SchemaMigrator::new("assets", ASSET_VERSIONED_SCHEMAS);

#[derive(Clone)]
pub struct SqliteCacheStorage {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCacheStorage {
    /// Opens (creating if needed) the asset database and migrates it.
    pub async fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path: PathBuf = db_path.as_ref().to_path_buf();
        tokio::task::spawn_blocking(move || {
            info!("Opening asset cache database at {:?}", path);
            let conn = Connection::open(&path)
                .with_context(|| format!("Failed to open asset cache database at {:?}", path))?;
            Self::from_connection(conn)
        })
        .await
        .context("Asset cache open task failed")?
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        ASSET_MIGRATOR.run(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| anyhow!("Asset cache database lock poisoned"))?;
            f(&guard)
        })
        .await
        .context("Asset cache task failed")?
    }
}

#[async_trait]
impl CacheStorage for SqliteCacheStorage {
    async fn put(&self, cache_name: &str, key: &str, response: &AssetResponse) -> Result<()> {
        let cache_name = cache_name.to_string();
        let key = key.to_string();
        let headers = serde_json::to_string(&response.headers)?;
        let status = response.status;
        let body = response.body.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO cache_entries (cache_name, url, status, headers, body, stored_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(cache_name, url) DO UPDATE SET
                    status = excluded.status,
                    headers = excluded.headers,
                    body = excluded.body,
                    stored_at = excluded.stored_at",
                params![
                    cache_name,
                    key,
                    status,
                    headers,
                    body,
                    chrono::Utc::now().timestamp()
                ],
            )?;
            debug!("Cached {} in {}", key, cache_name);
            Ok(())
        })
        .await
    }

    async fn get(&self, cache_name: &str, key: &str) -> Result<Option<AssetResponse>> {
        let cache_name = cache_name.to_string();
        let key = key.to_string();
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    "SELECT status, headers, body FROM cache_entries
                     WHERE cache_name = ?1 AND url = ?2",
                    params![cache_name, key],
                    |row| {
                        Ok((
                            row.get::<_, u16>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, Vec<u8>>(2)?,
                        ))
                    },
                )
                .optional()?;

            row.map(|(status, headers, body)| -> Result<AssetResponse> {
                let headers = serde_json::from_str(&headers)
                    .with_context(|| format!("Corrupt cached headers for {}", key))?;
                Ok(AssetResponse {
                    status,
                    headers,
                    body,
                })
            })
            .transpose()
        })
        .await
    }

    async fn cache_names(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT DISTINCT cache_name FROM cache_entries ORDER BY cache_name")?;
            let names = stmt
                .query_map([], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(names)
        })
        .await
    }

    async fn delete_cache(&self, cache_name: &str) -> Result<bool> {
        let cache_name = cache_name.to_string();
        self.with_conn(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM cache_entries WHERE cache_name = ?1",
                params![cache_name],
            )?;
            Ok(deleted > 0)
        })
        .await
    }
}
