//! SQLite-backed record store.

use super::models::Record;
use super::schema::{find_index, multi_entry_indices, CATALOG_MIGRATOR, RECORDS_TABLE_NAME};
use super::trait_def::RecordStore;
use crate::error::{CatalogError, CatalogResult};
use crate::sqlite_persistence::MigrationOutcome;
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

const RECORD_COLUMNS: &str = "id, title, composer, arranger, publisher, voicing, liturgical_season, \
     tags, year_published, last_performed_date, license_count, notes, created_at, updated_at";

#[derive(Clone)]
pub struct SqliteRecordStore {
    conn: Arc<Mutex<Connection>>,
    migration: MigrationOutcome,
}

impl SqliteRecordStore {
    /// Opens (creating if needed) the catalog database and migrates it to the
    /// current schema before any read or write is allowed.
    pub async fn open<P: AsRef<Path>>(db_path: P) -> CatalogResult<Self> {
        let path: PathBuf = db_path.as_ref().to_path_buf();
        tokio::task::spawn_blocking(move || {
            info!("Opening catalog database at {:?}", path);
            let conn = Connection::open(&path)
                .with_context(|| format!("Failed to open catalog database at {:?}", path))
                .map_err(CatalogError::StoreUnavailable)?;
            Self::from_connection(conn)
        })
        .await?
    }

    pub fn open_in_memory() -> CatalogResult<Self> {
        let conn = Connection::open_in_memory()
            .context("Failed to open in-memory catalog database")
            .map_err(CatalogError::StoreUnavailable)?;
        Self::from_connection(conn)
    }

    fn from_connection(mut conn: Connection) -> CatalogResult<Self> {
        let migration = CATALOG_MIGRATOR
            .run(&mut conn)
            .map_err(CatalogError::StoreUnavailable)?;
        debug!(
            "Catalog database at version {} (was {})",
            migration.to_version, migration.from_version
        );
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            migration,
        })
    }

    /// What the schema migration did when this store was opened.
    pub fn migration(&self) -> &MigrationOutcome {
        &self.migration
    }

    /// Re-runs the schema migration on the open connection.
    pub async fn migrate(&self) -> CatalogResult<MigrationOutcome> {
        self.with_conn(|conn| {
            CATALOG_MIGRATOR
                .run(conn)
                .map_err(CatalogError::StoreUnavailable)
        })
        .await
    }

    async fn with_conn<T, F>(&self, f: F) -> CatalogResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> CatalogResult<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| anyhow!("Catalog database lock poisoned"))?;
            f(&mut guard)
        })
        .await?
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<Record> {
        let tags_json: String = row.get("tags")?;
        let license_count: i64 = row.get("license_count")?;
        Ok(Record {
            id: row.get("id")?,
            title: row.get("title")?,
            composer: row.get("composer")?,
            arranger: row.get("arranger")?,
            publisher: row.get("publisher")?,
            voicing: row.get("voicing")?,
            liturgical_season: row.get("liturgical_season")?,
            tags: serde_json::from_str(&tags_json).unwrap_or_default(),
            year_published: row.get("year_published")?,
            last_performed_date: row.get("last_performed_date")?,
            license_count: license_count.max(0) as u64,
            notes: row.get("notes")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    fn exists(tx: &Transaction, id: &str) -> rusqlite::Result<bool> {
        tx.query_row(
            &format!("SELECT 1 FROM {} WHERE id = ?1", RECORDS_TABLE_NAME),
            params![id],
            |_| Ok(()),
        )
        .optional()
        .map(|found| found.is_some())
    }

    fn write_record(tx: &Transaction, record: &Record) -> CatalogResult<()> {
        let tags_json = serde_json::to_string(&record.tags).context("Failed to encode tags")?;
        tx.execute(
            &format!(
                "INSERT INTO {} ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                 ON CONFLICT(id) DO UPDATE SET
                    title = excluded.title,
                    composer = excluded.composer,
                    arranger = excluded.arranger,
                    publisher = excluded.publisher,
                    voicing = excluded.voicing,
                    liturgical_season = excluded.liturgical_season,
                    tags = excluded.tags,
                    year_published = excluded.year_published,
                    last_performed_date = excluded.last_performed_date,
                    license_count = excluded.license_count,
                    notes = excluded.notes,
                    created_at = excluded.created_at,
                    updated_at = excluded.updated_at",
                RECORDS_TABLE_NAME, RECORD_COLUMNS
            ),
            params![
                record.id,
                record.title,
                record.composer,
                record.arranger,
                record.publisher,
                record.voicing,
                record.liturgical_season,
                tags_json,
                record.year_published,
                record.last_performed_date,
                record.license_count as i64,
                record.notes,
                record.created_at,
                record.updated_at,
            ],
        )?;

        for spec in multi_entry_indices() {
            // The only multi-entry key path today is `tags`.
            if spec.key_path == "tags" {
                spec.replace_entries(tx, RECORDS_TABLE_NAME, &record.id, record.tags.as_slice())?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn insert(&self, record: &Record) -> CatalogResult<()> {
        let record = record.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            if Self::exists(&tx, &record.id)? {
                return Err(CatalogError::DuplicateKey(record.id));
            }
            Self::write_record(&tx, &record)?;
            tx.commit()?;
            debug!("Inserted record {}", record.id);
            Ok(())
        })
        .await
    }

    async fn upsert(&self, record: &Record) -> CatalogResult<()> {
        let record = record.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            Self::write_record(&tx, &record)?;
            tx.commit()?;
            debug!("Upserted record {}", record.id);
            Ok(())
        })
        .await
    }

    async fn list_all(&self) -> CatalogResult<Vec<Record>> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let records = {
                let mut stmt = tx.prepare(&format!(
                    "SELECT {} FROM {}",
                    RECORD_COLUMNS, RECORDS_TABLE_NAME
                ))?;
                let rows = stmt.query_map([], Self::row_to_record)?;
                rows.collect::<Result<Vec<_>, _>>()?
            };
            tx.commit()?;
            Ok(records)
        })
        .await
    }

    async fn get(&self, id: &str) -> CatalogResult<Option<Record>> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let record = conn
                .query_row(
                    &format!(
                        "SELECT {} FROM {} WHERE id = ?1",
                        RECORD_COLUMNS, RECORDS_TABLE_NAME
                    ),
                    params![id],
                    Self::row_to_record,
                )
                .optional()?;
            Ok(record)
        })
        .await
    }

    async fn find_by_index(&self, index: &str, value: &str) -> CatalogResult<Vec<Record>> {
        let spec = find_index(index).ok_or_else(|| CatalogError::UnknownIndex(index.to_string()))?;
        let value = value.to_string();
        self.with_conn(move |conn| {
            let sql = if spec.multi_entry {
                format!(
                    "SELECT {} FROM {} WHERE id IN (SELECT record_id FROM {} WHERE value = ?1)",
                    RECORD_COLUMNS,
                    RECORDS_TABLE_NAME,
                    spec.indexed_table(RECORDS_TABLE_NAME)
                )
            } else {
                format!(
                    "SELECT {} FROM {} WHERE {} = ?1",
                    RECORD_COLUMNS, RECORDS_TABLE_NAME, spec.key_path
                )
            };
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![value], Self::row_to_record)?;
            let records = rows.collect::<Result<Vec<_>, _>>()?;
            Ok(records)
        })
        .await
    }

    async fn count(&self) -> CatalogResult<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM {}", RECORDS_TABLE_NAME),
                [],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
        .await
    }
}
