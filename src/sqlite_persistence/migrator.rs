//! Brings a database up to the latest of a list of [`VersionedSchema`]s.

use super::versioned_schema::{ensure_indices, read_schema_version, VersionedSchema};
use anyhow::{bail, Context, Result};
use rusqlite::Connection;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationOutcome {
    /// Version found on disk, 0 for a database that was just created.
    pub from_version: usize,
    pub to_version: usize,
    /// Indexes created by this run. Empty when everything was already there.
    pub created_indices: Vec<&'static str>,
}

pub struct SchemaMigrator {
    name: &'static str,
    schemas: &'static [VersionedSchema],
}

impl SchemaMigrator {
    pub const fn new(name: &'static str, schemas: &'static [VersionedSchema]) -> Self {
        Self { name, schemas }
    }

    pub fn latest(&self) -> Result<&'static VersionedSchema> {
        self.schemas
            .last()
            .with_context(|| format!("No schema versions defined for {} database", self.name))
    }

    /// Runs inside a single transaction: either the database ends up at the
    /// latest version with every declared index present, or nothing changes.
    pub fn run(&self, conn: &mut Connection) -> Result<MigrationOutcome> {
        conn.execute("PRAGMA foreign_keys = ON;", [])?;

        let latest = self.latest()?;
        let db_version = read_schema_version(conn)?;

        if db_version > latest.version {
            bail!(
                "{} database version {} is newer than the supported version {}",
                self.name,
                db_version,
                latest.version
            );
        }

        if db_version > 0 {
            let recorded = self
                .schemas
                .iter()
                .find(|s| s.version == db_version)
                .with_context(|| format!("Unknown {} database version {}", self.name, db_version))?;
            recorded.validate_tables(conn).with_context(|| {
                format!(
                    "{} database schema validation failed for version {}",
                    self.name, db_version
                )
            })?;
        }

        let tx = conn.transaction()?;
        let created_indices = if db_version == 0 {
            info!(
                "Creating {} database at version {}",
                self.name, latest.version
            );
            latest.create(&tx)?
        } else {
            for schema in self.schemas.iter().filter(|s| s.version > db_version) {
                info!(
                    "Running {} database migration to version {}",
                    self.name, schema.version
                );
                if let Some(migration_fn) = schema.migration {
                    migration_fn(&tx).with_context(|| {
                        format!("Failed to run migration to version {}", schema.version)
                    })?;
                }
            }
            let mut created = Vec::new();
            for table in latest.tables {
                created.extend(ensure_indices(&tx, table.name, latest.indices)?);
            }
            latest.stamp_version(&tx)?;
            created
        };
        tx.commit()?;

        if !created_indices.is_empty() {
            info!(
                "Created {} indices on {} database: {}",
                created_indices.len(),
                self.name,
                created_indices.join(", ")
            );
        } else {
            debug!("{} database indices already up to date", self.name);
        }

        latest.validate(conn).with_context(|| {
            format!(
                "{} database schema validation failed for version {}",
                self.name, latest.version
            )
        })?;

        Ok(MigrationOutcome {
            from_version: db_version,
            to_version: latest.version,
            created_indices,
        })
    }
}
