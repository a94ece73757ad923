//! SQLite schema definitions for the catalog database.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, IndexSpec, SchemaMigrator, SqlType, Table, VersionedSchema};

pub const RECORDS_TABLE_NAME: &str = "records";

const RECORDS_TABLE: Table = Table {
    name: RECORDS_TABLE_NAME,
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("composer", &SqlType::Text, non_null = true),
        sqlite_column!("arranger", &SqlType::Text, non_null = true),
        sqlite_column!("publisher", &SqlType::Text, non_null = true),
        sqlite_column!("voicing", &SqlType::Text, non_null = true),
        sqlite_column!("liturgical_season", &SqlType::Text, non_null = true),
        sqlite_column!(
            "tags",
            &SqlType::Text,
            non_null = true,
            default_value = Some("'[]'")
        ), // JSON array
        sqlite_column!("year_published", &SqlType::Integer),
        sqlite_column!("last_performed_date", &SqlType::Text, non_null = true),
        sqlite_column!(
            "license_count",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("notes", &SqlType::Text, non_null = true),
        sqlite_column!("created_at", &SqlType::Text, non_null = true), // ISO 8601
        sqlite_column!("updated_at", &SqlType::Text, non_null = true), // ISO 8601
    ],
    unique_constraints: &[],
};

// =============================================================================
// Version 1 - Records keyed by id, title/composer/tags lookups
// =============================================================================

const RECORD_INDICES_V1: &[IndexSpec] = &[
    IndexSpec::single("title", "title"),
    IndexSpec::single("composer", "composer"),
    IndexSpec::multi_entry("tags", "tags"),
];

// =============================================================================
// Version 2 - Year and last-performed lookups
// =============================================================================

/// Every secondary index the current build expects on the records table.
/// Adding a lookup is one more entry here plus a schema version bump.
pub const RECORD_INDICES: &[IndexSpec] = &[
    IndexSpec::single("title", "title"),
    IndexSpec::single("composer", "composer"),
    IndexSpec::multi_entry("tags", "tags"),
    IndexSpec::single("yearPublished", "year_published"),
    IndexSpec::single("lastPerformedDate", "last_performed_date"),
];

// =============================================================================
// Versioned Schema Definition
// =============================================================================

pub const CATALOG_VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 1,
        tables: &[RECORDS_TABLE],
        indices: RECORD_INDICES_V1,
        migration: None,
    },
    VersionedSchema {
        version: 2,
        tables: &[RECORDS_TABLE],
        indices: RECORD_INDICES,
        // Index creation is handled by the declarative diff, no data to move.
        migration: None,
    },
];

pub const CATALOG_MIGRATOR: SchemaMigrator =
    SchemaMigrator::new("catalog", CATALOG_VERSIONED_SCHEMAS);

pub fn find_index(name: &str) -> Option<&'static IndexSpec> {
    RECORD_INDICES.iter().find(|spec| spec.name == name)
}

pub fn multi_entry_indices() -> impl Iterator<Item = &'static IndexSpec> {
    RECORD_INDICES.iter().filter(|spec| spec.multi_entry)
}
