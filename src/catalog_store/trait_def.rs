//! RecordStore trait definition.
//!
//! The sync engine and the command line only talk to this trait, so the
//! merge logic does not depend on SQLite.

use super::models::Record;
use crate::error::CatalogResult;
use async_trait::async_trait;

/// Durable keyed storage for catalog records.
///
/// Every method runs in its own transaction. Callers hand in records that
/// already went through [`Record::normalize`].
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fails with `DuplicateKey` if the id is taken.
    async fn insert(&self, record: &Record) -> CatalogResult<()>;

    /// Inserts or overwrites every field, `createdAt` included.
    async fn upsert(&self, record: &Record) -> CatalogResult<()>;

    /// All records in unspecified order, read from a single transaction.
    async fn list_all(&self) -> CatalogResult<Vec<Record>>;

    async fn get(&self, id: &str) -> CatalogResult<Option<Record>>;

    /// Looks records up through one of the declared secondary indexes.
    async fn find_by_index(&self, index: &str, value: &str) -> CatalogResult<Vec<Record>>;

    async fn count(&self) -> CatalogResult<usize>;
}
