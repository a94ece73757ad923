//! Durable storage for catalog records.

mod models;
mod query;
pub mod schema;
mod store;
mod trait_def;

pub use models::{record_id, NewRecord, Record};
pub use query::{filter_records, sort_records, SortKey};
pub use schema::{CATALOG_VERSIONED_SCHEMAS, RECORD_INDICES};
pub use store::SqliteRecordStore;
pub use trait_def::RecordStore;
