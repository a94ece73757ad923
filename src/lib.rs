//! Sheet-music Catalog Library
//!
//! Offline-first catalog of sheet music: a local record store with a
//! versioned schema, snapshot based sync between installations, and an
//! offline cache for the application shell.

pub mod asset_cache;
pub mod catalog_store;
pub mod config;
pub mod error;
pub mod server;
pub mod sqlite_persistence;
pub mod sync;
pub mod timestamps;

// Re-export commonly used types for convenience
pub use catalog_store::{NewRecord, Record, RecordStore, SqliteRecordStore};
pub use error::{CatalogError, CatalogResult};
pub use server::{run_server, RequestsLoggingLevel};
pub use sync::{ExportMode, ImportReport, SqliteWatermarkStore, SyncEngine, WatermarkStore};
pub use timestamps::{Clock, SystemClock};
