//! Snapshot based synchronization between installations.
//!
//! There is no server: users move snapshot files around by hand. Conflicts
//! are resolved per record by last write wins on `updatedAt`, and a
//! persisted watermark remembers where the last sync ended.

mod engine;
mod snapshot;
mod watermark;

pub use engine::{ExportOutcome, ImportReport, SyncEngine};
pub use snapshot::{ExportMode, IncomingPayload, Snapshot, SNAPSHOT_SCHEMA_VERSION};
pub use watermark::{InMemoryWatermark, SqliteWatermarkStore, WatermarkStore, LAST_SYNC_AT_KEY};
