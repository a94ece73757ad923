//! Snapshot export and last-write-wins import.

use super::snapshot::{ExportMode, IncomingPayload, Snapshot, SNAPSHOT_SCHEMA_VERSION};
use super::watermark::WatermarkStore;
use crate::catalog_store::{record_id, Record, RecordStore};
use crate::error::CatalogResult;
use crate::timestamps::{format_timestamp, latest_timestamp, timestamp_millis, Clock};
use anyhow::Context;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
}

impl ImportReport {
    pub fn status_message(&self) -> String {
        format!(
            "Import complete: {} inserted, {} updated, {} skipped.",
            self.inserted, self.updated, self.skipped
        )
    }
}

#[derive(Debug, Clone)]
pub struct ExportOutcome {
    pub snapshot: Snapshot,
    /// Where the snapshot was written, if it was written at all.
    pub path: Option<PathBuf>,
}

impl ExportOutcome {
    pub fn count(&self) -> usize {
        self.snapshot.records.len()
    }

    pub fn status_message(&self) -> String {
        match self.snapshot.mode {
            ExportMode::Full => format!("Exported {} score(s).", self.count()),
            ExportMode::Incremental => {
                let since = if self.snapshot.since.is_empty() {
                    "the beginning"
                } else {
                    self.snapshot.since.as_str()
                };
                format!(
                    "Incremental export complete: {} score(s) since {}.",
                    self.count(),
                    since
                )
            }
        }
    }
}

enum MergeDecision {
    Insert(Record),
    Update(Record),
    Skip,
}

/// Produces and consumes snapshots against a [`RecordStore`].
///
/// Calls must be serialized by the caller: the watermark is read and
/// written without any compare-and-swap.
pub struct SyncEngine {
    store: Arc<dyn RecordStore>,
    watermark: Arc<dyn WatermarkStore>,
    clock: Arc<dyn Clock>,
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn RecordStore>,
        watermark: Arc<dyn WatermarkStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            watermark,
            clock,
        }
    }

    /// Builds a snapshot and advances the watermark to its `exportedAt`.
    pub async fn export(&self, mode: ExportMode) -> CatalogResult<Snapshot> {
        let snapshot = self.build_snapshot(mode).await?;
        self.watermark.advance(&snapshot.exported_at).await?;
        Ok(snapshot)
    }

    /// Like [`SyncEngine::export`], but writes the snapshot into `dir` first.
    /// The watermark only moves once the file is on disk.
    pub async fn export_to_dir(&self, mode: ExportMode, dir: &Path) -> CatalogResult<ExportOutcome> {
        let snapshot = self.build_snapshot(mode).await?;
        let path = dir.join(snapshot.file_name());
        let json = snapshot.to_pretty_json()?;
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("Failed to write snapshot to {:?}", path))?;
        info!("Wrote {} snapshot to {:?}", mode, path);

        self.watermark.advance(&snapshot.exported_at).await?;
        Ok(ExportOutcome {
            snapshot,
            path: Some(path),
        })
    }

    async fn build_snapshot(&self, mode: ExportMode) -> CatalogResult<Snapshot> {
        let since = self.watermark.get().await?;
        let mut records = self.store.list_all().await?;

        if mode == ExportMode::Incremental {
            let since_millis = timestamp_millis(&since);
            records.retain(|record| timestamp_millis(record.modified_at()) > since_millis);
        }
        records.sort_by(|a, b| a.id.cmp(&b.id));

        let exported_at = format_timestamp(&self.clock.now());
        info!(
            "Exporting {} record(s), mode {}, since {:?}",
            records.len(),
            mode,
            since
        );

        Ok(Snapshot {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            mode,
            since,
            exported_at,
            records,
        })
    }

    /// Reads a snapshot file and imports it. The file is only read.
    pub async fn import_file(&self, path: &Path) -> CatalogResult<ImportReport> {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read snapshot file {:?}", path))?;
        self.import_snapshot(&text).await
    }

    /// Merges every record of `payload` into the store, in order.
    ///
    /// A malformed payload fails before anything is written. Each record is
    /// committed on its own, so a failure part way leaves earlier records
    /// applied and the watermark untouched.
    pub async fn import_snapshot(&self, payload: &str) -> CatalogResult<ImportReport> {
        let payload = IncomingPayload::parse(payload)?;
        let now = format_timestamp(&self.clock.now());
        let mut report = ImportReport::default();

        for raw in &payload.records {
            match self.decide(raw, &now).await? {
                MergeDecision::Insert(record) => {
                    self.store.insert(&record).await?;
                    report.inserted += 1;
                }
                MergeDecision::Update(record) => {
                    self.store.upsert(&record).await?;
                    report.updated += 1;
                }
                MergeDecision::Skip => report.skipped += 1,
            }
        }

        let incoming_latest = latest_timestamp(payload.records.iter().filter_map(modified_at));
        let candidate = latest_timestamp([
            payload.exported_at.as_deref().unwrap_or_default(),
            incoming_latest.as_str(),
            now.as_str(),
        ]);
        let watermark = self.watermark.advance(&candidate).await?;

        info!(
            "Imported {} record(s): {} inserted, {} updated, {} skipped, watermark {}",
            payload.records.len(),
            report.inserted,
            report.updated,
            report.skipped,
            watermark
        );
        Ok(report)
    }

    async fn decide(&self, raw: &Value, now: &str) -> CatalogResult<MergeDecision> {
        let (Some(fields), Some(id)) = (raw.as_object(), record_id(raw)) else {
            debug!("Skipping incoming record without an id");
            return Ok(MergeDecision::Skip);
        };
        let Some(existing) = self.store.get(&id).await? else {
            // `now` only dates records that are new to this store.
            return Ok(Record::normalize(raw, now)
                .map(MergeDecision::Insert)
                .unwrap_or(MergeDecision::Skip));
        };

        // An undated incoming record compares as the epoch.
        let incoming_at = modified_at(raw);
        if timestamp_millis(incoming_at.unwrap_or_default())
            < timestamp_millis(existing.modified_at())
        {
            debug!("Keeping local copy of {}, it is newer", id);
            return Ok(MergeDecision::Skip);
        }

        match merge_over(&existing, fields, incoming_at, now) {
            Some(merged) if merged != existing => Ok(MergeDecision::Update(merged)),
            // Same content and timestamp as what is stored: already applied.
            _ => Ok(MergeDecision::Skip),
        }
    }
}

/// Field-level merge: keys the sender wrote replace the stored ones, all
/// other stored fields are kept.
fn merge_over(
    existing: &Record,
    incoming_fields: &Map<String, Value>,
    incoming_at: Option<&str>,
    now: &str,
) -> Option<Record> {
    let Value::Object(mut fields) = existing.to_json() else {
        return None;
    };
    for (key, value) in incoming_fields {
        fields.insert(key.clone(), value.clone());
    }
    let updated_at = incoming_at.unwrap_or_else(|| existing.modified_at());
    fields.insert("updatedAt".to_string(), Value::String(updated_at.to_string()));
    Record::normalize(&Value::Object(fields), now)
}

fn modified_at(raw: &Value) -> Option<&str> {
    ["updatedAt", "createdAt"]
        .into_iter()
        .filter_map(|key| raw.get(key).and_then(Value::as_str))
        .find(|value| !value.is_empty())
}
