//! End-to-end tests for snapshot exchange between two installations
//!
//! Every device keeps its catalog and watermark in SQLite files under its
//! own temp dir, snapshots travel as files.

mod common;

use common::{TestDevice, START_TIME};
use serde_json::{json, Value};
use sheetmusic_catalog::sync::Snapshot;
use sheetmusic_catalog::timestamps::format_timestamp;
use sheetmusic_catalog::{
    CatalogError, Clock, ExportMode, ImportReport, NewRecord, Record, RecordStore,
    SqliteRecordStore, WatermarkStore,
};

fn magnificat(now: &str) -> Record {
    NewRecord {
        title: "  Magnificat in D ".to_string(),
        composer: "Stanford".to_string(),
        voicing: "SATB".to_string(),
        tags: vec!["evensong".to_string(), "canticle".to_string()],
        year_published: Some("1918".to_string()),
        license_count: Some("24".to_string()),
        ..Default::default()
    }
    .into_record(now)
}

async fn read_snapshot(path: &std::path::Path) -> Snapshot {
    let text = tokio::fs::read_to_string(path).await.unwrap();
    serde_json::from_str(&text).unwrap()
}

#[tokio::test]
async fn test_full_export_is_imported_on_another_device() {
    let laptop = TestDevice::new().await;
    let tablet = TestDevice::new().await;

    let now = format_timestamp(&laptop.clock.now());
    let record = magnificat(&now);
    assert_eq!(record.title, "Magnificat in D");
    laptop.store.insert(&record).await.unwrap();

    let outcome = laptop
        .engine
        .export_to_dir(ExportMode::Full, laptop.dir.path())
        .await
        .unwrap();
    assert_eq!(outcome.count(), 1);
    assert_eq!(outcome.status_message(), "Exported 1 score(s).");
    let path = outcome.path.unwrap();
    assert!(path
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("sheetmusic-full-export-"));

    let on_disk = read_snapshot(&path).await;
    assert_eq!(on_disk.schema_version, 1);
    assert_eq!(on_disk.records, vec![record.clone()]);

    let report = tablet.engine.import_file(&path).await.unwrap();
    assert_eq!(
        report,
        ImportReport {
            inserted: 1,
            updated: 0,
            skipped: 0
        }
    );
    assert_eq!(tablet.store.get(&record.id).await.unwrap(), Some(record));
}

#[tokio::test]
async fn test_edits_flow_back_through_incremental_export() {
    let laptop = TestDevice::new().await;
    let tablet = TestDevice::new().await;

    let record = magnificat(&format_timestamp(&laptop.clock.now()));
    laptop.store.insert(&record).await.unwrap();
    let full = laptop
        .engine
        .export_to_dir(ExportMode::Full, laptop.dir.path())
        .await
        .unwrap();
    tablet
        .engine
        .import_file(full.path.as_ref().unwrap())
        .await
        .unwrap();

    // Edited on the tablet ten minutes later.
    tablet.clock.advance_minutes(10);
    let edited_at = format_timestamp(&tablet.clock.now());
    let mut edited = record.clone();
    edited.last_performed_date = "2026-02-22".to_string();
    edited.updated_at = edited_at.clone();
    tablet.store.upsert(&edited).await.unwrap();

    let incremental = tablet
        .engine
        .export_to_dir(ExportMode::Incremental, tablet.dir.path())
        .await
        .unwrap();
    assert_eq!(incremental.count(), 1);
    let imported_at = tablet.clock.now() - chrono::Duration::minutes(10);
    assert_eq!(incremental.snapshot.since, format_timestamp(&imported_at));

    let report = laptop
        .engine
        .import_file(incremental.path.as_ref().unwrap())
        .await
        .unwrap();
    assert_eq!(report.updated, 1);
    let merged = laptop.store.get(&record.id).await.unwrap().unwrap();
    assert_eq!(merged.last_performed_date, "2026-02-22");
    assert_eq!(merged.updated_at, edited_at);
    assert_eq!(merged.created_at, record.created_at);

    // The same file again changes nothing.
    let again = laptop
        .engine
        .import_file(incremental.path.as_ref().unwrap())
        .await
        .unwrap();
    assert_eq!(
        again,
        ImportReport {
            inserted: 0,
            updated: 0,
            skipped: 1
        }
    );

    // Nothing changed on the tablet since its last export.
    let empty = tablet
        .engine
        .export(ExportMode::Incremental)
        .await
        .unwrap();
    assert!(empty.records.is_empty());
}

#[tokio::test]
async fn test_older_incoming_version_does_not_overwrite() {
    let device = TestDevice::new().await;
    let payload = json!({
        "exportedAt": "2026-02-01T00:00:00.000Z",
        "records": [{
            "id": "ave-verum",
            "title": "Ave verum corpus",
            "composer": "Mozart",
            "updatedAt": "2026-02-01T00:00:00.000Z"
        }]
    });
    device
        .engine
        .import_snapshot(&payload.to_string())
        .await
        .unwrap();

    let stale = json!([{
        "id": "ave-verum",
        "title": "Ave Verum",
        "updatedAt": "2026-01-01T00:00:00.000Z"
    }]);
    let report = device
        .engine
        .import_snapshot(&stale.to_string())
        .await
        .unwrap();
    assert_eq!(report.skipped, 1);
    let stored = device.store.get("ave-verum").await.unwrap().unwrap();
    assert_eq!(stored.title, "Ave verum corpus");
    assert_eq!(stored.composer, "Mozart");
}

#[tokio::test]
async fn test_newer_partial_record_keeps_unmentioned_fields() {
    let device = TestDevice::new().await;
    let original = json!([{
        "id": 17,
        "title": "Locus iste",
        "composer": "Bruckner",
        "tags": ["motet"],
        "createdAt": "2025-11-01T10:00:00.000Z"
    }]);
    device
        .engine
        .import_snapshot(&original.to_string())
        .await
        .unwrap();

    let newer = json!([{
        "id": 17,
        "voicing": "SATB",
        "updatedAt": "2025-12-01T10:00:00.000Z"
    }]);
    let report = device
        .engine
        .import_snapshot(&newer.to_string())
        .await
        .unwrap();
    assert_eq!(report.updated, 1);

    let stored = device.store.get("17").await.unwrap().unwrap();
    assert_eq!(stored.title, "Locus iste");
    assert_eq!(stored.composer, "Bruckner");
    assert_eq!(stored.voicing, "SATB");
    assert_eq!(stored.tags, vec!["motet"]);
    assert_eq!(stored.created_at, "2025-11-01T10:00:00.000Z");
    assert_eq!(stored.updated_at, "2025-12-01T10:00:00.000Z");
}

#[tokio::test]
async fn test_invalid_file_leaves_store_and_watermark_alone() {
    let device = TestDevice::new().await;
    let path = device.dir.path().join("not-a-snapshot.json");
    tokio::fs::write(&path, r#"{"scores": []}"#).await.unwrap();

    let err = device.engine.import_file(&path).await.unwrap_err();
    assert!(matches!(err, CatalogError::InvalidFormat(_)));
    assert_eq!(device.store.count().await.unwrap(), 0);
    assert_eq!(device.watermark.get().await.unwrap(), "");
}

#[tokio::test]
async fn test_watermark_survives_reopening() {
    let device = TestDevice::new().await;
    device.engine.export(ExportMode::Full).await.unwrap();
    let watermark = device.watermark.get().await.unwrap();
    assert_eq!(
        chrono::DateTime::parse_from_rfc3339(&watermark).unwrap(),
        chrono::DateTime::parse_from_rfc3339(START_TIME).unwrap()
    );

    let reopened =
        sheetmusic_catalog::SqliteWatermarkStore::open(device.dir.path().join("state.db"))
            .await
            .unwrap();
    assert_eq!(reopened.get().await.unwrap(), watermark);
}

#[tokio::test]
async fn test_catalog_survives_reopening_and_migration_is_idempotent() {
    let device = TestDevice::new().await;
    let record = magnificat(&format_timestamp(&device.clock.now()));
    device.store.insert(&record).await.unwrap();
    let first = device.store.migration().to_version;
    drop(device.engine);
    drop(device.store);

    let reopened = SqliteRecordStore::open(device.dir.path().join("catalog.db"))
        .await
        .unwrap();
    assert_eq!(reopened.migration().from_version, first);
    assert_eq!(reopened.migration().to_version, first);
    assert!(reopened.migration().created_indices.is_empty());

    let rerun = reopened.migrate().await.unwrap();
    assert_eq!(rerun.to_version, first);

    let by_tag = reopened.find_by_index("tags", "canticle").await.unwrap();
    assert_eq!(by_tag, vec![record.clone()]);
    let by_composer = reopened.find_by_index("composer", "Stanford").await.unwrap();
    assert_eq!(by_composer.len(), 1);
    let snapshot_json: Value = serde_json::to_value(&by_composer[0]).unwrap();
    assert_eq!(snapshot_json["yearPublished"], 1918);
    assert_eq!(snapshot_json["licenseCount"], 24);
}
