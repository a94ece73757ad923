//! The portable snapshot file exchanged between installations.

use crate::catalog_store::Record;
use crate::error::{CatalogError, CatalogResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExportMode {
    Full,
    Incremental,
}

impl ExportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportMode::Full => "full",
            ExportMode::Incremental => "incremental",
        }
    }
}

impl fmt::Display for ExportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub schema_version: u32,
    pub mode: ExportMode,
    /// Watermark at export time, `""` when there was none.
    pub since: String,
    pub exported_at: String,
    pub records: Vec<Record>,
}

impl Snapshot {
    pub fn to_pretty_json(&self) -> CatalogResult<String> {
        Ok(serde_json::to_string_pretty(self).map_err(anyhow::Error::from)?)
    }

    /// `sheetmusic-full-export-2024-01-31T12-00-00-000Z.json`
    pub fn file_name(&self) -> String {
        format!(
            "sheetmusic-{}-export-{}.json",
            self.mode,
            self.exported_at.replace([':', '.'], "-")
        )
    }
}

/// An import payload after shape checking. Records are kept raw because
/// field-level merging needs to know which keys the sender actually wrote.
#[derive(Debug, Clone)]
pub struct IncomingPayload {
    pub exported_at: Option<String>,
    pub records: Vec<Value>,
}

impl IncomingPayload {
    /// Accepts either a bare array of records or an object with a `records`
    /// array. Anything else is `InvalidFormat`.
    pub fn parse(text: &str) -> CatalogResult<Self> {
        let parsed: Value = serde_json::from_str(text)
            .map_err(|err| CatalogError::InvalidFormat(format!("Not valid JSON: {}", err)))?;

        match parsed {
            Value::Array(records) => Ok(Self {
                exported_at: None,
                records,
            }),
            Value::Object(mut fields) => {
                let exported_at = fields
                    .get("exportedAt")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                match fields.remove("records") {
                    Some(Value::Array(records)) => Ok(Self {
                        exported_at,
                        records,
                    }),
                    _ => Err(missing_records()),
                }
            }
            _ => Err(missing_records()),
        }
    }
}

fn missing_records() -> CatalogError {
    CatalogError::InvalidFormat(
        "Import file must contain a records array or a top-level array.".to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_array() {
        let payload = IncomingPayload::parse(r#"[{"id": "a"}, {"id": "b"}]"#).unwrap();
        assert_eq!(payload.records.len(), 2);
        assert!(payload.exported_at.is_none());
    }

    #[test]
    fn test_parse_snapshot_object() {
        let payload = IncomingPayload::parse(
            r#"{"schemaVersion": 1, "mode": "full", "since": "",
                "exportedAt": "2024-05-01T00:00:00.000Z", "records": [{"id": "a"}]}"#,
        )
        .unwrap();
        assert_eq!(payload.records.len(), 1);
        assert_eq!(
            payload.exported_at.as_deref(),
            Some("2024-05-01T00:00:00.000Z")
        );
    }

    #[test]
    fn test_parse_rejects_other_shapes() {
        for text in [
            r#"{"records": {"id": "a"}}"#,
            r#"{"items": []}"#,
            r#""records""#,
            "42",
            "null",
            "{not json",
        ] {
            let err = IncomingPayload::parse(text).unwrap_err();
            assert!(
                matches!(err, CatalogError::InvalidFormat(_)),
                "expected InvalidFormat for {}",
                text
            );
        }
    }

    #[test]
    fn test_file_name_replaces_separators() {
        let snapshot = Snapshot {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            mode: ExportMode::Incremental,
            since: String::new(),
            exported_at: "2024-01-31T12:00:00.000Z".to_string(),
            records: vec![],
        };
        assert_eq!(
            snapshot.file_name(),
            "sheetmusic-incremental-export-2024-01-31T12-00-00-000Z.json"
        );
    }

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let snapshot = Snapshot {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            mode: ExportMode::Full,
            since: String::new(),
            exported_at: "2024-01-31T12:00:00.000Z".to_string(),
            records: vec![],
        };
        let value: Value = serde_json::from_str(&snapshot.to_pretty_json().unwrap()).unwrap();
        assert_eq!(value["schemaVersion"], 1);
        assert_eq!(value["mode"], "full");
        assert_eq!(value["exportedAt"], "2024-01-31T12:00:00.000Z");
        assert!(value["records"].as_array().unwrap().is_empty());
    }
}
