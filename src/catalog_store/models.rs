//! The catalog record and the normalization every write goes through.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One sheet-music catalog entry.
///
/// Serialized with camelCase keys; this is also the on-disk shape of a
/// record inside a snapshot file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: String,
    pub title: String,
    pub composer: String,
    pub arranger: String,
    pub publisher: String,
    pub voicing: String,
    pub liturgical_season: String,
    pub tags: Vec<String>,
    pub year_published: Option<i64>,
    pub last_performed_date: String,
    pub license_count: u64,
    pub notes: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Record {
    /// Normalizes a raw JSON record. Returns `None` when it has no usable id.
    ///
    /// `now` fills `createdAt`/`updatedAt` when neither is present.
    pub fn normalize(raw: &Value, now: &str) -> Option<Record> {
        let fields = raw.as_object()?;
        let id = record_id(raw)?;
        Some(Self::from_fields(id, fields, now))
    }

    fn from_fields(id: String, fields: &Map<String, Value>, now: &str) -> Record {
        let created_at = non_empty(fields, "createdAt")
            .or_else(|| non_empty(fields, "updatedAt"))
            .unwrap_or_else(|| now.to_string());
        let updated_at = non_empty(fields, "updatedAt").unwrap_or_else(|| created_at.clone());

        Record {
            id,
            title: trimmed_text(fields.get("title")),
            composer: trimmed_text(fields.get("composer")),
            arranger: trimmed_text(fields.get("arranger")),
            publisher: trimmed_text(fields.get("publisher")),
            voicing: trimmed_text(fields.get("voicing")),
            liturgical_season: trimmed_text(fields.get("liturgicalSeason")),
            tags: tags(fields.get("tags")),
            year_published: number(fields.get("yearPublished"))
                .filter(|n| *n != 0.0)
                .map(|n| n.trunc() as i64),
            last_performed_date: text(fields.get("lastPerformedDate")),
            license_count: number(fields.get("licenseCount"))
                .filter(|n| *n > 0.0)
                .map(|n| n.trunc() as u64)
                .unwrap_or(0),
            notes: text(fields.get("notes")),
            created_at,
            updated_at,
        }
    }

    /// The timestamp used for last-write-wins and incremental export.
    pub fn modified_at(&self) -> &str {
        if self.updated_at.is_empty() {
            &self.created_at
        } else {
            &self.updated_at
        }
    }

    pub fn to_json(&self) -> Value {
        // Serializing a struct of strings and numbers cannot fail.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Raw form input for a brand new record, before normalization.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRecord {
    pub title: String,
    pub composer: String,
    pub arranger: String,
    pub publisher: String,
    pub voicing: String,
    pub liturgical_season: String,
    pub tags: Vec<String>,
    pub year_published: Option<String>,
    pub last_performed_date: String,
    pub license_count: Option<String>,
    pub notes: String,
}

impl NewRecord {
    /// Assigns a fresh id and runs the same normalization as imports do.
    pub fn into_record(self, now: &str) -> Record {
        let fields = match serde_json::to_value(&self) {
            Ok(Value::Object(fields)) => fields,
            _ => Map::new(),
        };
        Record::from_fields(uuid::Uuid::new_v4().to_string(), &fields, now)
    }
}

/// Extracts the id of a raw record. Missing, empty, zero and non-scalar ids
/// all count as absent.
pub fn record_id(raw: &Value) -> Option<String> {
    match raw.get("id")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        _ => None,
    }
}

fn text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(true)) => "true".to_string(),
        _ => String::new(),
    }
}

fn trimmed_text(value: Option<&Value>) -> String {
    text(value).trim().to_string()
}

fn non_empty(fields: &Map<String, Value>, key: &str) -> Option<String> {
    let value = text(fields.get(key));
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn number(value: Option<&Value>) -> Option<f64> {
    let n = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        Value::Bool(true) => 1.0,
        _ => return None,
    };
    if n.is_finite() {
        Some(n)
    } else {
        None
    }
}

fn tags(value: Option<&Value>) -> Vec<String> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .filter(|tag| !tag.is_empty())
        .collect()
}
