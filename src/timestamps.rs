//! ISO-8601 timestamp helpers.
//!
//! Timestamps travel as strings (records and snapshots are JSON). Anything
//! that cannot be parsed compares as the epoch, so a malformed value is never
//! considered newer than a valid one.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Formats as `2024-01-31T12:00:00.000Z`.
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Accepts RFC 3339, zone-less date-times (taken as UTC) and plain dates.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Milliseconds since the epoch, 0 when absent or unparseable.
pub fn timestamp_millis(value: &str) -> i64 {
    parse_timestamp(value)
        .map(|dt| dt.timestamp_millis())
        .unwrap_or(0)
}

/// The latest of `values` re-formatted as ISO-8601, or `""` if none of them
/// is a timestamp after the epoch.
pub fn latest_timestamp<'a, I>(values: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    values
        .into_iter()
        .filter_map(parse_timestamp)
        .filter(|dt| dt.timestamp_millis() > 0)
        .max()
        .map(|dt| format_timestamp(&dt))
        .unwrap_or_default()
}
