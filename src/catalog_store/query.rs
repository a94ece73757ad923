//! In-memory search and ordering over a list of records, as shown to the user.

use super::models::Record;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SortKey {
    #[default]
    Title,
    Composer,
    Arranger,
    Publisher,
    Voicing,
    LiturgicalSeason,
    /// Newest first, records without a year last.
    YearPublished,
    /// Most recent first.
    LastPerformedDate,
}

/// Case-insensitive substring match over the descriptive fields and tags.
/// A blank query matches everything.
pub fn filter_records(records: Vec<Record>, query: &str) -> Vec<Record> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return records;
    }

    records
        .into_iter()
        .filter(|record| {
            let year = record
                .year_published
                .map(|y| y.to_string())
                .unwrap_or_default();
            let matched = [
                record.title.as_str(),
                record.composer.as_str(),
                record.arranger.as_str(),
                record.publisher.as_str(),
                record.voicing.as_str(),
                record.liturgical_season.as_str(),
                year.as_str(),
                record.last_performed_date.as_str(),
            ]
            .into_iter()
            .chain(record.tags.iter().map(String::as_str))
            .any(|value| value.to_lowercase().contains(&query));
            matched
        })
        .collect()
}

pub fn sort_records(mut records: Vec<Record>, sort_by: SortKey) -> Vec<Record> {
    records.sort_by(|a, b| compare(a, b, sort_by));
    records
}

fn compare(a: &Record, b: &Record, sort_by: SortKey) -> Ordering {
    let text = |record: &Record| -> String {
        match sort_by {
            SortKey::Composer => &record.composer,
            SortKey::Arranger => &record.arranger,
            SortKey::Publisher => &record.publisher,
            SortKey::Voicing => &record.voicing,
            SortKey::LiturgicalSeason => &record.liturgical_season,
            _ => &record.title,
        }
        .to_lowercase()
    };

    match sort_by {
        SortKey::YearPublished => b
            .year_published
            .unwrap_or(0)
            .cmp(&a.year_published.unwrap_or(0)),
        SortKey::LastPerformedDate => b.last_performed_date.cmp(&a.last_performed_date),
        _ => text(a).cmp(&text(b)),
    }
}
