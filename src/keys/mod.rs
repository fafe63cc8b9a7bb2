//! Composite key encoding for the projection layout.
//!
//! Every access pattern maps to a `(partition key, sort key)` pair. The formats
//! below are read by external tools that inspect the store directly, so they must
//! stay byte-stable:
//!
//! | Pattern  | Partition key            | Sort key          | Index          |
//! |----------|--------------------------|-------------------|----------------|
//! | Category | `CATEGORY#<category>`    | `<date>#<id>`     | primary        |
//! | Paper    | `PAPER#<id>`             | `A`               | `PaperIdIndex` |
//! | Author   | `AUTHOR#<name>`          | `<date>#<id>`     | `AuthorIndex`  |
//! | Keyword  | `KEYWORD#<keyword>`      | `<date>#<id>`     | `KeywordIndex` |
//!
//! Dates are fixed-width ISO dates, so lexical order on sort keys equals
//! chronological order and a reverse scan yields newest first.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::models::{ProjectionKind, SecondaryKey};

/// Sort key of the single canonical row of a paper.
pub const CANONICAL_SORT_KEY: &str = "A";

/// Suffix lexically greater than any id, closing an inclusive date range.
pub const HIGH_SENTINEL: &str = "zzzzzzz";

/// Secondary index serving the author pattern.
pub const AUTHOR_INDEX: &str = "AuthorIndex";

/// Secondary index serving id lookups.
pub const PAPER_ID_INDEX: &str = "PaperIdIndex";

/// Secondary index serving the keyword pattern.
pub const KEYWORD_INDEX: &str = "KeywordIndex";

/// Partition key for a category.
pub fn category_partition(category: &str) -> String {
    format!("{}{}", ProjectionKind::Category.prefix(), category)
}

/// Partition key for the canonical paper row.
pub fn paper_partition(arxiv_id: &str) -> String {
    format!("{}{}", ProjectionKind::Paper.prefix(), arxiv_id)
}

/// Partition key for an author.
pub fn author_partition(author: &str) -> String {
    format!("{}{}", ProjectionKind::Author.prefix(), author)
}

/// Partition key for a keyword. The keyword is lowercased.
pub fn keyword_partition(keyword: &str) -> String {
    format!("{}{}", ProjectionKind::Keyword.prefix(), keyword.to_lowercase())
}

/// Sort key ordering items of a partition by publication date.
pub fn dated_sort_key(date: &str, arxiv_id: &str) -> String {
    format!("{}#{}", date, arxiv_id)
}

/// Inclusive sort key bounds covering every item dated `start..=end`.
pub fn date_range_bounds(start: &str, end: &str) -> (String, String) {
    (format!("{}#", start), format!("{}#{}", end, HIGH_SENTINEL))
}

/// Name of the secondary index backing a projection kind, if any.
pub fn index_for(kind: ProjectionKind) -> Option<&'static str> {
    match kind {
        ProjectionKind::Category => None,
        ProjectionKind::Paper => Some(PAPER_ID_INDEX),
        ProjectionKind::Author => Some(AUTHOR_INDEX),
        ProjectionKind::Keyword => Some(KEYWORD_INDEX),
    }
}

/// A fully encoded storage key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedKey {
    pub partition_key: String,
    pub sort_key: String,
    pub secondary: Option<SecondaryKey>,
}

/// Encode the storage key for one projection of a paper.
///
/// Index-backed patterns project into their secondary index under the same key
/// pair as the primary key.
///
/// # Arguments
/// * `kind` - The access pattern
/// * `pattern_key` - Category, author name or keyword; ignored for `Paper`
/// * `date` - Normalized publication date
/// * `arxiv_id` - Paper identifier
pub fn encode(kind: ProjectionKind, pattern_key: &str, date: &str, arxiv_id: &str) -> EncodedKey {
    let (partition_key, sort_key) = match kind {
        ProjectionKind::Paper => (paper_partition(arxiv_id), CANONICAL_SORT_KEY.to_string()),
        ProjectionKind::Category => (category_partition(pattern_key), dated_sort_key(date, arxiv_id)),
        ProjectionKind::Author => (author_partition(pattern_key), dated_sort_key(date, arxiv_id)),
        ProjectionKind::Keyword => (keyword_partition(pattern_key), dated_sort_key(date, arxiv_id)),
    };

    let secondary = index_for(kind).map(|index| SecondaryKey {
        index: index.to_string(),
        partition_key: partition_key.clone(),
        sort_key: sort_key.clone(),
    });

    EncodedKey {
        partition_key,
        sort_key,
        secondary,
    }
}

/// Result of normalizing a publication timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizedDate {
    /// The input was a date, or a timestamp that parsed cleanly
    Parsed(String),

    /// The input could not be parsed; holds its first ten characters
    Truncated(String),
}

impl NormalizedDate {
    pub fn as_str(&self) -> &str {
        match self {
            NormalizedDate::Parsed(date) | NormalizedDate::Truncated(date) => date,
        }
    }

    pub fn into_string(self) -> String {
        match self {
            NormalizedDate::Parsed(date) | NormalizedDate::Truncated(date) => date,
        }
    }

    pub fn is_truncated(&self) -> bool {
        matches!(self, NormalizedDate::Truncated(_))
    }
}

/// Normalize a publication timestamp to `YYYY-MM-DD`.
///
/// A ten-character date literal is accepted as-is. Anything else is parsed as an
/// ISO-8601 timestamp and truncated to its date in the timestamp's own offset.
/// Unparseable input falls back to its first ten characters, which may not sort
/// chronologically; callers decide whether to accept that.
pub fn normalize_date(raw: &str) -> NormalizedDate {
    let bytes = raw.as_bytes();
    if bytes.len() == 10 && bytes[4] == b'-' && bytes[7] == b'-' {
        return NormalizedDate::Parsed(raw.to_string());
    }

    match parse_timestamp_date(raw) {
        Some(date) => NormalizedDate::Parsed(date.format("%Y-%m-%d").to_string()),
        None => NormalizedDate::Truncated(raw.chars().take(10).collect()),
    }
}

fn parse_timestamp_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.date_naive());
    }

    let naive = trimmed.trim_end_matches('Z');
    for format in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(naive, format) {
            return Some(dt.date());
        }
    }

    NaiveDate::parse_from_str(naive, "%Y-%m-%d").ok()
}

/// Validate that a query boundary is a real `YYYY-MM-DD` date.
pub fn parse_query_date(value: &str) -> Option<NaiveDate> {
    if value.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}
