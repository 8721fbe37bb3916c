//! Store objects and the flat listing format they are cached in.
//!
//! A listing is one object per line: `YYYY-MM-DD HH:MM:SS <size> <key>`, with
//! timestamps in UTC. A recursive bucket listing right-aligns the size column;
//! runs of spaces between the leading fields are accepted so either can be cached.

use std::fmt;

use serde::{Deserialize, Serialize};
use time::{format_description::FormatItem, macros::format_description};
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

const LISTING_TIMESTAMP: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// One object (or file) under a store prefix, as observed by a listing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreObject {
    /// Identifier of the backend that owns the object (e.g. `s3://bucket`).
    pub store_id: String,
    pub key: String,
    pub size: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub last_modified: OffsetDateTime,
}

impl StoreObject {
    pub fn new(
        store_id: impl Into<String>,
        key: impl Into<String>,
        size: u64,
        last_modified: OffsetDateTime,
    ) -> Self {
        Self {
            store_id: store_id.into(),
            key: key.into(),
            size,
            last_modified,
        }
    }

    /// Final path component of the key.
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}

impl fmt::Display for StoreObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.store_id.trim_end_matches('/'), self.key)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ListingError {
    #[error("listing line {line} is malformed: {reason}")]
    Malformed { line: usize, reason: String },
}

/// Render an object as a listing line (without trailing newline).
pub fn format_listing_line(object: &StoreObject) -> String {
    let stamp = object
        .last_modified
        .to_offset(UtcOffset::UTC)
        .format(LISTING_TIMESTAMP)
        .unwrap_or_else(|_| "1970-01-01 00:00:00".to_string());
    format!("{stamp} {} {}", object.size, object.key)
}

/// Parse one listing line. `line_no` is only used for error reporting.
pub fn parse_listing_line(
    store_id: &str,
    line: &str,
    line_no: usize,
) -> Result<StoreObject, ListingError> {
    let malformed = |reason: &str| ListingError::Malformed {
        line: line_no,
        reason: reason.to_string(),
    };
    let (date, rest) = next_field(line.trim_end());
    let (clock, rest) = next_field(rest);
    let (size, key) = next_field(rest);
    if date.is_empty() || clock.is_empty() || size.is_empty() {
        return Err(malformed("expected `<date> <time> <size> <key>`"));
    }
    let stamp = PrimitiveDateTime::parse(&format!("{date} {clock}"), LISTING_TIMESTAMP)
        .map_err(|err| malformed(&err.to_string()))?;
    let size = size
        .parse::<u64>()
        .map_err(|err| malformed(&format!("invalid size: {err}")))?;
    let key = key.trim_start();
    if key.is_empty() {
        return Err(malformed("empty key"));
    }
    Ok(StoreObject {
        store_id: store_id.to_string(),
        key: key.to_string(),
        size,
        last_modified: stamp.assume_utc(),
    })
}

/// Split off the first whitespace-delimited field; the rest keeps its inner spacing.
fn next_field(input: &str) -> (&str, &str) {
    let input = input.trim_start();
    match input.find(char::is_whitespace) {
        Some(end) => (&input[..end], &input[end..]),
        None => (input, ""),
    }
}
