//! Timestamp parsing
//!
//! The replication state document writes timestamps as
//! `2024-03-01 17:55:01.000000000 +00:00` while changeset attributes use
//! RFC 3339 (`2024-03-01T17:55:01Z`). Both grammars are accepted everywhere
//! a timestamp appears, so the state client and the extractor stay in
//! agreement about what "parseable" means.

use chrono::{DateTime, Utc};

use crate::error::{ChxError, Result};

const STATE_DOCUMENT_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f %z";

/// Parse a feed timestamp into UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }

    DateTime::parse_from_str(raw, STATE_DOCUMENT_FORMAT)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| ChxError::Timestamp(format!("{:?}: {}", raw, e)))
}
