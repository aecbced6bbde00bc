//! Feed state client
//!
//! The feed publishes its cursor as a plain-text, line-oriented
//! `key: value` document with at least a `sequence` number and a
//! `last_run` timestamp. The cursor is fetched fresh on every call so a
//! long backfill observes feed advances.

use chrono::{DateTime, Utc};
use chx_common::time::parse_timestamp;
use tracing::debug;

use super::{ReplicationError, Result};
use crate::config::ReplicationConfig;
use crate::models::FeedCursor;

/// Client for the remote feed's state document
pub struct FeedStateClient {
    client: reqwest::Client,
    state_url: String,
}

impl FeedStateClient {
    /// Create a new client from the replication configuration
    pub fn new(config: &ReplicationConfig) -> Result<Self> {
        Ok(Self {
            client: config.http_client()?,
            state_url: config.state_url(),
        })
    }

    /// Fetch the feed's current cursor.
    ///
    /// Fails with [`ReplicationError::FeedUnavailable`] when the document
    /// cannot be fetched and [`ReplicationError::FeedMalformed`] when it
    /// lacks a parseable sequence number or timestamp.
    pub async fn current_cursor(&self) -> Result<FeedCursor> {
        let response = self
            .client
            .get(self.state_url.as_str())
            .send()
            .await?
            .error_for_status()?;
        let body = response.text().await?;

        let cursor = parse_state_document(&body)?;
        debug!(
            sequence = cursor.sequence,
            last_run = %cursor.last_run,
            "fetched feed cursor"
        );
        Ok(cursor)
    }

    /// Estimate the sequence number whose delta file covers `target`.
    ///
    /// The feed advances by roughly one sequence per minute, so the
    /// estimate subtracts the elapsed whole minutes between the cursor's
    /// production time and `target`. The result is a conservative lower
    /// bound: its file holds changesets at or before `target`, never
    /// strictly after, but the walk from it may re-cover ground the sink
    /// already has (upserts make that harmless).
    pub async fn estimate_sequence_for(&self, target: DateTime<Utc>) -> Result<i64> {
        let cursor = self.current_cursor().await?;
        let elapsed_minutes = (cursor.last_run - target).num_seconds().div_euclid(60);
        Ok((cursor.sequence - elapsed_minutes).max(0))
    }
}

/// Parse the line-oriented `key: value` state document
fn parse_state_document(body: &str) -> Result<FeedCursor> {
    let mut sequence: Option<&str> = None;
    let mut last_run: Option<&str> = None;

    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with("---") {
            continue;
        }
        // Timestamps contain colons, so only the first one splits key
        // from value.
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        match key.trim() {
            "sequence" => sequence = Some(value.trim()),
            "last_run" => last_run = Some(value.trim()),
            _ => {}
        }
    }

    let sequence = sequence
        .ok_or_else(|| ReplicationError::FeedMalformed("missing sequence".to_string()))?
        .parse::<i64>()
        .map_err(|e| ReplicationError::FeedMalformed(format!("bad sequence: {}", e)))?;
    if sequence < 0 {
        return Err(ReplicationError::FeedMalformed(format!(
            "negative sequence: {}",
            sequence
        )));
    }

    let last_run = last_run
        .ok_or_else(|| ReplicationError::FeedMalformed("missing last_run".to_string()))?;
    let last_run = parse_timestamp(last_run)
        .map_err(|e| ReplicationError::FeedMalformed(format!("bad last_run: {}", e)))?;

    Ok(FeedCursor { sequence, last_run })
}
