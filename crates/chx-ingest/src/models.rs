//! Domain models for changeset ingestion

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// User name recorded for changesets without attribution
pub const ANONYMOUS_USER: &str = "anonymous";

/// One changeset from the feed, normalized for persistence.
///
/// `id` is the natural key; everything else tolerates absence in the raw
/// markup. A missing attribution becomes `user_id = 0` /
/// `user_name = "anonymous"`, a missing bounding box becomes four zeros
/// (the group is all-or-nothing), and missing timestamps stay `None`
/// rather than being inferred.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangesetRecord {
    pub id: i64,
    pub user_id: i32,
    pub user_name: String,
    pub created_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub num_changes: Option<i32>,
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
    pub tags: HashMap<String, String>,
}

impl ChangesetRecord {
    /// Whether the record carries real attribution or the anonymous default
    pub fn is_anonymous(&self) -> bool {
        self.user_id == 0 && self.user_name == ANONYMOUS_USER
    }
}

/// The remote feed's published cursor: the newest available delta file and
/// when it was produced. Fetched fresh on every resolution request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedCursor {
    pub sequence: i64,
    pub last_run: DateTime<Utc>,
}

/// Outcome of one pipeline run over a record stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Records in batches the sink accepted
    pub committed: usize,
    /// Batches the sink rejected; their records are not retried
    pub failed_batches: usize,
}

impl IngestReport {
    pub fn merge(&mut self, other: IngestReport) {
        self.committed += other.committed;
        self.failed_batches += other.failed_batches;
    }
}

/// Outcome of one catch-up run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    /// First sequence of the walk (inclusive)
    pub start_sequence: i64,
    /// Remote cursor captured at the start of the run (inclusive)
    pub end_sequence: i64,
    /// Sequences whose delta file was fetched and ingested
    pub sequences_processed: usize,
    /// Sequences skipped because their delta file could not be retrieved
    pub fetch_failures: usize,
    /// Records committed across all sequences
    pub committed: usize,
    /// Batches rejected across all sequences
    pub failed_batches: usize,
}
