// Changeset replication ingest module
//
// Catch-up engine for the minutely changeset feed. The feed publishes a
// state document (current sequence number + production time) and one
// gzip-compressed XML delta file per sequence. A catch-up run asks the
// sink how far it got, estimates the matching sequence number, and walks
// forward to the remote cursor:
//
// - Resolve: sequence number -> delta file URL (paths)
// - State: fetch and parse the remote cursor (state)
// - Extract: stream changeset records out of a delta file (extractor)
// - Ingest: bounded batches with upsert-by-id semantics (pipeline)
// - Orchestrate: the walk itself (orchestrator)
//
// Per-record and per-batch failures are absorbed locally and surfaced as
// aggregate counts; only feed-state resolution failures before the walk
// begins abort a run.

pub mod extractor;
pub mod orchestrator;
pub mod paths;
pub mod pipeline;
pub mod state;

// Re-export main types
pub use extractor::{stream_changesets, ChangesetExtractor, Compression};
pub use orchestrator::{BackfillOrchestrator, BackfillState};
pub use pipeline::ChangesetPipeline;
pub use state::FeedStateClient;

/// Records per sink submission unless configured otherwise
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Result type for replication operations
pub type Result<T> = std::result::Result<T, ReplicationError>;

/// Error types for replication ingestion
#[derive(Debug, thiserror::Error)]
pub enum ReplicationError {
    /// Transport failure reaching the feed. Retryable by the caller, not
    /// by this engine.
    #[error("feed unavailable: {0}")]
    FeedUnavailable(#[from] reqwest::Error),

    /// The state document was fetched but lacks a usable sequence number
    /// or timestamp. Fatal for the current run.
    #[error("feed state malformed: {0}")]
    FeedMalformed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Sink(#[from] crate::sink::SinkError),
}
