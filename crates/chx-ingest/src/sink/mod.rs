//! Record sink contract and implementations
//!
//! A sink is an explicitly owned value injected into the pipeline and
//! orchestrator, so independent runs and tests can use independent sinks.

pub mod memory;
pub mod postgres;

// Re-export main types
pub use memory::MemorySink;
pub use postgres::PostgresSink;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::ChangesetRecord;

/// Result type for sink operations
pub type Result<T> = std::result::Result<T, SinkError>;

/// Error types for sink operations
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("sink rejected batch: {0}")]
    Rejected(String),
}

/// Destination for normalized changeset records.
///
/// Submissions upsert by changeset id: re-submitting an id overwrites the
/// stored row, never duplicates it. That makes batch submission
/// order-independent and lets a later catch-up run safely re-cover ground
/// an earlier one already committed.
#[async_trait]
pub trait ChangesetSink: Send + Sync {
    /// `closed_at` of the most recently committed changeset, or `None`
    /// for an empty store.
    async fn last_committed_closed_at(&self) -> Result<Option<DateTime<Utc>>>;

    /// Persist one batch as a single atomic unit.
    async fn submit_batch(&self, records: &[ChangesetRecord]) -> Result<()>;
}
