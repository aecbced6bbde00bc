//! Bounded-batch submission of changesets to a sink
//!
//! Records are taken from the stream as they arrive and pushed to the
//! sink whenever a full batch accumulates; the final partial batch is
//! flushed at end of stream. Each submission is independent: a rejected
//! batch is counted and left behind, never retried or re-queued, so the
//! pipeline holds at most one batch in memory at a time. A later
//! catch-up run re-covers anything behind the sink's last-committed
//! timestamp.

use futures::{Stream, StreamExt};
use std::io::{self, Write};
use tracing::{debug, warn};

use crate::models::{ChangesetRecord, IngestReport};
use crate::sink::ChangesetSink;

/// Marker written to the operator-visible stream per accepted batch
const MARK_COMMITTED: &[u8] = b".";
/// Marker written per rejected batch
const MARK_FAILED: &[u8] = b"x";

/// Batching layer between an extractor stream and a sink
pub struct ChangesetPipeline<W: Write> {
    marks: W,
}

impl ChangesetPipeline<io::Stderr> {
    /// Pipeline writing batch markers to stderr
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }
}

impl<W: Write> ChangesetPipeline<W> {
    /// Pipeline writing batch markers to `marks`
    pub fn new(marks: W) -> Self {
        Self { marks }
    }

    /// Drain `records`, submitting batches of `batch_size` to `sink`.
    ///
    /// An empty remainder is not submitted. Failed batches advance the
    /// pipeline; they only show up in the report's `failed_batches`.
    pub async fn ingest<S, R>(&mut self, sink: &S, records: R, batch_size: usize) -> IngestReport
    where
        S: ChangesetSink + ?Sized,
        R: Stream<Item = ChangesetRecord>,
    {
        let mut report = IngestReport::default();
        let mut batches = Box::pin(records.chunks(batch_size.max(1)));

        while let Some(batch) = batches.next().await {
            match sink.submit_batch(&batch).await {
                Ok(()) => {
                    report.committed += batch.len();
                    debug!(rows = batch.len(), "batch accepted");
                    self.mark(MARK_COMMITTED);
                }
                Err(err) => {
                    report.failed_batches += 1;
                    warn!(error = %err, rows = batch.len(), "batch rejected, not retrying");
                    self.mark(MARK_FAILED);
                }
            }
        }

        report
    }

    fn mark(&mut self, symbol: &[u8]) {
        // Progress marks are best-effort; a broken pipe must not stall
        // ingestion.
        self.marks.write_all(symbol).ok();
        self.marks.flush().ok();
    }
}
