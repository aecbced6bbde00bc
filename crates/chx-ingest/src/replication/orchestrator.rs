//! Backfill orchestration
//!
//! Catches a local store up to the remote feed. One run resolves the
//! range once (start from the sink's last committed timestamp, stop at
//! the cursor captured up front) and walks it sequence by sequence.
//! The cursor is not re-queried mid-walk: if the feed advances faster
//! than ingestion, the next run picks up the difference instead of this
//! one chasing it forever.

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use super::extractor::{stream_changesets, Compression};
use super::paths;
use super::pipeline::ChangesetPipeline;
use super::state::FeedStateClient;
use super::Result;
use crate::config::ReplicationConfig;
use crate::fetch::Fetch;
use crate::models::{BackfillReport, FeedCursor, IngestReport};
use crate::sink::ChangesetSink;

/// Phases of one catch-up run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackfillState {
    Idle,
    ResolvingCursor,
    Walking,
    Draining,
    Done,
    Failed,
}

impl BackfillState {
    pub fn as_str(&self) -> &str {
        match self {
            BackfillState::Idle => "idle",
            BackfillState::ResolvingCursor => "resolving_cursor",
            BackfillState::Walking => "walking",
            BackfillState::Draining => "draining",
            BackfillState::Done => "done",
            BackfillState::Failed => "failed",
        }
    }
}

/// Drives extractor and pipeline across the missing sequence range
pub struct BackfillOrchestrator<S, F> {
    config: ReplicationConfig,
    state_client: FeedStateClient,
    fetcher: F,
    sink: S,
    state: BackfillState,
}

impl<S: ChangesetSink, F: Fetch> BackfillOrchestrator<S, F> {
    pub fn new(config: ReplicationConfig, fetcher: F, sink: S) -> Result<Self> {
        let state_client = FeedStateClient::new(&config)?;
        Ok(Self {
            config,
            state_client,
            fetcher,
            sink,
            state: BackfillState::Idle,
        })
    }

    /// Current phase of the run
    pub fn state(&self) -> BackfillState {
        self.state
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Run one catch-up pass.
    ///
    /// Feed-state resolution failures abort the run; a fetch failure for
    /// one sequence only skips that sequence, and batch rejections only
    /// show up as counts in the report.
    pub async fn run(&mut self) -> Result<BackfillReport> {
        self.state = BackfillState::ResolvingCursor;
        let (start, cursor) = match self.resolve_range().await {
            Ok(range) => range,
            Err(err) => {
                self.state = BackfillState::Failed;
                return Err(err);
            }
        };

        let stop = cursor.sequence;
        let mut report = BackfillReport {
            start_sequence: start,
            end_sequence: stop,
            ..Default::default()
        };

        self.state = BackfillState::Walking;
        if start > stop {
            info!(start, stop, "store is already at the remote cursor");
        } else {
            info!(start, stop, "walking {} sequences", stop - start + 1);
            let bar = walk_progress_bar((stop - start + 1) as u64);

            for sequence in start..=stop {
                match self.ingest_sequence(sequence).await {
                    Ok(ingest) => {
                        report.sequences_processed += 1;
                        report.committed += ingest.committed;
                        report.failed_batches += ingest.failed_batches;
                    }
                    Err(err) => {
                        report.fetch_failures += 1;
                        warn!(sequence, error = %err, "delta fetch failed, skipping sequence");
                    }
                }
                bar.inc(1);
            }
            bar.finish_and_clear();
        }

        self.state = BackfillState::Draining;
        info!(
            sequences = report.sequences_processed,
            committed = report.committed,
            failed_batches = report.failed_batches,
            fetch_failures = report.fetch_failures,
            "catch-up walk complete"
        );

        self.state = BackfillState::Done;
        Ok(report)
    }

    /// Resolve the walk range: where the sink got to, and where the feed
    /// is now. The sink's timestamp is read once and never re-read
    /// mid-walk.
    async fn resolve_range(&self) -> Result<(i64, FeedCursor)> {
        let last_committed = self.sink.last_committed_closed_at().await?;
        let start = match last_committed {
            Some(closed_at) => {
                let estimate = self.state_client.estimate_sequence_for(closed_at).await?;
                info!(%closed_at, estimate, "estimated resume sequence from sink");
                estimate
            }
            None => {
                info!("sink is empty, starting at the feed origin");
                0
            }
        };
        let cursor = self.state_client.current_cursor().await?;
        Ok((start, cursor))
    }

    /// Fetch one delta file and run it through extraction and batching
    async fn ingest_sequence(&self, sequence: i64) -> Result<IngestReport> {
        let url = paths::locate(&self.config.base_url, sequence);
        let body = self.fetcher.fetch(&url).await?;

        let records = stream_changesets(body, Compression::Gzip, self.config.limit);
        let mut pipeline = ChangesetPipeline::stderr();
        Ok(pipeline
            .ingest(&self.sink, records, self.config.batch_size)
            .await)
    }
}

fn walk_progress_bar(length: u64) -> ProgressBar {
    let bar = ProgressBar::new(length);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta})")
    {
        bar.set_style(style.progress_chars("#>-"));
    }
    bar
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::HttpFetcher;
    use crate::sink::MemorySink;

    // The walk itself is covered end to end against a mock feed in
    // tests/replication_e2e_tests.rs; here only the state labels.

    #[test]
    fn test_state_labels() {
        assert_eq!(BackfillState::Idle.as_str(), "idle");
        assert_eq!(BackfillState::ResolvingCursor.as_str(), "resolving_cursor");
        assert_eq!(BackfillState::Done.as_str(), "done");
    }

    #[tokio::test]
    async fn test_new_orchestrator_starts_idle() {
        let config = ReplicationConfig::default();
        let fetcher = HttpFetcher::new(&config).unwrap();
        let orchestrator = BackfillOrchestrator::new(config, fetcher, MemorySink::new()).unwrap();
        assert_eq!(orchestrator.state(), BackfillState::Idle);
    }
}
