//! End-to-end tests for the replication catch-up engine
//!
//! These run a full orchestration against a mock feed: state document,
//! gzip-compressed delta files, and an in-memory sink.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use flate2::write::GzEncoder;
use std::collections::HashMap;
use std::io::Write;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use chx_common::time::parse_timestamp;
use chx_ingest::config::ReplicationConfig;
use chx_ingest::fetch::HttpFetcher;
use chx_ingest::models::ChangesetRecord;
use chx_ingest::replication::{BackfillOrchestrator, BackfillState, ReplicationError};
use chx_ingest::sink::{ChangesetSink, MemorySink, Result as SinkResult, SinkError};

const CURSOR_TIME: &str = "2024-03-01T12:00:00Z";

fn cursor_time() -> DateTime<Utc> {
    parse_timestamp(CURSOR_TIME).unwrap()
}

fn state_body(sequence: i64) -> String {
    format!(
        "---\nlast_run: 2024-03-01 12:00:00.000000000 +00:00\nsequence: {}\n",
        sequence
    )
}

/// Two changesets per delta file, ids derived from the sequence number
fn delta_xml(sequence: i64) -> String {
    let first = sequence * 100 + 1;
    let second = sequence * 100 + 2;
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<osm version="0.6">
  <changeset id="{first}" uid="7" user="mapper" created_at="{CURSOR_TIME}" closed_at="{CURSOR_TIME}" num_changes="1">
    <tag k="comment" v="delta {sequence}"/>
  </changeset>
  <changeset id="{second}" created_at="{CURSOR_TIME}" closed_at="{CURSOR_TIME}" num_changes="2"/>
</osm>"#
    )
}

fn gzip(content: &str) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(content.as_bytes()).unwrap();
    encoder.finish().unwrap()
}

fn delta_path(sequence: i64) -> String {
    format!(
        "/{:03}/{:03}/{:03}.osm.gz",
        sequence / 1_000_000,
        (sequence / 1000) % 1000,
        sequence % 1000
    )
}

async fn mount_state(server: &MockServer, sequence: i64) {
    Mock::given(method("GET"))
        .and(path("/state.yaml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(state_body(sequence)))
        .mount(server)
        .await;
}

async fn mount_delta(server: &MockServer, sequence: i64) {
    Mock::given(method("GET"))
        .and(path(delta_path(sequence)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(gzip(&delta_xml(sequence))))
        .mount(server)
        .await;
}

fn seed_record(closed_at: DateTime<Utc>) -> ChangesetRecord {
    ChangesetRecord {
        id: 1,
        user_id: 7,
        user_name: "mapper".to_string(),
        created_at: Some(closed_at),
        closed_at: Some(closed_at),
        num_changes: Some(1),
        min_lon: 0.0,
        max_lon: 0.0,
        min_lat: 0.0,
        max_lat: 0.0,
        tags: HashMap::new(),
    }
}

fn test_config(base_url: String) -> ReplicationConfig {
    ReplicationConfig {
        base_url,
        ..Default::default()
    }
}

/// Sink rejecting any batch containing a specific changeset id
struct FlakySink {
    inner: MemorySink,
    poison_id: i64,
}

#[async_trait]
impl ChangesetSink for FlakySink {
    async fn last_committed_closed_at(&self) -> SinkResult<Option<DateTime<Utc>>> {
        self.inner.last_committed_closed_at().await
    }

    async fn submit_batch(&self, records: &[ChangesetRecord]) -> SinkResult<()> {
        if records.iter().any(|r| r.id == self.poison_id) {
            return Err(SinkError::Rejected("constraint violation".to_string()));
        }
        self.inner.submit_batch(records).await
    }
}

#[tokio::test]
async fn test_catch_up_walks_estimated_range_inclusive() {
    let server = MockServer::start().await;
    mount_state(&server, 500).await;
    for sequence in 490..=500 {
        mount_delta(&server, sequence).await;
    }

    // Ten minutes behind the cursor: the walk starts eleven files back.
    let sink = MemorySink::new();
    sink.insert(seed_record(cursor_time() - Duration::minutes(10)));

    let config = test_config(server.uri());
    let fetcher = HttpFetcher::new(&config).unwrap();
    let mut orchestrator = BackfillOrchestrator::new(config, fetcher, sink).unwrap();
    let report = orchestrator.run().await.unwrap();

    assert_eq!(orchestrator.state(), BackfillState::Done);
    assert_eq!(report.start_sequence, 490);
    assert_eq!(report.end_sequence, 500);
    assert_eq!(report.sequences_processed, 11);
    assert_eq!(report.fetch_failures, 0);
    assert_eq!(report.committed, 22);
    assert_eq!(report.failed_batches, 0);

    // 22 walked records plus the seed row.
    assert_eq!(orchestrator.sink().len(), 23);
    assert!(orchestrator.sink().get(49_001).is_some());
    assert!(orchestrator.sink().get(50_002).is_some());
}

#[tokio::test]
async fn test_missing_delta_file_is_skipped() {
    let server = MockServer::start().await;
    mount_state(&server, 500).await;
    for sequence in 490..=500 {
        if sequence != 495 {
            mount_delta(&server, sequence).await;
        }
    }

    let sink = MemorySink::new();
    sink.insert(seed_record(cursor_time() - Duration::minutes(10)));

    let config = test_config(server.uri());
    let fetcher = HttpFetcher::new(&config).unwrap();
    let mut orchestrator = BackfillOrchestrator::new(config, fetcher, sink).unwrap();
    let report = orchestrator.run().await.unwrap();

    // One unfetchable sequence must not stall the walk.
    assert_eq!(orchestrator.state(), BackfillState::Done);
    assert_eq!(report.fetch_failures, 1);
    assert_eq!(report.sequences_processed, 10);
    assert_eq!(report.committed, 20);
    assert!(orchestrator.sink().get(49_501).is_none());
    assert!(orchestrator.sink().get(49_601).is_some());
}

#[tokio::test]
async fn test_rejected_batch_does_not_stop_later_sequences() {
    let server = MockServer::start().await;
    mount_state(&server, 500).await;
    for sequence in 490..=500 {
        mount_delta(&server, sequence).await;
    }

    let sink = FlakySink {
        inner: MemorySink::new(),
        poison_id: 49_701,
    };
    sink.inner
        .insert(seed_record(cursor_time() - Duration::minutes(10)));

    let config = test_config(server.uri());
    let fetcher = HttpFetcher::new(&config).unwrap();
    let mut orchestrator = BackfillOrchestrator::new(config, fetcher, sink).unwrap();
    let report = orchestrator.run().await.unwrap();

    assert_eq!(orchestrator.state(), BackfillState::Done);
    assert_eq!(report.failed_batches, 1);
    assert_eq!(report.fetch_failures, 0);
    // Sequence 497's two records are gone with their batch; 498 onward
    // still committed.
    assert_eq!(report.committed, 20);
    assert!(orchestrator.sink().inner.get(49_701).is_none());
    assert!(orchestrator.sink().inner.get(49_801).is_some());
}

#[tokio::test]
async fn test_empty_sink_starts_at_feed_origin() {
    let server = MockServer::start().await;
    mount_state(&server, 2).await;
    for sequence in 0..=2 {
        mount_delta(&server, sequence).await;
    }

    let config = test_config(server.uri());
    let fetcher = HttpFetcher::new(&config).unwrap();
    let mut orchestrator =
        BackfillOrchestrator::new(config, fetcher, MemorySink::new()).unwrap();
    let report = orchestrator.run().await.unwrap();

    assert_eq!(report.start_sequence, 0);
    assert_eq!(report.end_sequence, 2);
    assert_eq!(report.sequences_processed, 3);
    assert_eq!(report.committed, 6);
}

#[tokio::test]
async fn test_unreachable_state_document_fails_the_run() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/state.yaml"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let config = test_config(server.uri());
    let fetcher = HttpFetcher::new(&config).unwrap();
    let mut orchestrator =
        BackfillOrchestrator::new(config, fetcher, MemorySink::new()).unwrap();
    let err = orchestrator.run().await.unwrap_err();

    assert!(matches!(err, ReplicationError::FeedUnavailable(_)));
    assert_eq!(orchestrator.state(), BackfillState::Failed);
}

#[tokio::test]
async fn test_malformed_state_document_fails_the_run() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/state.yaml"))
        .respond_with(ResponseTemplate::new(200).set_body_string("sequence: not-a-number\n"))
        .mount(&server)
        .await;

    let config = test_config(server.uri());
    let fetcher = HttpFetcher::new(&config).unwrap();
    let mut orchestrator =
        BackfillOrchestrator::new(config, fetcher, MemorySink::new()).unwrap();
    let err = orchestrator.run().await.unwrap_err();

    assert!(matches!(err, ReplicationError::FeedMalformed(_)));
    assert_eq!(orchestrator.state(), BackfillState::Failed);
}

#[tokio::test]
async fn test_load_dump_from_disk() {
    use bzip2::write::BzEncoder;
    use chx_ingest::replication::{stream_changesets, ChangesetPipeline, Compression};

    // The historical dump path: a bzip2 file on disk through the same
    // extractor and pipeline as the minutely feed.
    let dir = tempfile::tempdir().unwrap();
    let dump = dir.path().join("changesets-latest.osm.bz2");
    let mut encoder = BzEncoder::new(Vec::new(), bzip2::Compression::default());
    encoder.write_all(delta_xml(1).as_bytes()).unwrap();
    std::fs::write(&dump, encoder.finish().unwrap()).unwrap();

    let file = tokio::fs::File::open(&dump).await.unwrap();
    let sink = MemorySink::new();
    let records = stream_changesets(file, Compression::from_path(&dump), None);
    let mut pipeline = ChangesetPipeline::new(Vec::new());
    let report = pipeline.ingest(&sink, records, 1).await;

    assert_eq!(report.committed, 2);
    assert_eq!(report.failed_batches, 0);
    assert_eq!(sink.submissions(), 2);
    assert_eq!(sink.get(101).unwrap().tags["comment"], "delta 1");
}

#[tokio::test]
async fn test_store_ahead_of_cursor_walks_nothing() {
    let server = MockServer::start().await;
    mount_state(&server, 500).await;

    // A store committed after the cursor time estimates past the cursor.
    let sink = MemorySink::new();
    sink.insert(seed_record(cursor_time() + Duration::minutes(5)));

    let config = test_config(server.uri());
    let fetcher = HttpFetcher::new(&config).unwrap();
    let mut orchestrator = BackfillOrchestrator::new(config, fetcher, sink).unwrap();
    let report = orchestrator.run().await.unwrap();

    assert_eq!(orchestrator.state(), BackfillState::Done);
    assert_eq!(report.sequences_processed, 0);
    assert_eq!(report.committed, 0);
}
