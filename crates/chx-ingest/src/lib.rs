//! CHX Ingest Library
//!
//! Replication catch-up and streaming batch ingest for the public changeset
//! feed. The engine determines which delta files a store is missing, stream
//! parses each one without buffering it in memory, normalizes partial
//! records, and commits them in bounded batches.
//!
//! # Components
//!
//! - [`replication::paths`]: sequence number to delta file URL
//! - [`replication::FeedStateClient`]: remote cursor and sequence estimation
//! - [`replication::ChangesetExtractor`]: streaming XML record extraction
//! - [`replication::ChangesetPipeline`]: bounded-batch sink submission
//! - [`replication::BackfillOrchestrator`]: the catch-up walk
//!
//! # Example
//!
//! ```no_run
//! use chx_ingest::config::ReplicationConfig;
//! use chx_ingest::fetch::HttpFetcher;
//! use chx_ingest::replication::BackfillOrchestrator;
//! use chx_ingest::sink::MemorySink;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ReplicationConfig::default();
//!     let fetcher = HttpFetcher::new(&config)?;
//!     let mut orchestrator = BackfillOrchestrator::new(config, fetcher, MemorySink::new())?;
//!     let report = orchestrator.run().await?;
//!     println!("committed {} changesets", report.committed);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod fetch;
pub mod models;
pub mod replication;
pub mod sink;
