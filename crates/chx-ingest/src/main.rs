//! CHX Ingest - changeset ingestion tool

use anyhow::{Context, Result};
use chx_common::logging::{init_logging, LogConfig, LogLevel};
use chx_ingest::config::ReplicationConfig;
use chx_ingest::fetch::HttpFetcher;
use chx_ingest::replication::{
    stream_changesets, BackfillOrchestrator, ChangesetPipeline, Compression, DEFAULT_BATCH_SIZE,
};
use chx_ingest::sink::PostgresSink;
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "chx-ingest")]
#[command(author, version, about = "Changeset replication ingestion tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,
}

#[derive(Parser, Debug)]
enum Command {
    /// Catch the local store up to the remote replication cursor
    CatchUp {
        /// Base URL of the minutely changeset feed
        #[arg(long)]
        base_url: Option<String>,

        /// Records per sink submission
        #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
        batch_size: usize,

        /// Stop extracting after this many records per delta file
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Load a historical changeset dump from disk
    Load {
        /// Location of the changesets dump (.osm.bz2)
        changeset_file: PathBuf,

        /// Records per sink submission
        #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
        batch_size: usize,

        /// Stop after this many records -- for testing
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Initialize logging based on verbose flag; environment takes
    // precedence.
    let mut log_config = LogConfig::from_env().unwrap_or_default();
    if cli.verbose {
        log_config.level = LogLevel::Debug;
    }
    init_logging(&log_config)?;

    let db = PgPoolOptions::new()
        .max_connections(5)
        .connect(&cli.database_url)
        .await
        .context("Failed to connect to PostgreSQL")?;
    let sink = PostgresSink::new(db);

    match cli.command {
        Command::CatchUp {
            base_url,
            batch_size,
            limit,
        } => {
            let mut config = ReplicationConfig {
                batch_size,
                limit,
                ..Default::default()
            };
            if let Some(base_url) = base_url {
                config.base_url = base_url;
            }
            config.validate().map_err(|e| anyhow::anyhow!(e))?;

            info!(base_url = %config.base_url, "starting catch-up");
            let fetcher = HttpFetcher::new(&config)?;
            let mut orchestrator = BackfillOrchestrator::new(config, fetcher, sink)?;
            let report = orchestrator.run().await?;

            info!(
                start = report.start_sequence,
                end = report.end_sequence,
                committed = report.committed,
                failed_batches = report.failed_batches,
                fetch_failures = report.fetch_failures,
                "catch-up complete"
            );
        }
        Command::Load {
            changeset_file,
            batch_size,
            limit,
        } => {
            info!(file = %changeset_file.display(), "loading changeset dump");
            let file = tokio::fs::File::open(&changeset_file)
                .await
                .with_context(|| format!("no such file: {}", changeset_file.display()))?;

            let compression = Compression::from_path(&changeset_file);
            let records = stream_changesets(file, compression, limit);
            let mut pipeline = ChangesetPipeline::stderr();
            let report = pipeline.ingest(&sink, records, batch_size).await;

            info!(
                committed = report.committed,
                failed_batches = report.failed_batches,
                "load complete"
            );
        }
    }

    Ok(())
}
