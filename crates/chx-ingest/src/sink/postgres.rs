//! PostgreSQL changeset sink
//!
//! Writes to the `changesets` table with multi-row inserts and
//! upsert-by-id semantics. Schema management lives elsewhere; this sink
//! assumes:
//!
//! ```sql
//! CREATE TABLE changesets (
//!     id bigint PRIMARY KEY,
//!     osm_uid integer,
//!     osm_user character varying,
//!     created_at timestamp with time zone,
//!     closed_at timestamp with time zone,
//!     num_changes integer,
//!     min_lon double precision,
//!     max_lon double precision,
//!     min_lat double precision,
//!     max_lat double precision,
//!     tags jsonb
//! );
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::debug;

use super::{ChangesetSink, Result};
use crate::models::ChangesetRecord;

/// Sink backed by a PostgreSQL connection pool
pub struct PostgresSink {
    db: PgPool,
}

impl PostgresSink {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ChangesetSink for PostgresSink {
    async fn last_committed_closed_at(&self) -> Result<Option<DateTime<Utc>>> {
        let row: Option<(Option<DateTime<Utc>>,)> =
            sqlx::query_as("SELECT closed_at FROM changesets ORDER BY id DESC LIMIT 1")
                .fetch_optional(&self.db)
                .await?;
        Ok(row.and_then(|(closed_at,)| closed_at))
    }

    async fn submit_batch(&self, records: &[ChangesetRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO changesets (id, osm_uid, osm_user, created_at, closed_at, \
             num_changes, min_lon, max_lon, min_lat, max_lat, tags) ",
        );
        builder.push_values(records, |mut row, record| {
            row.push_bind(record.id)
                .push_bind(record.user_id)
                .push_bind(&record.user_name)
                .push_bind(record.created_at)
                .push_bind(record.closed_at)
                .push_bind(record.num_changes)
                .push_bind(record.min_lon)
                .push_bind(record.max_lon)
                .push_bind(record.min_lat)
                .push_bind(record.max_lat)
                .push_bind(serde_json::json!(record.tags));
        });
        builder.push(
            " ON CONFLICT (id) DO UPDATE SET \
             osm_uid = EXCLUDED.osm_uid, \
             osm_user = EXCLUDED.osm_user, \
             created_at = EXCLUDED.created_at, \
             closed_at = EXCLUDED.closed_at, \
             num_changes = EXCLUDED.num_changes, \
             min_lon = EXCLUDED.min_lon, \
             max_lon = EXCLUDED.max_lon, \
             min_lat = EXCLUDED.min_lat, \
             max_lat = EXCLUDED.max_lat, \
             tags = EXCLUDED.tags",
        );

        builder.build().execute(&self.db).await?;
        debug!(rows = records.len(), "batch committed");
        Ok(())
    }
}
