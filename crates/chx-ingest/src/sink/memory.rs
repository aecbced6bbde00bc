//! In-memory changeset sink
//!
//! Same upsert-by-id semantics as the PostgreSQL sink, held in a map.
//! Used by tests and dry runs that should not touch a database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use super::{ChangesetSink, Result};
use crate::models::ChangesetRecord;

/// Sink keeping rows in memory, keyed by changeset id
#[derive(Debug, Default)]
pub struct MemorySink {
    rows: Mutex<HashMap<i64, ChangesetRecord>>,
    submissions: AtomicUsize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct changeset ids stored
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Number of `submit_batch` calls accepted so far
    pub fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }

    pub fn get(&self, id: i64) -> Option<ChangesetRecord> {
        self.lock().get(&id).cloned()
    }

    /// Seed a row directly, bypassing batch accounting
    pub fn insert(&self, record: ChangesetRecord) {
        self.lock().insert(record.id, record);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<i64, ChangesetRecord>> {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ChangesetSink for MemorySink {
    async fn last_committed_closed_at(&self) -> Result<Option<DateTime<Utc>>> {
        let rows = self.lock();
        Ok(rows
            .iter()
            .max_by_key(|(id, _)| **id)
            .and_then(|(_, record)| record.closed_at))
    }

    async fn submit_batch(&self, records: &[ChangesetRecord]) -> Result<()> {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        let mut rows = self.lock();
        for record in records {
            rows.insert(record.id, record.clone());
        }
        Ok(())
    }
}
