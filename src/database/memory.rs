//! In-memory record writer
//!
//! Same upsert semantics as the Postgres writer over a `BTreeMap` keyed by
//! `(kind, external_id)`. Used for `--dry-run` and tests.

use super::writer::{CommitResult, RecordWriter};
use crate::error::Result;
use crate::types::{ItemKind, Payload, Record};
use async_trait::async_trait;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

type RowMap = BTreeMap<(ItemKind, String), Record>;

/// Record writer that keeps rows in process memory
#[derive(Debug, Clone, Default)]
pub struct MemoryWriter {
    rows: Arc<RwLock<RowMap>>,
}

impl MemoryWriter {
    /// Create an empty writer
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rows
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    /// Check if nothing was written
    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    /// Number of stored rows of one kind
    pub async fn count(&self, kind: ItemKind) -> usize {
        self.rows
            .read()
            .await
            .keys()
            .filter(|(k, _)| *k == kind)
            .count()
    }

    /// Look up one row
    pub async fn get(&self, kind: ItemKind, external_id: &str) -> Option<Record> {
        self.rows
            .read()
            .await
            .get(&(kind, external_id.to_string()))
            .cloned()
    }

    /// All rows ordered by kind and id
    pub async fn records(&self) -> Vec<Record> {
        self.rows.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl RecordWriter for MemoryWriter {
    async fn write_batch(&self, records: &[Record]) -> Result<CommitResult> {
        let mut result = CommitResult::default();
        let mut rows = self.rows.write().await;

        for record in records {
            match rows.entry((record.kind, record.external_id.clone())) {
                Entry::Occupied(mut row) => {
                    apply_update(row.get_mut(), record);
                    result.record(false);
                }
                Entry::Vacant(slot) => {
                    slot.insert(record.clone());
                    result.record(true);
                }
            }
        }

        Ok(result)
    }
}

/// Refresh the mutable fields of a stored row
fn apply_update(existing: &mut Record, incoming: &Record) {
    match (&mut existing.payload, &incoming.payload) {
        (Payload::Post(stored), Payload::Post(fresh)) => {
            stored.title.clone_from(&fresh.title);
            stored.body.clone_from(&fresh.body);
            stored.score = fresh.score;
            stored.num_comments = fresh.num_comments;
            stored.url.clone_from(&fresh.url);
        }
        (Payload::Comment(stored), Payload::Comment(fresh)) => {
            stored.body.clone_from(&fresh.body);
            stored.score = fresh.score;
        }
        // Kinds never change for an id
        _ => return,
    }
    existing.raw = incoming.raw.clone();
    existing.fetched_at = existing.fetched_at.max(incoming.fetched_at);
}
