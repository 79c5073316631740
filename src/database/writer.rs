//! Writer contract shared by the Postgres and in-memory backends

use crate::error::Result;
use crate::types::Record;
use async_trait::async_trait;
use std::fmt;

/// Outcome of one committed batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitResult {
    /// Rows that did not exist before
    pub inserted: u64,
    /// Existing rows whose mutable fields were refreshed
    pub updated: u64,
}

impl CommitResult {
    /// Count one upserted row
    pub fn record(&mut self, inserted: bool) {
        if inserted {
            self.inserted += 1;
        } else {
            self.updated += 1;
        }
    }

    /// Rows touched by the batch
    pub fn total(&self) -> u64 {
        self.inserted + self.updated
    }
}

impl std::ops::AddAssign for CommitResult {
    fn add_assign(&mut self, other: Self) {
        self.inserted += other.inserted;
        self.updated += other.updated;
    }
}

impl fmt::Display for CommitResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} inserted, {} updated", self.inserted, self.updated)
    }
}

/// Idempotent batch upsert into the record store.
///
/// A batch commits entirely or not at all; re-writing a committed batch
/// leaves the store unchanged apart from `fetched_at` and the mutable fields.
#[async_trait]
pub trait RecordWriter: Send + Sync {
    /// Upsert `records` in one transaction
    async fn write_batch(&self, records: &[Record]) -> Result<CommitResult>;
}
