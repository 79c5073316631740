//! Checkpoint types and the store contract
//!
//! Checkpoints are serialized to JSON (file backend) or stored as rows
//! (Postgres backend) and persisted between runs.

use crate::error::Result;
use crate::types::{Cursor, ScrapeTarget};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Durable resumption state for one target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Cursor of the next page to fetch; `None` once a pass completed
    #[serde(default)]
    pub last_cursor: Option<Cursor>,

    /// Id of the last record committed
    #[serde(default)]
    pub last_external_id: Option<String>,

    /// When this checkpoint was written
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Create a checkpoint stamped now
    pub fn new(last_cursor: Option<Cursor>, last_external_id: Option<String>) -> Self {
        Self {
            last_cursor,
            last_external_id,
            updated_at: Utc::now(),
        }
    }

    /// The checkpoint that follows a committed batch.
    ///
    /// An empty batch keeps the previous `last_external_id`.
    pub fn advance(
        previous: Option<&Checkpoint>,
        next_cursor: Option<Cursor>,
        last_external_id: Option<&str>,
    ) -> Self {
        let last_external_id = last_external_id
            .map(String::from)
            .or_else(|| previous.and_then(|cp| cp.last_external_id.clone()));
        Self::new(next_cursor, last_external_id)
    }

    /// Check if the stored pass has finished
    pub fn is_pass_complete(&self) -> bool {
        self.last_cursor.is_none()
    }
}

/// Checkpoints keyed by target id
pub type CheckpointMap = BTreeMap<String, Checkpoint>;

/// Storage contract for checkpoints.
///
/// `save` must be atomic: a reader sees either the previous checkpoint or the
/// new one. The orchestrator only calls it after the batch the checkpoint
/// describes has committed.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Read the checkpoint of a target, `None` if it never ran
    async fn load(&self, target: &ScrapeTarget) -> Result<Option<Checkpoint>>;

    /// Replace the checkpoint of a target
    async fn save(&self, target: &ScrapeTarget, checkpoint: &Checkpoint) -> Result<()>;

    /// All stored checkpoints
    async fn list(&self) -> Result<CheckpointMap>;

    /// Delete the checkpoint of a target. Returns whether one existed.
    async fn clear(&self, target: &ScrapeTarget) -> Result<bool>;
}
