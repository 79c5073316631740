//! In-memory checkpoint store, used for dry runs and tests

use super::types::{Checkpoint, CheckpointMap, CheckpointStore};
use crate::error::Result;
use crate::types::ScrapeTarget;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Checkpoint store that lives only as long as the process
#[derive(Debug, Clone, Default)]
pub struct MemoryCheckpointStore {
    checkpoints: Arc<RwLock<CheckpointMap>>,
}

impl MemoryCheckpointStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with checkpoints
    pub fn with_checkpoints(checkpoints: CheckpointMap) -> Self {
        Self {
            checkpoints: Arc::new(RwLock::new(checkpoints)),
        }
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self, target: &ScrapeTarget) -> Result<Option<Checkpoint>> {
        Ok(self.checkpoints.read().await.get(&target.id()).cloned())
    }

    async fn save(&self, target: &ScrapeTarget, checkpoint: &Checkpoint) -> Result<()> {
        self.checkpoints
            .write()
            .await
            .insert(target.id(), checkpoint.clone());
        Ok(())
    }

    async fn list(&self) -> Result<CheckpointMap> {
        Ok(self.checkpoints.read().await.clone())
    }

    async fn clear(&self, target: &ScrapeTarget) -> Result<bool> {
        Ok(self.checkpoints.write().await.remove(&target.id()).is_some())
    }
}
