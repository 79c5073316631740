//! File-backed checkpoint store
//!
//! Keeps every target's checkpoint in one JSON document and replaces it
//! atomically on each save: the temp file is synced to disk, then renamed
//! over the previous document.

use super::types::{Checkpoint, CheckpointMap, CheckpointStore};
use crate::error::{Error, Result};
use crate::types::ScrapeTarget;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

/// On-disk layout
#[derive(Debug, Default, Serialize, Deserialize)]
struct CheckpointFile {
    #[serde(default)]
    checkpoints: CheckpointMap,
}

/// Checkpoint store persisted to a JSON file
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    /// Path to the checkpoint file
    path: PathBuf,
    /// Checkpoints as last persisted
    checkpoints: Arc<RwLock<CheckpointMap>>,
}

impl FileCheckpointStore {
    /// Open a store, loading existing checkpoints if the file exists
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let exists = tokio::fs::try_exists(&path).await.map_err(|e| {
            Error::checkpoint(format!("Failed to access checkpoint file: {e}"))
        })?;
        let checkpoints = if exists {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::checkpoint(format!("Failed to read checkpoint file: {e}")))?;
            let file: CheckpointFile = serde_json::from_str(&contents)
                .map_err(|e| Error::checkpoint(format!("Failed to parse checkpoint file: {e}")))?;
            file.checkpoints
        } else {
            CheckpointMap::new()
        };

        Ok(Self {
            path,
            checkpoints: Arc::new(RwLock::new(checkpoints)),
        })
    }

    /// Get the checkpoint file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, checkpoints: &CheckpointMap) -> Result<()> {
        let contents = serde_json::to_string_pretty(&CheckpointFile {
            checkpoints: checkpoints.clone(),
        })
        .map_err(|e| Error::checkpoint(format!("Failed to serialize checkpoints: {e}")))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::checkpoint(format!("Failed to create checkpoint directory: {e}"))
            })?;
        }

        // Write to temp file first, then rename for atomicity
        let temp_path = self.path.with_extension("tmp");
        let write_err = |e: std::io::Error| {
            Error::checkpoint(format!("Failed to write checkpoint file: {e}"))
        };
        let mut file = tokio::fs::File::create(&temp_path).await.map_err(write_err)?;
        file.write_all(contents.as_bytes()).await.map_err(write_err)?;
        // The rename must not land before the contents do
        file.sync_all().await.map_err(write_err)?;
        drop(file);

        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| Error::checkpoint(format!("Failed to rename checkpoint file: {e}")))?;

        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn load(&self, target: &ScrapeTarget) -> Result<Option<Checkpoint>> {
        Ok(self.checkpoints.read().await.get(&target.id()).cloned())
    }

    async fn save(&self, target: &ScrapeTarget, checkpoint: &Checkpoint) -> Result<()> {
        // Holding the write lock across the rename serializes concurrent targets
        let mut checkpoints = self.checkpoints.write().await;
        let mut next = checkpoints.clone();
        next.insert(target.id(), checkpoint.clone());
        self.persist(&next).await?;
        *checkpoints = next;
        Ok(())
    }

    async fn list(&self) -> Result<CheckpointMap> {
        Ok(self.checkpoints.read().await.clone())
    }

    async fn clear(&self, target: &ScrapeTarget) -> Result<bool> {
        let mut checkpoints = self.checkpoints.write().await;
        if !checkpoints.contains_key(&target.id()) {
            return Ok(false);
        }
        let mut next = checkpoints.clone();
        next.remove(&target.id());
        self.persist(&next).await?;
        *checkpoints = next;
        Ok(true)
    }
}
