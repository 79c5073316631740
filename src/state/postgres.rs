//! Postgres-backed checkpoint store
//!
//! One row per target in `scrape_checkpoints`; a save is a single upsert,
//! so it is atomic and idempotent.

use super::types::{Checkpoint, CheckpointMap, CheckpointStore};
use crate::error::Result;
use crate::types::{Cursor, ScrapeTarget};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

#[derive(Debug, sqlx::FromRow)]
struct CheckpointRow {
    target: String,
    last_cursor: Option<String>,
    last_external_id: Option<String>,
    updated_at: DateTime<Utc>,
}

impl From<CheckpointRow> for Checkpoint {
    fn from(row: CheckpointRow) -> Self {
        Self {
            last_cursor: Cursor::from_provider(row.last_cursor.as_deref()),
            last_external_id: row.last_external_id,
            updated_at: row.updated_at,
        }
    }
}

/// Checkpoint store sharing the pipeline's connection pool
#[derive(Debug, Clone)]
pub struct PostgresCheckpointStore {
    pool: PgPool,
}

impl PostgresCheckpointStore {
    /// Create a store over an existing pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CheckpointStore for PostgresCheckpointStore {
    async fn load(&self, target: &ScrapeTarget) -> Result<Option<Checkpoint>> {
        let row = sqlx::query_as::<_, CheckpointRow>(
            "SELECT target, last_cursor, last_external_id, updated_at
             FROM scrape_checkpoints WHERE target = $1",
        )
        .bind(target.id())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Checkpoint::from))
    }

    async fn save(&self, target: &ScrapeTarget, checkpoint: &Checkpoint) -> Result<()> {
        sqlx::query(
            "INSERT INTO scrape_checkpoints (target, last_cursor, last_external_id, updated_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (target) DO UPDATE SET
                 last_cursor = EXCLUDED.last_cursor,
                 last_external_id = EXCLUDED.last_external_id,
                 updated_at = EXCLUDED.updated_at",
        )
        .bind(target.id())
        .bind(checkpoint.last_cursor.as_ref().map(Cursor::as_str))
        .bind(checkpoint.last_external_id.as_deref())
        .bind(checkpoint.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list(&self) -> Result<CheckpointMap> {
        let rows = sqlx::query_as::<_, CheckpointRow>(
            "SELECT target, last_cursor, last_external_id, updated_at
             FROM scrape_checkpoints ORDER BY target",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| (row.target.clone(), Checkpoint::from(row)))
            .collect())
    }

    async fn clear(&self, target: &ScrapeTarget) -> Result<bool> {
        let result = sqlx::query("DELETE FROM scrape_checkpoints WHERE target = $1")
            .bind(target.id())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
