//! Postgres record writer
//!
//! One transaction per batch. Each record is an `INSERT ... ON CONFLICT
//! (external_id) DO UPDATE`; `RETURNING (xmax = 0)` tells a fresh insert
//! from an update of an existing row.

use super::writer::{CommitResult, RecordWriter};
use crate::error::Result;
use crate::types::{CommentFields, Payload, PostFields, Record};
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use std::time::Duration;
use tracing::debug;

const UPSERT_POST: &str = r"
INSERT INTO posts (
    external_id, target, subreddit, title, body, author, score,
    num_comments, permalink, url, created_at, fetched_at, raw
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
ON CONFLICT (external_id) DO UPDATE SET
    title = EXCLUDED.title,
    body = EXCLUDED.body,
    score = EXCLUDED.score,
    num_comments = EXCLUDED.num_comments,
    url = EXCLUDED.url,
    raw = EXCLUDED.raw,
    fetched_at = GREATEST(posts.fetched_at, EXCLUDED.fetched_at)
RETURNING (xmax = 0) AS inserted
";

const UPSERT_COMMENT: &str = r"
INSERT INTO comments (
    external_id, target, subreddit, post_id, parent_id, body, author,
    score, permalink, created_at, fetched_at, raw
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
ON CONFLICT (external_id) DO UPDATE SET
    body = EXCLUDED.body,
    score = EXCLUDED.score,
    raw = EXCLUDED.raw,
    fetched_at = GREATEST(comments.fetched_at, EXCLUDED.fetched_at)
RETURNING (xmax = 0) AS inserted
";

/// Open a connection pool
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Record writer over a shared pool
#[derive(Debug, Clone)]
pub struct PostgresWriter {
    pool: PgPool,
}

impl PostgresWriter {
    /// Create a writer over an existing pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl RecordWriter for PostgresWriter {
    async fn write_batch(&self, records: &[Record]) -> Result<CommitResult> {
        let mut result = CommitResult::default();
        if records.is_empty() {
            return Ok(result);
        }

        // Dropping the transaction on an early return rolls the batch back
        let mut tx = self.pool.begin().await?;
        for record in records {
            let inserted = match &record.payload {
                Payload::Post(post) => upsert_post(&mut tx, record, post).await?,
                Payload::Comment(comment) => upsert_comment(&mut tx, record, comment).await?,
            };
            result.record(inserted);
        }
        tx.commit().await?;

        debug!(records = records.len(), %result, "Committed batch");
        Ok(result)
    }
}

async fn upsert_post(
    tx: &mut Transaction<'_, Postgres>,
    record: &Record,
    post: &PostFields,
) -> Result<bool> {
    let inserted = sqlx::query_scalar::<_, bool>(UPSERT_POST)
        .bind(&record.external_id)
        .bind(&record.target)
        .bind(&post.subreddit)
        .bind(&post.title)
        .bind(&post.body)
        .bind(post.author.as_deref())
        .bind(post.score)
        .bind(post.num_comments)
        .bind(&post.permalink)
        .bind(post.url.as_deref())
        .bind(record.created_at)
        .bind(record.fetched_at)
        .bind(&record.raw)
        .fetch_one(&mut **tx)
        .await?;
    Ok(inserted)
}

async fn upsert_comment(
    tx: &mut Transaction<'_, Postgres>,
    record: &Record,
    comment: &CommentFields,
) -> Result<bool> {
    let inserted = sqlx::query_scalar::<_, bool>(UPSERT_COMMENT)
        .bind(&record.external_id)
        .bind(&record.target)
        .bind(&comment.subreddit)
        .bind(&comment.post_id)
        .bind(comment.parent_id.as_deref())
        .bind(&comment.body)
        .bind(comment.author.as_deref())
        .bind(comment.score)
        .bind(&comment.permalink)
        .bind(record.created_at)
        .bind(record.fetched_at)
        .bind(&record.raw)
        .fetch_one(&mut **tx)
        .await?;
    Ok(inserted)
}
