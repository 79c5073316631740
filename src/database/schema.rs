//! Table definitions
//!
//! Idempotent bootstrap DDL for local runs and tests. Each statement is
//! safe to re-run against an existing database.

use crate::error::Result;
use sqlx::PgPool;
use tracing::info;

/// Idempotent DDL, one statement per entry
const CREATE_TABLES: &[&str] = &[
    r"
CREATE TABLE IF NOT EXISTS posts (
    external_id TEXT PRIMARY KEY,
    target TEXT NOT NULL,
    subreddit TEXT NOT NULL,
    title TEXT NOT NULL,
    body TEXT NOT NULL DEFAULT '',
    author TEXT,
    score BIGINT NOT NULL DEFAULT 0,
    num_comments BIGINT NOT NULL DEFAULT 0,
    permalink TEXT NOT NULL DEFAULT '',
    url TEXT,
    created_at TIMESTAMPTZ NOT NULL,
    fetched_at TIMESTAMPTZ NOT NULL,
    raw JSONB NOT NULL
)",
    r"
CREATE TABLE IF NOT EXISTS comments (
    external_id TEXT PRIMARY KEY,
    target TEXT NOT NULL,
    subreddit TEXT NOT NULL,
    post_id TEXT NOT NULL,
    parent_id TEXT,
    body TEXT NOT NULL DEFAULT '',
    author TEXT,
    score BIGINT NOT NULL DEFAULT 0,
    permalink TEXT NOT NULL DEFAULT '',
    created_at TIMESTAMPTZ NOT NULL,
    fetched_at TIMESTAMPTZ NOT NULL,
    raw JSONB NOT NULL
)",
    r"
CREATE TABLE IF NOT EXISTS scrape_checkpoints (
    target TEXT PRIMARY KEY,
    last_cursor TEXT,
    last_external_id TEXT,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
)",
    "CREATE INDEX IF NOT EXISTS idx_posts_subreddit_created ON posts (subreddit, created_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_comments_post ON comments (post_id)",
];

/// Create the record and checkpoint tables if they do not exist
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    for statement in CREATE_TABLES {
        sqlx::query(statement).execute(pool).await?;
    }
    info!("Schema is up to date");
    Ok(())
}
