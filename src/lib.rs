// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::ref_option)]
#![allow(clippy::unused_self)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::unused_async)]

//! # reddit-ingest
//!
//! Resumable, rate-limited ingestion of Reddit posts and comments into
//! Postgres.
//!
//! Each target (`source:kind`) is walked page by page from the newest item
//! backwards. Every page is normalized, upserted in one transaction and then
//! checkpointed, so a crash or interrupt costs at most one page of refetching
//! and never duplicates a row.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use reddit_ingest::database::{connect, PostgresWriter};
//! use reddit_ingest::http::{HttpClient, HttpClientConfig};
//! use reddit_ingest::pagination::ListingPaginator;
//! use reddit_ingest::state::PostgresCheckpointStore;
//! use reddit_ingest::{Config, Orchestrator, Result};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::load(None)?;
//!     let client = HttpClient::with_auth(HttpClientConfig::default(), config.auth_config())?;
//!     let pool = connect("postgres://localhost/reddit", 5).await?;
//!
//!     let orchestrator = Orchestrator::new(
//!         Arc::new(ListingPaginator::new(client, 100)),
//!         Arc::new(PostgresWriter::new(pool.clone())),
//!         Arc::new(PostgresCheckpointStore::new(pool)),
//!     );
//!
//!     for target in config.targets()? {
//!         println!("{}", orchestrator.run(&target).await);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Orchestrator                          │
//! │  INIT → FETCHING → NORMALIZING → WRITING → CHECKPOINTING     │
//! │            ↑  └──── BACKOFF ────┘               │            │
//! │            └────────────────────────────────────┘ → DONE     │
//! └──────────────────────────────────────────────────────────────┘
//!        │              │              │               │
//! ┌──────┴─────┬────────┴──────┬───────┴──────┬────────┴────────┐
//! │ Paginator  │  Transform    │ RecordWriter │ CheckpointStore │
//! ├────────────┼───────────────┼──────────────┼─────────────────┤
//! │ Listing    │ Post/Comment  │ Postgres     │ Postgres        │
//! │ OAuth2     │ Dedup         │ Memory       │ File / Memory   │
//! │ Rate limit │               │              │                 │
//! └────────────┴───────────────┴──────────────┴─────────────────┘
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types and classification
pub mod error;

/// Targets, cursors, raw items and records
pub mod types;

/// OAuth2 token handling
pub mod auth;

/// HTTP client with rate limiting
pub mod http;

/// Listing pagination
pub mod pagination;

/// Raw item to record normalization
pub mod transform;

/// Checkpoint stores
pub mod state;

/// Record storage
pub mod database;

/// Per-target run state machine
pub mod engine;

/// Configuration file and environment overrides
pub mod config;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use config::Config;
pub use engine::{Orchestrator, RunConfig, RunState, RunSummary};
pub use error::{Error, ErrorClass, Result};
pub use types::*;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
