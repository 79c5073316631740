//! Checkpoint module
//!
//! Handles durable resumption state: one [`Checkpoint`] per target, replaced
//! after every committed batch so an interrupted run resumes where the last
//! commit left off.
//!
//! # Overview
//!
//! The state module provides:
//! - `Checkpoint` - cursor and last committed id of one target
//! - `CheckpointStore` - the load/save contract the orchestrator relies on
//! - `FileCheckpointStore` - JSON file with atomic replace
//! - `PostgresCheckpointStore` - `scrape_checkpoints` table
//! - `MemoryCheckpointStore` - process-local, for dry runs and tests

mod file;
mod memory;
mod postgres;
mod types;

pub use file::FileCheckpointStore;
pub use memory::MemoryCheckpointStore;
pub use postgres::PostgresCheckpointStore;
pub use types::{Checkpoint, CheckpointMap, CheckpointStore};
