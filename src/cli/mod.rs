//! CLI module
//!
//! Command-line interface for running ingestion.
//!
//! # Commands
//!
//! - `run` - Ingest every configured target
//! - `check` - Test credentials and the store connection
//! - `init-db` - Create tables
//! - `state show` / `state reset` - Inspect or clear checkpoints

mod commands;
mod runner;

pub use commands::{Cli, Commands, StateAction};
pub use runner::Runner;
