//! CLI commands and argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Resumable Reddit ingestion into Postgres
#[derive(Parser, Debug)]
#[command(name = "reddit-ingest")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (YAML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run every target to completion
    Run {
        /// Target as source:kind, or a bare source for posts and comments
        /// (repeatable, replaces configured targets)
        #[arg(short, long = "target")]
        targets: Vec<String>,

        /// Fetch and normalize without writing records or checkpoints
        #[arg(long)]
        dry_run: bool,

        /// Pages per target for this run
        #[arg(long)]
        max_pages: Option<usize>,
    },

    /// Obtain a token and ping the store
    Check,

    /// Create the record and checkpoint tables
    InitDb,

    /// Inspect or reset checkpoints
    State {
        #[command(subcommand)]
        action: StateAction,
    },
}

/// Checkpoint subcommands
#[derive(Subcommand, Debug)]
pub enum StateAction {
    /// Print checkpoints as JSON
    Show {
        /// Only this target (source:kind)
        #[arg(long)]
        target: Option<String>,
    },

    /// Delete a checkpoint so the target restarts from the newest item
    Reset {
        /// Target to reset (source:kind)
        #[arg(long)]
        target: String,
    },
}
