//! Engine types
//!
//! Run states, configuration and the per-target run summary.

use super::retry::RetryPolicy;
use crate::types::ScrapeTarget;
use std::fmt;
use std::time::Duration;

/// States of one target's run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunState {
    /// Loading the checkpoint
    Init,
    /// Requesting the next page
    Fetching,
    /// Mapping raw items to records
    Normalizing,
    /// Committing the batch
    Writing,
    /// Saving the checkpoint of the committed batch
    Checkpointing,
    /// Waiting before retrying the current step
    Backoff,
    /// Listing exhausted or page limit reached
    Done,
    /// Stopped on a fatal error or exhausted retries
    Failed,
    /// Stopped at a batch boundary on request
    Cancelled,
}

impl RunState {
    /// Upper-case name used in summaries and logs
    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Init => "INIT",
            RunState::Fetching => "FETCHING",
            RunState::Normalizing => "NORMALIZING",
            RunState::Writing => "WRITING",
            RunState::Checkpointing => "CHECKPOINTING",
            RunState::Backoff => "BACKOFF",
            RunState::Done => "DONE",
            RunState::Failed => "FAILED",
            RunState::Cancelled => "CANCELLED",
        }
    }

    /// Whether a cancellation may interrupt a backoff taken from this state.
    ///
    /// Only steps that precede a fetch qualify; a batch being written is
    /// always followed through to its checkpoint.
    pub(crate) fn is_cancellable(self) -> bool {
        matches!(self, RunState::Init | RunState::Fetching)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for a run
#[derive(Debug, Clone, Default)]
pub struct RunConfig {
    /// Backoff policy applied to every step
    pub retry: RetryPolicy,
    /// Pages fetched before the run stops (`None` = until exhausted)
    pub max_pages: Option<usize>,
    /// End a new pass at the first page that inserts nothing
    pub incremental: bool,
}

impl RunConfig {
    /// Create a new run config
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the retry policy
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Bound the number of pages per run
    #[must_use]
    pub fn with_max_pages(mut self, max_pages: Option<usize>) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Stop new passes once they reach stored items
    #[must_use]
    pub fn with_incremental(mut self, incremental: bool) -> Self {
        self.incremental = incremental;
        self
    }
}

/// Outcome of one target's run
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Target the run was for
    pub target: ScrapeTarget,
    /// Terminal state
    pub state: RunState,
    /// Raw items received
    pub fetched: usize,
    /// Records in committed batches
    pub written: usize,
    /// Rows inserted
    pub inserted: u64,
    /// Rows updated
    pub updated: u64,
    /// Malformed items dropped
    pub dropped: usize,
    /// Pages fetched
    pub pages: usize,
    /// Backoff transitions taken
    pub retries: u32,
    /// Error that failed the run
    pub error: Option<String>,
    /// Wall time of the run
    pub duration: Duration,
    /// Every state entered, in order
    pub transitions: Vec<RunState>,
}

impl RunSummary {
    /// Create an empty summary for a target
    pub fn new(target: ScrapeTarget) -> Self {
        Self {
            target,
            state: RunState::Init,
            fetched: 0,
            written: 0,
            inserted: 0,
            updated: 0,
            dropped: 0,
            pages: 0,
            retries: 0,
            error: None,
            duration: Duration::ZERO,
            transitions: Vec::new(),
        }
    }

    /// Check if the run failed
    pub fn is_failed(&self) -> bool {
        self.state == RunState::Failed
    }

    /// Number of times a state was entered
    pub fn count(&self, state: RunState) -> usize {
        self.transitions.iter().filter(|s| **s == state).count()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}: fetched={} written={} ({} inserted, {} updated) dropped={} pages={} retries={} in {:.1}s",
            self.target,
            self.state,
            self.fetched,
            self.written,
            self.inserted,
            self.updated,
            self.dropped,
            self.pages,
            self.retries,
            self.duration.as_secs_f64()
        )?;
        if let Some(error) = &self.error {
            write!(f, " error: {error}")?;
        }
        Ok(())
    }
}
