//! Execution engine module
//!
//! Drives one target from its checkpoint to a terminal state.
//!
//! # Overview
//!
//! The engine module provides:
//! - `Orchestrator` - the fetch, normalize, write, checkpoint loop
//! - `RunConfig` / `RetryPolicy` - page limits and backoff
//! - `RunSummary` - counters and terminal state of a run
//!
//! ```text
//! INIT ─► FETCHING ─► NORMALIZING ─► WRITING ─► CHECKPOINTING ─┬─► FETCHING
//!            │                          │             │          └─► DONE
//!            └────────── BACKOFF ◄──────┴─────────────┘
//!                  (retryable; FAILED once exhausted or fatal)
//! ```
//!
//! With `incremental` set, a pass that follows a completed one ends at the
//! first page whose records were all stored already.
//!
//! The orchestrator is the only place that turns an error's class into a
//! retry or a failure. A checkpoint is saved only after the batch it
//! describes committed, so a run killed at any point resumes without losing
//! or duplicating rows.

mod retry;
mod types;

pub use retry::RetryPolicy;
pub use types::{RunConfig, RunState, RunSummary};

use crate::database::RecordWriter;
use crate::error::{Error, ErrorClass, Result};
use crate::pagination::Paginator;
use crate::state::{Checkpoint, CheckpointStore};
use crate::transform::normalize_page;
use crate::types::{Cursor, ScrapeTarget};
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Why a run left the loop before exhausting the listing
enum Stop {
    Cancelled,
    Failed(Error),
}

/// Per-target pipeline driver.
///
/// Cheap to clone; every clone shares the same paginator, writer, checkpoint
/// store and cancellation token, so one orchestrator can run many targets
/// concurrently.
#[derive(Clone)]
pub struct Orchestrator {
    paginator: Arc<dyn Paginator>,
    writer: Arc<dyn RecordWriter>,
    checkpoints: Arc<dyn CheckpointStore>,
    config: RunConfig,
    cancel: CancellationToken,
}

impl Orchestrator {
    /// Create an orchestrator with the default run config
    pub fn new(
        paginator: Arc<dyn Paginator>,
        writer: Arc<dyn RecordWriter>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self {
            paginator,
            writer,
            checkpoints,
            config: RunConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Set run configuration
    #[must_use]
    pub fn with_config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    /// Observe an external cancellation token
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Get the run configuration
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Token that stops every run at its next batch boundary
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run one target to a terminal state
    pub async fn run(&self, target: &ScrapeTarget) -> RunSummary {
        let started = Instant::now();
        let mut summary = RunSummary::new(target.clone());
        info!(target = %target, "Starting run");

        let outcome = self.drive(target, &mut summary).await;

        let state = match outcome {
            Ok(()) => RunState::Done,
            Err(Stop::Cancelled) => RunState::Cancelled,
            Err(Stop::Failed(err)) => {
                error!(target = %target, from = %summary.state, error = %err, "Run failed");
                summary.error = Some(err.to_string());
                RunState::Failed
            }
        };
        enter(&mut summary, state);
        summary.duration = started.elapsed();

        info!(
            target = %target,
            state = %summary.state,
            fetched = summary.fetched,
            written = summary.written,
            dropped = summary.dropped,
            pages = summary.pages,
            "Run finished"
        );
        summary
    }

    async fn drive(
        &self,
        target: &ScrapeTarget,
        summary: &mut RunSummary,
    ) -> std::result::Result<(), Stop> {
        let mut checkpoint = self
            .step(summary, RunState::Init, || self.checkpoints.load(target))
            .await?;
        let mut cursor = checkpoint.as_ref().and_then(|cp| cp.last_cursor.clone());
        if let Some(cursor) = &cursor {
            info!(target = %target, cursor = %cursor, "Resuming from checkpoint");
        }
        // A finished pass means everything older than its newest item is stored
        let new_pass = checkpoint.as_ref().is_some_and(Checkpoint::is_pass_complete);

        let mut pages = 0usize;
        loop {
            if self.cancel.is_cancelled() {
                info!(target = %target, pages, "Cancelled at batch boundary");
                return Err(Stop::Cancelled);
            }
            if self.config.max_pages.is_some_and(|max| pages >= max) {
                info!(target = %target, pages, "Page limit reached");
                return Ok(());
            }

            let page = self
                .step(summary, RunState::Fetching, || {
                    self.paginator.fetch_page(target, cursor.as_ref())
                })
                .await?;
            pages += 1;
            summary.pages += 1;
            summary.fetched += page.len();

            if let (Some(asked), Some(next)) = (&cursor, &page.next_cursor) {
                if asked == next {
                    return Err(Stop::Failed(Error::PaginationStalled {
                        cursor: next.to_string(),
                    }));
                }
            }

            let mut records = Vec::new();
            if !page.is_empty() {
                enter(summary, RunState::Normalizing);
                let (normalized, dropped) = normalize_page(&page.items, target, Utc::now());
                summary.dropped += dropped;
                records = normalized;
            }

            let mut caught_up = false;
            if !records.is_empty() {
                let result = self
                    .step(summary, RunState::Writing, || self.writer.write_batch(&records))
                    .await?;
                summary.written += records.len();
                summary.inserted += result.inserted;
                summary.updated += result.updated;
                caught_up = self.config.incremental && new_pass && result.inserted == 0;
            }

            let next_cursor = if caught_up {
                info!(target = %target, pages, "Caught up with stored items");
                None
            } else {
                page.next_cursor.clone()
            };
            let next = Checkpoint::advance(
                checkpoint.as_ref(),
                next_cursor,
                records.last().map(|r| r.external_id.as_str()),
            );
            self.step(summary, RunState::Checkpointing, || {
                self.checkpoints.save(target, &next)
            })
            .await?;
            debug!(
                target = %target,
                page = pages,
                cursor = next.last_cursor.as_ref().map(Cursor::as_str),
                "Checkpoint saved"
            );

            cursor = next.last_cursor.clone();
            checkpoint = Some(next);
            if cursor.is_none() {
                return Ok(());
            }
        }
    }

    /// Enter `state` and run `op`, backing off on retryable errors
    async fn step<T, F, Fut>(
        &self,
        summary: &mut RunSummary,
        state: RunState,
        mut op: F,
    ) -> std::result::Result<T, Stop>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let policy = self.config.retry;
        let mut attempts = 0u32;

        loop {
            enter(summary, state);
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if err.class() == ErrorClass::Fatal {
                return Err(Stop::Failed(err));
            }
            if !policy.allows(attempts) {
                warn!(
                    target = %summary.target,
                    step = %state,
                    attempts,
                    "Retries exhausted"
                );
                return Err(Stop::Failed(err));
            }

            let delay = policy.jittered_delay(attempts);
            attempts += 1;
            summary.retries += 1;
            enter(summary, RunState::Backoff);
            warn!(
                target = %summary.target,
                step = %state,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Retryable failure, backing off"
            );

            if state.is_cancellable() {
                tokio::select! {
                    () = self.cancel.cancelled() => return Err(Stop::Cancelled),
                    () = tokio::time::sleep(delay) => {}
                }
            } else {
                tokio::time::sleep(delay).await;
            }
        }
    }
}

fn enter(summary: &mut RunSummary, state: RunState) {
    debug!(target = %summary.target, from = %summary.state, to = %state, "Transition");
    summary.state = state;
    summary.transitions.push(state);
}
