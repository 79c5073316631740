//! CLI runner - executes commands

use crate::cli::commands::{Cli, Commands, StateAction};
use crate::config::{CheckpointBackend, Config};
use crate::database::{self, MemoryWriter, PostgresWriter, RecordWriter};
use crate::engine::{Orchestrator, RunState, RunSummary};
use crate::error::{Error, Result, ResultExt};
use crate::http::{HttpClient, HttpClientConfig};
use crate::pagination::ListingPaginator;
use crate::state::{
    CheckpointStore, FileCheckpointStore, MemoryCheckpointStore, PostgresCheckpointStore,
};
use crate::types::ScrapeTarget;
use futures::stream::{self, StreamExt};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// CLI runner
pub struct Runner {
    cli: Cli,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Run the CLI command
    pub async fn run(&self) -> Result<()> {
        match &self.cli.command {
            Commands::Run {
                targets,
                dry_run,
                max_pages,
            } => self.run_targets(targets, *dry_run, *max_pages).await,
            Commands::Check => self.check().await,
            Commands::InitDb => self.init_db().await,
            Commands::State { action } => self.state(action).await,
        }
    }

    /// Load configuration
    fn load_config(&self) -> Result<Config> {
        Config::load(self.cli.config.as_deref())
    }

    /// Run all targets concurrently and print one summary line each
    async fn run_targets(
        &self,
        targets: &[String],
        dry_run: bool,
        max_pages: Option<usize>,
    ) -> Result<()> {
        let mut config = self.load_config()?;
        if !targets.is_empty() {
            config.targets = targets.to_vec();
        }
        if max_pages.is_some() {
            config.pipeline.max_pages = max_pages;
        }
        config.validate(!dry_run)?;

        let targets = config.targets()?;
        let client = build_client(&config)?;
        let paginator = Arc::new(ListingPaginator::new(client, config.pipeline.page_size));

        let (writer, checkpoints): (Arc<dyn RecordWriter>, Arc<dyn CheckpointStore>) = if dry_run {
            info!("Dry run: records and checkpoints stay in memory");
            (
                Arc::new(MemoryWriter::new()),
                Arc::new(MemoryCheckpointStore::new()),
            )
        } else {
            let pool = connect(&config).await?;
            let checkpoints = checkpoint_store(&config, Some(&pool)).await?;
            (Arc::new(PostgresWriter::new(pool)), checkpoints)
        };

        let cancel = CancellationToken::new();
        let interrupt = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received, stopping after in-flight batches");
                    cancel.cancel();
                }
            })
        };

        let orchestrator = Orchestrator::new(paginator, writer, checkpoints)
            .with_config(config.run_config())
            .with_cancellation(cancel);

        info!(
            targets = targets.len(),
            concurrency = config.pipeline.concurrency,
            "Starting ingestion"
        );
        let summaries: Vec<RunSummary> = stream::iter(targets.iter())
            .map(|target| orchestrator.run(target))
            .buffer_unordered(config.pipeline.concurrency)
            .collect()
            .await;
        interrupt.abort();

        report(&summaries)
    }

    /// Obtain a token and ping the store
    async fn check(&self) -> Result<()> {
        let config = self.load_config()?;
        let client = build_client(&config)?;

        if let Some(auth) = client.authenticator() {
            auth.check().await.context("credential check failed")?;
            println!("api: ok ({} auth)", auth.config().kind());
        }

        if config.store.database_url.is_some() {
            let pool = connect(&config).await?;
            sqlx::query("SELECT 1")
                .execute(&pool)
                .await
                .context("store ping failed")?;
            println!("store: ok");
        } else {
            println!("store: not configured");
        }
        Ok(())
    }

    /// Create the tables
    async fn init_db(&self) -> Result<()> {
        let config = self.load_config()?;
        let pool = connect(&config).await?;
        database::ensure_schema(&pool)
            .await
            .context("creating tables")?;
        println!("schema: ok");
        Ok(())
    }

    /// Show or reset checkpoints
    async fn state(&self, action: &StateAction) -> Result<()> {
        let config = self.load_config()?;
        let pool = match config.store.checkpoints {
            CheckpointBackend::Postgres => Some(connect(&config).await?),
            CheckpointBackend::File => None,
        };
        let store = checkpoint_store(&config, pool.as_ref()).await?;

        match action {
            StateAction::Show { target } => {
                let mut checkpoints = store.list().await?;
                if let Some(target) = target {
                    let id = target.parse::<ScrapeTarget>()?.id();
                    checkpoints.retain(|key, _| *key == id);
                }
                println!("{}", serde_json::to_string_pretty(&checkpoints)?);
            }
            StateAction::Reset { target } => {
                let target: ScrapeTarget = target.parse()?;
                if store.clear(&target).await? {
                    println!("{target}: checkpoint cleared");
                } else {
                    println!("{target}: no checkpoint");
                }
            }
        }
        Ok(())
    }
}

/// One HTTP client for every target, carrying the shared rate limiter
fn build_client(config: &Config) -> Result<HttpClient> {
    let http_config = HttpClientConfig::builder()
        .base_url(&config.api.base_url)
        .timeout(Duration::from_secs(config.api.timeout_seconds))
        .rate_limit(config.rate_limit.limiter_config())
        .user_agent(&config.api.user_agent)
        .build();
    HttpClient::with_auth(http_config, config.auth_config())
}

async fn connect(config: &Config) -> Result<PgPool> {
    let url = config
        .store
        .database_url
        .as_deref()
        .ok_or_else(|| Error::missing_field("store.database_url"))?;
    database::connect(url, config.store.max_connections).await
}

async fn checkpoint_store(
    config: &Config,
    pool: Option<&PgPool>,
) -> Result<Arc<dyn CheckpointStore>> {
    match (config.store.checkpoints, pool) {
        (CheckpointBackend::File, _) => Ok(Arc::new(
            FileCheckpointStore::open(&config.store.checkpoint_path).await?,
        )),
        (CheckpointBackend::Postgres, Some(pool)) => {
            Ok(Arc::new(PostgresCheckpointStore::new(pool.clone())))
        }
        (CheckpointBackend::Postgres, None) => Err(Error::missing_field("store.database_url")),
    }
}

/// Print summaries; an error if any target failed
fn report(summaries: &[RunSummary]) -> Result<()> {
    for summary in summaries {
        println!("{summary}");
    }

    let cancelled = summaries
        .iter()
        .filter(|s| s.state == RunState::Cancelled)
        .count();
    if cancelled > 0 {
        warn!(cancelled, "Some targets stopped early; re-run to resume");
    }

    let failed = summaries.iter().filter(|s| s.is_failed()).count();
    if failed > 0 {
        return Err(Error::Other(format!(
            "{failed} of {} targets failed",
            summaries.len()
        )));
    }
    Ok(())
}
