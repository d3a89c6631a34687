//! Run orchestration
//!
//! The coordinator owns everything one run shares: the frontier, the artifact
//! store, the fetch client and the optional metadata index. It seeds the
//! frontier, starts the worker pool, waits for the frontier to drain (or for
//! cancellation) and returns the run summary.

use crate::config::Config;
use crate::crawler::extract::profile_url;
use crate::crawler::fetcher::FetchClient;
use crate::crawler::frontier::Frontier;
use crate::crawler::task::Task;
use crate::crawler::worker::{run_worker, WorkerContext};
use crate::output::{MetadataSink, RunStats, RunSummary, SqliteIndex};
use crate::state::EntityKind;
use crate::storage::{ArtifactStore, FsArtifactStore};
use crate::{ArchiveError, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Main run coordinator
pub struct Coordinator {
    config: Arc<Config>,
    frontier: Arc<Frontier>,
    store: Arc<FsArtifactStore>,
    index: Option<Arc<SqliteIndex>>,
    fetcher: FetchClient,
    cancel: CancellationToken,
    config_hash: Option<String>,
}

impl Coordinator {
    /// Creates a coordinator for one run
    ///
    /// # Arguments
    ///
    /// * `config` - A validated configuration
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Output directories exist and the client is built
    /// * `Err(ArchiveError)` - The store, index or HTTP client could not be set up
    pub fn new(config: Config) -> Result<Self> {
        let store = FsArtifactStore::open(&config.output.directory)?;

        let index = match &config.output.index_path {
            Some(path) => {
                tracing::info!("Opening metadata index at {}", path);
                Some(Arc::new(SqliteIndex::open(Path::new(path))?))
            }
            None => None,
        };

        let fetcher = FetchClient::from_config(&config.portal, &config.crawler)?;

        Ok(Self {
            config: Arc::new(config),
            frontier: Arc::new(Frontier::new()),
            store: Arc::new(store),
            index,
            fetcher,
            cancel: CancellationToken::new(),
            config_hash: None,
        })
    }

    /// Attaches the config fingerprint recorded in the index
    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = Some(hash.into());
        self
    }

    /// Token that stops the run when cancelled
    ///
    /// Workers stop taking tasks; tasks already in hand finish.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The frontier this run drains
    pub fn frontier(&self) -> &Arc<Frontier> {
        &self.frontier
    }

    /// Runs the worker pool until the frontier drains or the run is cancelled
    pub async fn run(self) -> Result<RunSummary> {
        let stats = Arc::new(RunStats::new());

        if let Some(index) = &self.index {
            if let Err(e) = index.begin_run(self.config_hash.as_deref()) {
                tracing::warn!("Failed to record run start in index: {}", e);
            }
        }

        let seeds = seed_tasks(&self.config)?;
        let seed_count = seeds.len();
        for task in seeds {
            if self.frontier.try_enqueue(task) {
                stats.record_enqueued();
            }
        }

        let worker_count = self.config.crawler.workers;
        tracing::info!(
            "Starting run: {} workers, {} seed tasks, output {}",
            worker_count,
            seed_count,
            self.store.root().display()
        );

        let store: Arc<dyn ArtifactStore> = self.store.clone();
        let sink = self
            .index
            .clone()
            .map(|index| index as Arc<dyn MetadataSink>);
        let ctx = WorkerContext {
            frontier: Arc::clone(&self.frontier),
            fetcher: self.fetcher.clone(),
            store,
            sink: sink.clone(),
            stats: Arc::clone(&stats),
            cancel: self.cancel.clone(),
        };

        let mut workers = JoinSet::new();
        for id in 0..worker_count as usize {
            workers.spawn(run_worker(id, ctx.clone()));
        }
        drop(ctx);

        tokio::select! {
            _ = self.frontier.wait_drained() => {
                tracing::info!("Frontier drained");
            }
            _ = self.cancel.cancelled() => {
                tracing::warn!(
                    "Run cancelled; waiting for {} in-flight task(s)",
                    self.frontier.in_flight()
                );
            }
        }

        self.frontier.close();
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!("Worker task ended abnormally: {}", e);
            }
        }

        let summary = stats.snapshot();
        if let Some(sink) = &sink {
            if let Err(e) = sink.finalize(&summary) {
                tracing::warn!("Failed to record run summary in index: {}", e);
            }
        }

        tracing::info!(
            "Run finished: {} written, {} reused, {} completed, {} failed in {:.1}s",
            summary.artifacts_written,
            summary.artifacts_reused,
            summary.tasks_completed,
            summary.tasks_failed,
            summary.elapsed.as_secs_f64()
        );

        Ok(summary)
    }
}

/// Builds the initial tasks: the catalog root plus any user-id seeds
///
/// User ids come from the inclusive `user-id-min..=user-id-max` range and
/// from `user-id-file`, one id per line. Blank lines and lines starting with
/// `#` are ignored. Duplicates are left for the frontier to drop.
pub fn seed_tasks(config: &Config) -> Result<Vec<Task>> {
    let root = Url::parse(&config.portal.root_url)?;
    let mut tasks = Vec::new();

    if config.seeds.catalog {
        tasks.push(Task::catalog(root.clone()));
    }

    if let (Some(min), Some(max)) = (config.seeds.user_id_min, config.seeds.user_id_max) {
        for id in min..=max {
            tasks.push(user_seed(&root, &id.to_string())?);
        }
    }

    if let Some(path) = &config.seeds.user_id_file {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ArchiveError::Seed(format!("cannot read {}: {}", path, e)))?;
        for id in parse_user_ids(&content, path)? {
            tasks.push(user_seed(&root, &id)?);
        }
    }

    Ok(tasks)
}

fn user_seed(root: &Url, id: &str) -> Result<Task> {
    let url = profile_url(root, id)
        .ok_or_else(|| ArchiveError::Seed(format!("cannot build profile URL for user {}", id)))?;
    Ok(Task::new(EntityKind::User, id, url))
}

fn parse_user_ids(content: &str, source: &str) -> Result<Vec<String>> {
    let mut ids = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if !line.chars().all(|c| c.is_ascii_digit()) {
            return Err(ArchiveError::Seed(format!(
                "{}:{}: '{}' is not a user id",
                source,
                line_no + 1,
                line
            )));
        }
        ids.push(line.to_string());
    }
    Ok(ids)
}

/// Runs a complete archive pass with a fresh coordinator
///
/// # Arguments
///
/// * `config` - A validated configuration
///
/// # Returns
///
/// * `Ok(RunSummary)` - The run finished; per-task failures are counted inside
/// * `Err(ArchiveError)` - Setup failed before any worker started
pub async fn run(config: Config) -> Result<RunSummary> {
    Coordinator::new(config)?.run().await
}
