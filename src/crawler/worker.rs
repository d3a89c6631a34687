//! Worker loop
//!
//! Each worker repeatedly takes a lease from the frontier, runs the task
//! through fetch, extraction and persistence, enqueues the children it found
//! and then drops the lease. Failures stay inside the task: they are logged,
//! counted and the worker moves on.

use crate::crawler::extract::{extract, ExtractError, Extraction};
use crate::crawler::fetcher::{FetchClient, FetchError};
use crate::crawler::frontier::Frontier;
use crate::crawler::task::Task;
use crate::output::{MetadataSink, RunStats};
use crate::state::WorkerState;
use crate::storage::{ArtifactStore, SaveOutcome, StoreError};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Completed tasks between progress log lines
const PROGRESS_INTERVAL: u64 = 25;

/// Reasons a single task is dropped
#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("malformed document: {0}")]
    Malformed(#[from] ExtractError),

    #[error("store failure: {0}")]
    Store(#[from] StoreError),
}

/// Shared handles every worker runs against
#[derive(Clone)]
pub struct WorkerContext {
    pub frontier: Arc<Frontier>,
    pub fetcher: FetchClient,
    pub store: Arc<dyn ArtifactStore>,
    pub sink: Option<Arc<dyn MetadataSink>>,
    pub stats: Arc<RunStats>,
    pub cancel: CancellationToken,
}

/// How the document for a task was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Network,
    Archive,
}

struct Worker {
    id: usize,
    state: WorkerState,
    ctx: WorkerContext,
}

impl Worker {
    fn transition(&mut self, next: WorkerState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "worker {} cannot go from {} to {}",
            self.id,
            self.state,
            next
        );
        tracing::trace!(worker = self.id, from = %self.state, to = %next, "Worker state");
        self.state = next;
    }

    /// Processes one task; children are enqueued before this returns
    async fn process(&mut self, task: &Task) -> Result<(), TaskError> {
        self.transition(WorkerState::Fetching);
        let (body, source) = self.obtain(task).await?;

        self.transition(WorkerState::Extracting);
        let extraction = extract(task, &body, self.ctx.store.as_ref())?;

        self.transition(WorkerState::Persisting);
        self.persist(task, body, source, &extraction).await?;

        for warning in &extraction.warnings {
            tracing::warn!(kind = %task.kind, id = %task.id, "{}", warning);
        }

        let mut enqueued = 0usize;
        for child in extraction.children {
            if self.ctx.frontier.try_enqueue(child) {
                self.ctx.stats.record_enqueued();
                enqueued += 1;
            }
        }
        tracing::debug!(
            worker = self.id,
            kind = %task.kind,
            id = %task.id,
            children = enqueued,
            "Task finished"
        );

        Ok(())
    }

    /// Loads the stored artifact if there is one, otherwise fetches
    async fn obtain(&self, task: &Task) -> Result<(Vec<u8>, Source), TaskError> {
        if let Some(kind) = task.kind.entity() {
            if self.ctx.store.exists(kind, &task.id) {
                let id = task.id.clone();
                let body = blocking_store(&self.ctx.store, move |store| store.load(kind, &id)).await?;
                tracing::debug!(kind = %kind, id = %task.id, "Reusing archived artifact");
                return Ok((body, Source::Archive));
            }
        }

        let document = self.ctx.fetcher.fetch(&task.url).await?;
        Ok((document.body, Source::Network))
    }

    async fn persist(
        &self,
        task: &Task,
        body: Vec<u8>,
        source: Source,
        extraction: &Extraction,
    ) -> Result<(), TaskError> {
        match (source, &extraction.key) {
            (Source::Archive, _) => self.ctx.stats.record_reused(),
            (Source::Network, Some((kind, id))) => {
                let bytes = body.len();
                let (save_kind, save_id) = (*kind, id.clone());
                let outcome = blocking_store(&self.ctx.store, move |store| {
                    store.save(save_kind, &save_id, &body)
                })
                .await?;
                match outcome {
                    SaveOutcome::Written => {
                        self.ctx.stats.record_written();
                        tracing::info!(kind = %kind, id = %id, bytes, "Artifact written");
                    }
                    SaveOutcome::AlreadyExists => {
                        tracing::debug!(kind = %kind, id = %id, "Artifact already present");
                    }
                }
            }
            (Source::Network, None) => {}
        }

        if let Some(sink) = &self.ctx.sink {
            for record in &extraction.records {
                if let Err(e) = sink.record(record) {
                    tracing::warn!(kind = %task.kind, id = %task.id, "Failed to index metadata: {}", e);
                }
            }
        }

        Ok(())
    }
}

/// Runs a store call on the blocking pool so file I/O does not stall fetches
async fn blocking_store<T, F>(store: &Arc<dyn ArtifactStore>, op: F) -> Result<T, StoreError>
where
    F: FnOnce(&dyn ArtifactStore) -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || op(store.as_ref()))
        .await
        .map_err(|e| StoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
}

/// Runs one worker until the frontier drains, closes or the run is cancelled
///
/// A cancelled worker stops taking new tasks. A task already in hand runs to
/// completion so no artifact is left half written.
pub async fn run_worker(id: usize, ctx: WorkerContext) {
    let mut worker = Worker {
        id,
        state: WorkerState::Idle,
        ctx,
    };
    tracing::debug!(worker = id, "Worker started");

    loop {
        let lease = tokio::select! {
            biased;
            _ = worker.ctx.cancel.cancelled() => break,
            lease = worker.ctx.frontier.next_task() => lease,
        };
        let Some(lease) = lease else {
            break;
        };

        let task = lease.task().clone();
        tracing::debug!(worker = id, kind = %task.kind, id = %task.id, url = %task.url, "Task started");

        match worker.process(&task).await {
            Ok(()) => {
                let completed = worker.ctx.stats.record_completed();
                if completed % PROGRESS_INTERVAL == 0 {
                    tracing::info!(
                        "Progress: {} tasks completed, {} queued, {} in flight",
                        completed,
                        worker.ctx.frontier.pending(),
                        worker.ctx.frontier.in_flight()
                    );
                }
            }
            Err(e) => {
                worker.ctx.stats.record_failed();
                tracing::error!(kind = %task.kind, id = %task.id, url = %task.url, "Task failed: {}", e);
            }
        }

        worker.transition(WorkerState::Idle);
        drop(lease);
    }

    tracing::debug!(worker = id, "Worker stopped");
}
