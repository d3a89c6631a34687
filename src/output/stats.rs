//! Run counters and archive statistics

use crate::output::SqliteIndex;
use crate::state::EntityKind;
use crate::storage::ArtifactStore;
use crate::Result;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Counters shared by all workers during a run
#[derive(Debug)]
pub struct RunStats {
    started: Instant,
    artifacts_written: AtomicU64,
    artifacts_reused: AtomicU64,
    tasks_completed: AtomicU64,
    tasks_failed: AtomicU64,
    tasks_enqueued: AtomicU64,
}

impl RunStats {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            artifacts_written: AtomicU64::new(0),
            artifacts_reused: AtomicU64::new(0),
            tasks_completed: AtomicU64::new(0),
            tasks_failed: AtomicU64::new(0),
            tasks_enqueued: AtomicU64::new(0),
        }
    }

    pub fn record_written(&self) {
        self.artifacts_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reused(&self) {
        self.artifacts_reused.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_enqueued(&self) {
        self.tasks_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.tasks_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a finished task and returns the new total
    pub fn record_completed(&self) -> u64 {
        self.tasks_completed.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Takes a point-in-time copy of the counters
    pub fn snapshot(&self) -> RunSummary {
        RunSummary {
            artifacts_written: self.artifacts_written.load(Ordering::Relaxed),
            artifacts_reused: self.artifacts_reused.load(Ordering::Relaxed),
            tasks_completed: self.tasks_completed.load(Ordering::Relaxed),
            tasks_failed: self.tasks_failed.load(Ordering::Relaxed),
            tasks_enqueued: self.tasks_enqueued.load(Ordering::Relaxed),
            elapsed: self.started.elapsed(),
        }
    }
}

impl Default for RunStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of a run
///
/// `tasks_completed` counts tasks processed without error, whether their
/// artifact was fetched or reused. Failed tasks are counted only in
/// `tasks_failed`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub artifacts_written: u64,
    pub artifacts_reused: u64,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub tasks_enqueued: u64,
    pub elapsed: Duration,
}

impl RunSummary {
    /// Returns the total number of tasks that reached a terminal state
    pub fn total_finished(&self) -> u64 {
        self.tasks_completed + self.tasks_failed
    }

    /// Returns the success rate as a percentage
    pub fn success_rate(&self) -> f64 {
        let finished = self.total_finished();
        if finished == 0 {
            return 0.0;
        }
        (self.tasks_completed as f64 / finished as f64) * 100.0
    }
}

/// Contents of an archive directory and its index
#[derive(Debug, Clone, Default)]
pub struct ArchiveStatistics {
    /// Artifact count per namespace
    pub artifacts: BTreeMap<EntityKind, u64>,

    /// Row count per index table, when an index is configured
    pub index_rows: Option<BTreeMap<&'static str, u64>>,

    /// Most recent run recorded in the index
    pub last_run: Option<String>,
}

impl ArchiveStatistics {
    pub fn total_artifacts(&self) -> u64 {
        self.artifacts.values().sum()
    }
}

/// Counts what an archive holds
///
/// # Arguments
///
/// * `store` - The artifact store to list
/// * `index` - The metadata index, if one is configured
pub fn load_statistics(
    store: &dyn ArtifactStore,
    index: Option<&SqliteIndex>,
) -> Result<ArchiveStatistics> {
    let mut artifacts = BTreeMap::new();
    for kind in EntityKind::all() {
        artifacts.insert(kind, store.list(kind)?.len() as u64);
    }

    let (index_rows, last_run) = match index {
        Some(index) => (Some(index.table_counts()?), index.last_run()?),
        None => (None, None),
    };

    Ok(ArchiveStatistics {
        artifacts,
        index_rows,
        last_run,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &ArchiveStatistics) {
    println!("=== Archive Statistics ===\n");

    println!("Artifacts:");
    for (kind, count) in &stats.artifacts {
        println!("  {}: {}", kind.namespace(), count);
    }
    println!("  total: {}", stats.total_artifacts());
    println!();

    if let Some(rows) = &stats.index_rows {
        println!("Index:");
        for (table, count) in rows {
            println!("  {}: {}", table, count);
        }
        println!();
    }

    if let Some(run) = &stats.last_run {
        println!("Last run: {}", run);
    }
}

/// Prints the summary of a finished run
pub fn print_summary(summary: &RunSummary) {
    println!("=== Run Summary ===\n");
    println!("  Artifacts written: {}", summary.artifacts_written);
    println!("  Artifacts reused: {}", summary.artifacts_reused);
    println!("  Tasks enqueued: {}", summary.tasks_enqueued);
    println!("  Tasks completed: {}", summary.tasks_completed);
    println!("  Tasks failed: {}", summary.tasks_failed);
    println!("  Elapsed: {:.1}s", summary.elapsed.as_secs_f64());
    println!();
    println!(
        "Success Rate: {:.1}% ({} / {} tasks)",
        summary.success_rate(),
        summary.tasks_completed,
        summary.total_finished()
    );
}
