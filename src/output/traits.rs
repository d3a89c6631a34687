//! Metadata sink trait
//!
//! Sinks receive the metadata extracted from each archived document. They are
//! a side channel: the raw artifacts are the record of a run, and a failing
//! sink never fails a task.

use crate::output::records::EntityRecord;
use crate::output::stats::RunSummary;
use thiserror::Error;

/// Errors that can occur while recording metadata
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Sink unavailable: {0}")]
    Unavailable(String),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Receiver for entity metadata
///
/// Implementations are shared by all workers and must be thread-safe.
pub trait MetadataSink: Send + Sync {
    /// Records one extracted entity
    ///
    /// Recording the same entity twice must leave a single row.
    fn record(&self, record: &EntityRecord) -> OutputResult<()>;

    /// Closes out the run with its final counters
    fn finalize(&self, summary: &RunSummary) -> OutputResult<()>;
}
