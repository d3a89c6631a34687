//! Output module for run results and extracted metadata
//!
//! This module handles:
//! - Typed metadata records read from archived documents
//! - Recording that metadata through a [`MetadataSink`]
//! - Run counters and archive statistics

mod records;
mod sqlite_index;
pub mod stats;
mod traits;

pub use records::{CourseRecord, EntityRecord, ProfileFields, SemesterRecord, UserRecord};
pub use sqlite_index::SqliteIndex;
pub use stats::{
    load_statistics, print_statistics, print_summary, ArchiveStatistics, RunStats, RunSummary,
};
pub use traits::{MetadataSink, OutputError, OutputResult};
