//! Crawler module for discovering and archiving portal documents
//!
//! This module contains the core archiving logic, including:
//! - The deduplicating frontier and its drain detection
//! - HTTP fetching with retry and failure classification
//! - Extraction rules for catalog, semester, course and user pages
//! - The worker pool and run coordination

mod coordinator;
mod extract;
mod fetcher;
mod frontier;
mod task;
mod worker;

pub use coordinator::{run, seed_tasks, Coordinator};
pub use extract::{
    course_url, extract, normalize_text, profile_url, split_category_label, CategoryLabel,
    ExtractError, Extraction,
};
pub use fetcher::{build_http_client, Document, FetchClient, FetchError, RetryPolicy};
pub use frontier::{Frontier, TaskLease};
pub use task::{Task, TaskKey, CATALOG_TASK_ID};
pub use worker::{run_worker, TaskError, WorkerContext};
