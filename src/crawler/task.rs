use crate::state::TaskKind;
use std::fmt;
use url::Url;

/// Identifier used for the single catalog discovery task
pub const CATALOG_TASK_ID: &str = "catalog";

/// Deduplication key of a task
pub type TaskKey = (TaskKind, String);

/// A pending unit of discovery/fetch work for one entity
///
/// `id` is the natural key parsed from the source URL (category id, course
/// id, user id). Tasks are never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub kind: TaskKind,
    pub id: String,
    pub url: Url,
}

impl Task {
    pub fn new(kind: impl Into<TaskKind>, id: impl Into<String>, url: Url) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
            url,
        }
    }

    /// The root task: the catalog page listing every course category
    pub fn catalog(url: Url) -> Self {
        Self::new(TaskKind::Catalog, CATALOG_TASK_ID, url)
    }

    /// Returns the key the frontier deduplicates on
    pub fn key(&self) -> TaskKey {
        (self.kind, self.id.clone())
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}
