/// Worker lifecycle states
///
/// Each worker cycles `Idle -> Fetching -> Extracting -> Persisting -> Idle`
/// for every task it holds. A failed task returns to `Idle` from the
/// state it failed in.
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerState {
    /// Waiting on the frontier for a task
    Idle,

    /// Retrieving the document, from the network or the artifact store
    Fetching,

    /// Running the extraction rule for the task kind
    Extracting,

    /// Writing the artifact and metadata
    Persisting,
}

impl WorkerState {
    /// Returns true if the transition is part of the worker cycle
    pub fn can_transition_to(&self, next: WorkerState) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Fetching)
                | (Self::Fetching, Self::Extracting)
                | (Self::Fetching, Self::Idle)
                | (Self::Extracting, Self::Persisting)
                | (Self::Extracting, Self::Idle)
                | (Self::Persisting, Self::Idle)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::Extracting => "extracting",
            Self::Persisting => "persisting",
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
