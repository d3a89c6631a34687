//! Storage traits and error types
//!
//! This module defines the trait interface for artifact backends and
//! associated error types.

use crate::state::EntityKind;
use std::collections::HashSet;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid artifact id '{0}'")]
    InvalidId(String),

    #[error("Artifact not found: {kind}/{id}")]
    NotFound { kind: EntityKind, id: String },
}

/// Result type for storage operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Outcome of a write-once save
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The artifact was written by this call
    Written,

    /// An artifact was already present; nothing was touched
    AlreadyExists,
}

/// Trait for artifact backends
///
/// Artifacts are raw documents keyed by `(kind, id)` and written at most once.
/// Implementations must be safe to call concurrently for different ids.
pub trait ArtifactStore: Send + Sync {
    /// Returns true if an artifact is present for the key
    fn exists(&self, kind: EntityKind, id: &str) -> bool;

    /// Writes the artifact unless one already exists
    ///
    /// A failed save must leave no partial artifact behind.
    fn save(&self, kind: EntityKind, id: &str, bytes: &[u8]) -> StoreResult<SaveOutcome>;

    /// Reads a previously saved artifact
    fn load(&self, kind: EntityKind, id: &str) -> StoreResult<Vec<u8>>;

    /// Lists the ids stored for a kind
    fn list(&self, kind: EntityKind) -> StoreResult<Vec<String>>;
}

/// Read-only view used by extraction rules to skip already archived entities
pub trait KnownArtifacts {
    fn is_archived(&self, kind: EntityKind, id: &str) -> bool;
}

impl KnownArtifacts for dyn ArtifactStore {
    fn is_archived(&self, kind: EntityKind, id: &str) -> bool {
        self.exists(kind, id)
    }
}

impl KnownArtifacts for HashSet<(EntityKind, String)> {
    fn is_archived(&self, kind: EntityKind, id: &str) -> bool {
        self.contains(&(kind, id.to_string()))
    }
}
