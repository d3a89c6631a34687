//! Storage module for persisting archived documents
//!
//! This module handles:
//! - The write-once artifact store keyed by `(kind, id)`
//! - The existence lookups extraction rules use to skip archived entities

mod fs;
mod traits;

pub use fs::FsArtifactStore;
pub use traits::{ArtifactStore, KnownArtifacts, SaveOutcome, StoreError, StoreResult};
