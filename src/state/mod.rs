//! State module for kinds and worker lifecycle
//!
//! # Components
//!
//! - `EntityKind`: the three archived document types and their namespaces
//! - `TaskKind`: an entity kind, or the catalog page that seeds discovery
//! - `WorkerState`: the per-worker processing cycle

mod entity_kind;
mod worker_state;

// Re-export main types
pub use entity_kind::{EntityKind, TaskKind};
pub use worker_state::WorkerState;
