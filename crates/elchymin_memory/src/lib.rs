//! # Elchymin Memory
//!
//! Long-lived state that outlives a single cycle: the associative memory
//! graph, the desire tracker, and mirrored snapshot persistence.

pub mod desires;
pub mod graph;
pub mod persistence;

pub use desires::{Desire, DesireStatus, DesireSweep, DesireTracker};
pub use graph::{memory_id, MemoryGraph, MemoryId, MemoryNode};
pub use persistence::{keep_last, merge_missing, push_bounded, PersistenceError, SnapshotStore};
