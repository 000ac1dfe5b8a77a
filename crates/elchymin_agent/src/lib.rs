//! # Elchymin Agent
//!
//! The running agent. A single actor task owns all mutable state and
//! serializes the autonomous cycle with external interactions:
//!
//! 1. wake after an interval shaped by curiosity and depth
//! 2. update the field, maintain memory, evolve desires, produce a thought
//! 3. periodically repair invalid values and snapshot to disk
//!
//! Interactions (`speak`) go through the same task, so they never race the
//! cycle. Repeated failures of the same step put the agent in safe mode.

mod agent;
pub mod diagnostics;
mod heartbeat;
pub mod snapshot;
pub mod state;

pub use agent::{Agent, AgentError, AgentStatus, Lifecycle};
pub use diagnostics::{CycleError, CycleStep, DiagnosticReport, FailureTracker};
pub use heartbeat::next_interval;
pub use snapshot::{Counters, InteractionRecord, Snapshot, SNAPSHOT_VERSION};
pub use state::{
    AgentState, CycleReport, DEFAULT_LAMBDA, LAMBDA_MAX, LAMBDA_MIN, MAX_REALITY_ANCHORS,
};
