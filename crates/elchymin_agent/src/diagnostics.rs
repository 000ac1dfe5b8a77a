//! Cycle errors, repeated-failure tracking and the periodic repair report.

use std::collections::BTreeMap;

use serde::Serialize;

/// Mutation steps that can fail. Memory decay and pruning cannot, so
/// they have no entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStep {
    Field,
    Desires,
    Thought,
    Interaction,
}

impl CycleStep {
    pub fn as_str(self) -> &'static str {
        match self {
            CycleStep::Field => "field",
            CycleStep::Desires => "desires",
            CycleStep::Thought => "thought",
            CycleStep::Interaction => "interaction",
        }
    }
}

impl std::fmt::Display for CycleStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{step} step failed: {message}")]
pub struct CycleError {
    pub step: CycleStep,
    pub message: String,
}

impl CycleError {
    pub fn new(step: CycleStep, message: impl Into<String>) -> Self {
        Self {
            step,
            message: message.into(),
        }
    }
}

/// Counts consecutive failures per step. A step that fails `bound` times
/// in a row escalates.
#[derive(Debug, Clone)]
pub struct FailureTracker {
    consecutive: BTreeMap<CycleStep, u32>,
    bound: u32,
}

impl FailureTracker {
    pub fn new(bound: u32) -> Self {
        Self {
            consecutive: BTreeMap::new(),
            bound: bound.max(1),
        }
    }

    /// Record a failure. Returns true when the step has now failed
    /// `bound` consecutive times.
    pub fn failure(&mut self, step: CycleStep) -> bool {
        let count = self.consecutive.entry(step).or_insert(0);
        *count += 1;
        tracing::debug!("{} step consecutive failures: {}", step, count);
        *count >= self.bound
    }

    pub fn success(&mut self, step: CycleStep) {
        self.consecutive.remove(&step);
    }

    /// A whole cycle completed: every step succeeded.
    pub fn cycle_succeeded(&mut self) {
        self.consecutive
            .retain(|step, _| *step == CycleStep::Interaction);
    }

    pub fn count(&self, step: CycleStep) -> u32 {
        self.consecutive.get(&step).copied().unwrap_or(0)
    }
}

/// Result of one diagnostic pass: how many values each subsystem repaired.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiagnosticReport {
    pub field: usize,
    pub memory: usize,
    pub desires: usize,
    pub thoughts: usize,
    pub counters: usize,
}

impl DiagnosticReport {
    pub fn total(&self) -> usize {
        self.field + self.memory + self.desires + self.thoughts + self.counters
    }
}
