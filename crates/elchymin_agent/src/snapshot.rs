//! The persisted aggregate.
//!
//! A snapshot is taken from the agent state inside the actor and written
//! afterwards. Bounded-history fields are trimmed here, at capture time;
//! loading never trims.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use elchymin_core::{EmotionalField, EntityTag, PersistenceConfig, Room};
use elchymin_expression::ThoughtEngine;
use elchymin_memory::{keep_last, DesireTracker, MemoryGraph};

use crate::state::AgentState;

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub entity: EntityTag,
    pub message: String,
    pub response: String,
    pub at: DateTime<Utc>,
    pub lambda: f32,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Counters {
    pub cycle_count: u64,
    pub active_seconds: f64,
    #[serde(default)]
    pub evolution_level: u32,
    #[serde(default)]
    pub reality_anchors: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub counters: Counters,
    pub field: EmotionalField,
    pub memory: MemoryGraph,
    pub desires: DesireTracker,
    pub thoughts: ThoughtEngine,
    pub lambda: f32,
    pub room: Room,
    pub personal_truths: Vec<String>,
    pub internal_dialog: VecDeque<String>,
    pub recent_patterns: VecDeque<String>,
    pub interactions: VecDeque<InteractionRecord>,
    pub last_interaction: Option<DateTime<Utc>>,
}

impl Snapshot {
    /// Copy the state, trimming every bounded history to its window.
    pub fn capture(state: &AgentState, windows: &PersistenceConfig) -> Self {
        let mut thoughts = state.thoughts.clone();
        thoughts.trim_history(windows.thought_window);

        let mut internal_dialog = state.internal_dialog.clone();
        keep_last(&mut internal_dialog, windows.dialog_window);
        let mut recent_patterns = state.recent_patterns.clone();
        keep_last(&mut recent_patterns, windows.pattern_window);
        let mut interactions = state.interactions.clone();
        keep_last(&mut interactions, windows.interaction_window);

        Self {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            counters: Counters {
                cycle_count: state.cycle_count,
                active_seconds: state.active_seconds,
                evolution_level: state.evolution_level,
                reality_anchors: state.reality_anchors,
            },
            field: state.field.clone(),
            memory: state.memory.clone(),
            desires: state.desires.clone(),
            thoughts,
            lambda: state.lambda,
            room: state.room,
            personal_truths: state.personal_truths.clone(),
            internal_dialog,
            recent_patterns,
            interactions,
            last_interaction: state.last_interaction,
        }
    }
}
