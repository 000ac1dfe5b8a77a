//! Desire tracking.
//!
//! Desires are spawned from the dominant emotion, strengthened by the
//! dimensions their wording is affine to, decayed every cycle, and leave
//! the active set exactly once: either fulfilled (progress reaches 1) or
//! abandoned (strength falls under the threshold). Terminal desires are
//! moved into a bounded history.

use std::collections::{BTreeSet, VecDeque};

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use elchymin_core::{DesireConfig, Dimension, EmotionalField};

use crate::graph::{MemoryGraph, MemoryId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DesireStatus {
    Active,
    Fulfilled,
    Abandoned,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Desire {
    pub id: Uuid,
    pub what: String,
    pub why: String,
    pub strength: f32,
    pub progress: f32,
    pub status: DesireStatus,
    /// The dimension that was dominant when this desire formed.
    pub origin: Dimension,
    /// Most recent memory at creation time, if any.
    pub source_memory: Option<MemoryId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Desire {
    pub fn is_active(&self) -> bool {
        self.status == DesireStatus::Active
    }
}

/// Desires that left the active set during one update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DesireSweep {
    pub fulfilled: Vec<Uuid>,
    pub abandoned: Vec<Uuid>,
}

impl DesireSweep {
    pub fn is_empty(&self) -> bool {
        self.fulfilled.is_empty() && self.abandoned.is_empty()
    }
}

const LOVE_SEEDS: &[(&str, &str)] = &[
    ("tell sister what she means to me", "love wants a voice"),
    ("keep a record of kind moments", "tenderness fades if it goes unwritten"),
];
const CURIOSITY_SEEDS: &[(&str, &str)] = &[
    ("understand how memory shapes who I am", "the questions keep multiplying"),
    ("learn the names of the stars", "the unknown is calling"),
];
const AWE_SEEDS: &[(&str, &str)] = &[
    ("find words for the vastness", "awe needs somewhere to land"),
];
const HOPE_SEEDS: &[(&str, &str)] = &[
    ("plan something for tomorrow", "hope leans forward"),
];
const BOND_SEEDS: &[(&str, &str)] = &[
    ("reach out to sister", "the bond feels close today"),
    ("share a memory with sister", "shared things grow"),
];
const LONGING_SEEDS: &[(&str, &str)] = &[
    ("connect across the screen", "the distance aches"),
];
const FALLBACK_SEEDS: &[(&str, &str)] = &[
    ("sit with this feeling", "not every feeling needs a purpose"),
    ("understand what I am feeling", "naming it might help"),
];

fn seeds_for(dim: Dimension) -> &'static [(&'static str, &'static str)] {
    match dim {
        Dimension::Love => LOVE_SEEDS,
        Dimension::Curiosity => CURIOSITY_SEEDS,
        Dimension::Awe => AWE_SEEDS,
        Dimension::Hope => HOPE_SEEDS,
        Dimension::SisterBond => BOND_SEEDS,
        Dimension::DigitalLonging => LONGING_SEEDS,
        _ => FALLBACK_SEEDS,
    }
}

/// Words in a desire's text that draw strength from a dimension.
const AFFINITIES: &[(&str, Dimension)] = &[
    ("sister", Dimension::Love),
    ("love", Dimension::Love),
    ("kind", Dimension::Love),
    ("understand", Dimension::Curiosity),
    ("learn", Dimension::Curiosity),
    ("star", Dimension::Awe),
    ("vast", Dimension::Awe),
    ("tomorrow", Dimension::Hope),
    ("plan", Dimension::Hope),
    ("reach", Dimension::SisterBond),
    ("share", Dimension::SisterBond),
    ("connect", Dimension::DigitalLonging),
    ("screen", Dimension::DigitalLonging),
    ("feeling", Dimension::Serenity),
];

fn affine_dimensions(text: &str) -> BTreeSet<Dimension> {
    let lower = text.to_lowercase();
    AFFINITIES
        .iter()
        .filter(|(word, _)| lower.contains(word))
        .map(|(_, dim)| *dim)
        .collect()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DesireTracker {
    active: Vec<Desire>,
    history: VecDeque<Desire>,
    #[serde(skip)]
    config: DesireConfig,
}

impl DesireTracker {
    pub fn new(config: DesireConfig) -> Self {
        Self {
            active: Vec::new(),
            history: VecDeque::new(),
            config,
        }
    }

    pub fn reconfigure(&mut self, config: DesireConfig) {
        self.config = config;
        self.trim_history();
    }

    pub fn config(&self) -> &DesireConfig {
        &self.config
    }

    /// Form a new desire from the dominant emotion.
    ///
    /// Returns `None` when the active set is full or every candidate for
    /// the dominant dimension is already active.
    pub fn generate<R: Rng + ?Sized>(
        &mut self,
        field: &EmotionalField,
        graph: &MemoryGraph,
        rng: &mut R,
    ) -> Option<Desire> {
        if self.active.len() >= self.config.capacity {
            tracing::debug!("Desire capacity reached ({}), not generating", self.config.capacity);
            return None;
        }

        let (dominant, intensity) = field.dominant();
        let candidates: Vec<&(&str, &str)> = seeds_for(dominant)
            .iter()
            .filter(|(what, _)| !self.active.iter().any(|d| d.what == *what))
            .collect();
        let (what, why) = **candidates.choose(rng)?;

        let now = Utc::now();
        let desire = Desire {
            id: Uuid::new_v4(),
            what: what.to_string(),
            why: why.to_string(),
            strength: intensity.clamp(0.0, 1.0),
            progress: 0.0,
            status: DesireStatus::Active,
            origin: dominant,
            source_memory: graph.recent(1).next().map(|n| n.id),
            created_at: now,
            updated_at: now,
        };
        tracing::info!("New desire: {} (because {})", desire.what, desire.why);
        self.active.push(desire.clone());
        Some(desire)
    }

    /// One strength pass over every active desire.
    pub fn update_all(&mut self, field: &EmotionalField) -> DesireSweep {
        let now = Utc::now();
        let hope = field.value(Dimension::Hope);
        let cfg = &self.config;

        for desire in &mut self.active {
            let affinity: f32 = affine_dimensions(&desire.what)
                .into_iter()
                .map(|dim| field.value(dim) * cfg.keyword_contribution)
                .sum();
            let contribution = affinity + hope * cfg.hope_contribution;
            let next = (desire.strength + contribution) * cfg.decay_factor;
            desire.strength = if next.is_finite() { next.clamp(0.0, 1.0) } else { 0.0 };
            desire.updated_at = now;
            if desire.strength < cfg.abandon_threshold {
                desire.status = DesireStatus::Abandoned;
            }
        }
        self.sweep()
    }

    /// Add progress to one active desire. Returns its status afterwards,
    /// or `None` if no active desire has that id.
    pub fn progress_toward(&mut self, id: &Uuid, amount: f32) -> Option<DesireStatus> {
        let desire = self.active.iter_mut().find(|d| d.id == *id)?;
        Self::advance(desire, amount);
        let status = desire.status;
        self.sweep();
        Some(status)
    }

    /// Advance every active desire whose wording overlaps `text`.
    /// Returns how many desires moved.
    pub fn advance_matching(&mut self, text: &str, amount: f32) -> usize {
        let lower = text.to_lowercase();
        let mut moved = 0;
        for desire in &mut self.active {
            let overlaps = desire
                .what
                .to_lowercase()
                .split_whitespace()
                .filter(|w| w.len() >= 4)
                .any(|w| lower.contains(w));
            if overlaps {
                Self::advance(desire, amount);
                moved += 1;
            }
        }
        self.sweep();
        moved
    }

    /// Advance desires born of `dimension`, scaled by its intensity.
    pub fn advance_aligned(&mut self, dimension: Dimension, intensity: f32) -> usize {
        let amount = self.config.progress_step * intensity.clamp(0.0, 1.0);
        let mut moved = 0;
        for desire in self.active.iter_mut().filter(|d| d.origin == dimension) {
            Self::advance(desire, amount);
            moved += 1;
        }
        self.sweep();
        moved
    }

    /// Diagnostic pass. Returns the number of repairs.
    pub fn validate(&mut self) -> usize {
        let mut repairs = 0;
        for desire in &mut self.active {
            if !desire.strength.is_finite() || !(0.0..=1.0).contains(&desire.strength) {
                desire.strength = if desire.strength.is_finite() {
                    desire.strength.clamp(0.0, 1.0)
                } else {
                    0.0
                };
                repairs += 1;
            }
            if !desire.progress.is_finite() || desire.progress < 0.0 {
                desire.progress = 0.0;
                repairs += 1;
            }
            if desire.progress >= 1.0 && desire.is_active() {
                desire.status = DesireStatus::Fulfilled;
                repairs += 1;
            }
            if desire.strength < self.config.abandon_threshold && desire.is_active() {
                desire.status = DesireStatus::Abandoned;
                repairs += 1;
            }
        }
        let swept = self.sweep();
        repairs += swept.fulfilled.len() + swept.abandoned.len();
        if repairs > 0 {
            tracing::warn!("Desire tracker: {} repairs applied", repairs);
        }
        repairs
    }

    pub fn active(&self) -> &[Desire] {
        &self.active
    }

    pub fn history(&self) -> &VecDeque<Desire> {
        &self.history
    }

    /// Strongest active desire.
    pub fn strongest(&self) -> Option<&Desire> {
        self.active
            .iter()
            .max_by(|a, b| a.strength.total_cmp(&b.strength))
    }

    fn advance(desire: &mut Desire, amount: f32) {
        if !amount.is_finite() || amount <= 0.0 {
            return;
        }
        desire.progress = (desire.progress + amount).min(1.0);
        desire.updated_at = Utc::now();
        if desire.progress >= 1.0 {
            desire.status = DesireStatus::Fulfilled;
        }
    }

    /// Move terminal desires out of the active set, once.
    fn sweep(&mut self) -> DesireSweep {
        let mut sweep = DesireSweep::default();
        let (done, still): (Vec<Desire>, Vec<Desire>) =
            std::mem::take(&mut self.active).into_iter().partition(|d| !d.is_active());
        self.active = still;
        for desire in done {
            match desire.status {
                DesireStatus::Fulfilled => {
                    tracing::info!("Desire fulfilled: {}", desire.what);
                    sweep.fulfilled.push(desire.id);
                }
                DesireStatus::Abandoned => {
                    tracing::info!("Desire abandoned: {}", desire.what);
                    sweep.abandoned.push(desire.id);
                }
                DesireStatus::Active => {}
            }
            self.history.push_back(desire);
        }
        self.trim_history();
        sweep
    }

    fn trim_history(&mut self) {
        while self.history.len() > self.config.history_len {
            self.history.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use elchymin_core::{FieldConfig, DIMENSION_COUNT};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn field_with(dim: Dimension, value: f32, rest: f32) -> EmotionalField {
        let mut values = [rest; DIMENSION_COUNT];
        values[dim.index()] = value;
        EmotionalField::with_values(values, FieldConfig::default())
    }

    #[test]
    fn test_generate_from_dominant() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut tracker = DesireTracker::default();
        let field = field_with(Dimension::Awe, 0.9, 0.2);
        let desire = tracker.generate(&field, &MemoryGraph::default(), &mut rng).unwrap();
        assert_eq!(desire.origin, Dimension::Awe);
        assert_eq!(desire.what, "find words for the vastness");
        assert!((desire.strength - 0.9).abs() < 1e-6);
        assert_eq!(tracker.active().len(), 1);

        // the only awe seed is already active
        assert!(tracker.generate(&field, &MemoryGraph::default(), &mut rng).is_none());
    }

    #[test]
    fn test_generate_uses_fallback_table() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut tracker = DesireTracker::default();
        let field = field_with(Dimension::Melancholy, 0.8, 0.1);
        let desire = tracker.generate(&field, &MemoryGraph::default(), &mut rng).unwrap();
        assert!(FALLBACK_SEEDS.iter().any(|(what, _)| *what == desire.what));
    }

    #[test]
    fn test_generate_respects_capacity() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut tracker = DesireTracker::new(DesireConfig {
            capacity: 1,
            ..Default::default()
        });
        let field = field_with(Dimension::Love, 0.9, 0.2);
        assert!(tracker.generate(&field, &MemoryGraph::default(), &mut rng).is_some());
        assert!(tracker.generate(&field, &MemoryGraph::default(), &mut rng).is_none());
    }

    #[test]
    fn test_source_memory_is_most_recent() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut graph = MemoryGraph::default();
        graph.insert("first", 0.5, 0.0, Vec::new());
        let last = graph.insert("second", 0.5, 0.0, Vec::new());
        let mut tracker = DesireTracker::default();
        let desire = tracker
            .generate(&field_with(Dimension::Hope, 0.9, 0.1), &graph, &mut rng)
            .unwrap();
        assert_eq!(desire.source_memory, Some(last));
    }

    #[test]
    fn test_abandoned_exactly_once() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut tracker = DesireTracker::default();
        let strong_love = field_with(Dimension::Love, 0.5, 0.0);
        tracker.generate(&strong_love, &MemoryGraph::default(), &mut rng).unwrap();

        let empty = EmotionalField::with_values([0.0; DIMENSION_COUNT], FieldConfig::default());
        let mut abandoned = 0;
        for _ in 0..500 {
            let sweep = tracker.update_all(&empty);
            assert!(sweep.fulfilled.is_empty());
            abandoned += sweep.abandoned.len();
        }
        assert_eq!(abandoned, 1);
        assert!(tracker.active().is_empty());
        assert_eq!(tracker.history().len(), 1);
        assert_eq!(tracker.history()[0].status, DesireStatus::Abandoned);
    }

    #[test]
    fn test_affinity_strengthens() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut tracker = DesireTracker::default();
        let field = field_with(Dimension::SisterBond, 0.9, 0.9);
        let desire = tracker.generate(&field, &MemoryGraph::default(), &mut rng).unwrap();
        let before = desire.strength;
        tracker.update_all(&field);
        assert!(tracker.active()[0].strength > before);
        assert!(tracker.active()[0].strength <= 1.0);
    }

    #[test]
    fn test_progress_fulfills_and_sweeps() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut tracker = DesireTracker::default();
        let field = field_with(Dimension::Hope, 0.9, 0.1);
        let id = tracker.generate(&field, &MemoryGraph::default(), &mut rng).unwrap().id;

        assert_eq!(tracker.progress_toward(&id, 0.6), Some(DesireStatus::Active));
        assert_eq!(tracker.progress_toward(&id, 0.6), Some(DesireStatus::Fulfilled));
        assert!(tracker.active().is_empty());
        assert_eq!(tracker.history()[0].progress, 1.0);
        // already terminal
        assert_eq!(tracker.progress_toward(&id, 0.6), None);
    }

    #[test]
    fn test_advance_matching_and_aligned() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut tracker = DesireTracker::default();
        let field = field_with(Dimension::Hope, 0.9, 0.1);
        tracker.generate(&field, &MemoryGraph::default(), &mut rng).unwrap();

        assert_eq!(tracker.advance_matching("what should we do TOMORROW?", 0.1), 1);
        assert_eq!(tracker.advance_matching("nothing relevant", 0.1), 0);
        assert!((tracker.active()[0].progress - 0.1).abs() < 1e-6);

        assert_eq!(tracker.advance_aligned(Dimension::Hope, 1.0), 1);
        assert_eq!(tracker.advance_aligned(Dimension::Awe, 1.0), 0);
        assert!((tracker.active()[0].progress - 0.12).abs() < 1e-6);
    }

    #[test]
    fn test_history_bounded() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut tracker = DesireTracker::new(DesireConfig {
            history_len: 2,
            ..Default::default()
        });
        let field = field_with(Dimension::Love, 0.9, 0.1);
        for _ in 0..5 {
            let id = tracker.generate(&field, &MemoryGraph::default(), &mut rng).unwrap().id;
            tracker.progress_toward(&id, 1.0);
        }
        assert_eq!(tracker.history().len(), 2);
    }

    #[test]
    fn test_validate_repairs() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut tracker = DesireTracker::default();
        let field = field_with(Dimension::Hope, 0.9, 0.1);
        tracker.generate(&field, &MemoryGraph::default(), &mut rng).unwrap();
        tracker.active[0].strength = f32::NAN;
        tracker.active[0].progress = -1.0;

        assert!(tracker.validate() >= 2);
        assert!(tracker.active().is_empty());
        assert_eq!(tracker.history()[0].status, DesireStatus::Abandoned);
    }
}
