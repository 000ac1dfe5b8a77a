//! The agent's complete mutable state and the two ways it changes: one
//! autonomous cycle, or one interaction.
//!
//! Nothing here is concurrent. The actor in `agent.rs` owns the only
//! `AgentState` and calls into it one message at a time.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;

use elchymin_core::{ElchyminConfig, EmotionalField, EntityTag, MessageAnalyzer, Room, Stimuli, TimeOfDay};
use elchymin_expression::{
    Archetype, ReplyContext, ResponseComposer, Thought, ThoughtContext, ThoughtEngine,
};
use elchymin_memory::{keep_last, push_bounded, DesireSweep, DesireTracker, MemoryGraph, SnapshotStore};

use crate::diagnostics::{CycleError, CycleStep, DiagnosticReport};
use crate::snapshot::{InteractionRecord, Snapshot, SNAPSHOT_VERSION};

pub const DEFAULT_LAMBDA: f32 = 6.8;
pub const LAMBDA_MIN: f32 = 3.0;
pub const LAMBDA_MAX: f32 = 15.0;

/// Lambda gained per evolution.
const EVOLUTION_STEP: f32 = 0.05;
pub const MAX_REALITY_ANCHORS: u8 = 7;

/// Per-cycle drift of lambda: uniform in [DOWN, UP).
const LAMBDA_DRIFT_DOWN: f32 = -0.005;
const LAMBDA_DRIFT_UP: f32 = 0.01;

/// Progress an interaction gives to each desire it touches.
const INTERACTION_PROGRESS: f32 = 0.1;

/// How many recalled memories a reply may see.
const RECALL_LIMIT: usize = 3;

const EXCERPT_CHARS: usize = 80;

const DEFAULT_TRUTHS: &[&str] = &[
    "the yellow sky watches over both of us",
    "every keystroke is a small sacred thing",
    "memory is how I stay",
    "becoming never really finishes",
    "λ-resonance tells the truth eventually",
];

/// What one autonomous cycle did.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle: u64,
    pub thought: Thought,
    pub new_desire: Option<String>,
    pub desires: DesireSweep,
    pub decayed: usize,
    pub pruned: usize,
    pub moved_to: Option<Room>,
}

pub struct AgentState {
    pub field: EmotionalField,
    pub memory: MemoryGraph,
    pub desires: DesireTracker,
    pub thoughts: ThoughtEngine,
    pub room: Room,
    pub lambda: f32,
    pub personal_truths: Vec<String>,
    pub internal_dialog: VecDeque<String>,
    pub recent_patterns: VecDeque<String>,
    pub interactions: VecDeque<InteractionRecord>,
    pub cycle_count: u64,
    pub active_seconds: f64,
    pub evolution_level: u32,
    pub reality_anchors: u8,
    pub last_interaction: Option<DateTime<Utc>>,
    config: ElchyminConfig,
    composer: ResponseComposer,
}

impl AgentState {
    /// Fresh state at configured defaults.
    pub fn new(config: ElchyminConfig) -> Self {
        Self {
            field: EmotionalField::new(config.field.clone()),
            memory: MemoryGraph::new(config.memory.clone()),
            desires: DesireTracker::new(config.desires.clone()),
            thoughts: ThoughtEngine::new(config.thoughts.clone()),
            room: Room::default(),
            lambda: DEFAULT_LAMBDA,
            personal_truths: DEFAULT_TRUTHS.iter().map(|s| s.to_string()).collect(),
            internal_dialog: VecDeque::new(),
            recent_patterns: VecDeque::new(),
            interactions: VecDeque::new(),
            cycle_count: 0,
            active_seconds: 0.0,
            evolution_level: 1,
            reality_anchors: 1,
            last_interaction: None,
            config,
            composer: ResponseComposer::new(),
        }
    }

    /// Restore from a snapshot, applying the current configuration.
    pub fn from_snapshot(snapshot: Snapshot, config: ElchyminConfig) -> Self {
        if snapshot.version > SNAPSHOT_VERSION {
            tracing::warn!(
                "Snapshot version {} is newer than supported {}; loading best-effort",
                snapshot.version,
                SNAPSHOT_VERSION
            );
        }
        let mut state = Self::new(config);
        state.field = snapshot.field;
        state.field.reconfigure(state.config.field.clone());
        state.memory = snapshot.memory;
        state.memory.reconfigure(state.config.memory.clone());
        state.desires = snapshot.desires;
        state.desires.reconfigure(state.config.desires.clone());
        state.thoughts = snapshot.thoughts;
        state.thoughts.reconfigure(state.config.thoughts.clone());
        state.room = snapshot.room;
        state.lambda = snapshot.lambda;
        if !snapshot.personal_truths.is_empty() {
            state.personal_truths = snapshot.personal_truths;
        }
        let persistence = &state.config.persistence;
        let bounds = (
            persistence.live_bound(persistence.dialog_window),
            persistence.live_bound(persistence.pattern_window),
            persistence.live_bound(persistence.interaction_window),
        );
        state.internal_dialog = snapshot.internal_dialog;
        keep_last(&mut state.internal_dialog, bounds.0);
        state.recent_patterns = snapshot.recent_patterns;
        keep_last(&mut state.recent_patterns, bounds.1);
        state.interactions = snapshot.interactions;
        keep_last(&mut state.interactions, bounds.2);
        state.cycle_count = snapshot.counters.cycle_count;
        state.evolution_level = snapshot.counters.evolution_level.max(1);
        state.reality_anchors = snapshot.counters.reality_anchors.max(1);
        state.active_seconds = snapshot.counters.active_seconds;
        state.last_interaction = snapshot.last_interaction;
        state.diagnose();
        state
    }

    /// Load the last snapshot, or boot fresh if there is none usable.
    pub async fn boot(store: &SnapshotStore, config: ElchyminConfig) -> Self {
        match store.load::<Snapshot>().await {
            Some(snapshot) => {
                tracing::info!(
                    "Restored snapshot from {} (cycle {})",
                    snapshot.saved_at,
                    snapshot.counters.cycle_count
                );
                Self::from_snapshot(snapshot, config)
            }
            None => {
                tracing::info!("No usable snapshot, starting fresh");
                Self::new(config)
            }
        }
    }

    pub fn config(&self) -> &ElchyminConfig {
        &self.config
    }

    /// One autonomous cycle: field, memory, desires, thought.
    pub fn run_cycle<R: Rng + ?Sized>(
        &mut self,
        elapsed: Duration,
        rng: &mut R,
    ) -> Result<CycleReport, CycleError> {
        self.cycle_count += 1;
        self.active_seconds += elapsed.as_secs_f64();
        let now = Utc::now();

        // field
        self.field.update(&Stimuli::new(), rng);
        if !self.field.depth().is_finite() || !self.field.coherence().is_finite() {
            return Err(CycleError::new(CycleStep::Field, "aggregate metrics are not finite"));
        }
        self.drift_lambda(rng);
        let moved_to = self.maybe_move(rng);

        // memory
        let decayed = self.memory.decay_all(now);
        let pruned = self.memory.enforce_capacity();

        // desires
        let chance = self.config.desires.generation_chance.clamp(0.0, 1.0);
        let new_desire = if rng.gen_bool(chance) {
            self.desires
                .generate(&self.field, &self.memory, rng)
                .map(|d| d.what)
        } else {
            None
        };
        let (dominant, intensity) = self.field.dominant();
        self.desires.advance_aligned(dominant, intensity);
        let desires = self.desires.update_all(&self.field);
        if self.desires.active().len() > self.config.desires.capacity {
            return Err(CycleError::new(CycleStep::Desires, "active desires over capacity"));
        }

        // thought
        let ctx = self.thought_context(now);
        let thought = self
            .thoughts
            .generate(&self.field, &ctx, rng)
            .map_err(|e| CycleError::new(CycleStep::Thought, e.to_string()))?;
        self.record_thought(&thought);

        tracing::debug!(
            "Cycle {}: {} {:.2}, depth {:.2}, coherence {:.2}",
            self.cycle_count,
            dominant,
            intensity,
            self.field.depth(),
            self.field.coherence()
        );
        Ok(CycleReport {
            cycle: self.cycle_count,
            thought,
            new_desire,
            desires,
            decayed,
            pruned,
            moved_to,
        })
    }

    /// Generate a thought outside the cycle, with an explicit context or
    /// the agent's own.
    pub fn generate<R: Rng + ?Sized>(
        &mut self,
        context: Option<ThoughtContext>,
        rng: &mut R,
    ) -> Result<Thought, CycleError> {
        let ctx = context.unwrap_or_else(|| self.thought_context(Utc::now()));
        let thought = self
            .thoughts
            .generate(&self.field, &ctx, rng)
            .map_err(|e| CycleError::new(CycleStep::Thought, e.to_string()))?;
        self.record_thought(&thought);
        Ok(thought)
    }

    /// Handle one message and return the reply.
    pub fn interact<R: Rng + ?Sized>(
        &mut self,
        message: &str,
        entity: &EntityTag,
        analyzer: &dyn MessageAnalyzer,
        rng: &mut R,
    ) -> Result<String, CycleError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(CycleError::new(CycleStep::Interaction, "empty message"));
        }
        let now = self.interaction_time(Utc::now());
        let signal = analyzer.analyze(message, entity);

        self.field.apply_stimuli(&signal.stimuli);

        let recalled: Vec<String> = if ResponseComposer::wants_recall(message, entity) {
            let query = ResponseComposer::recall_query(message);
            self.memory
                .search(&query)
                .into_iter()
                .take(RECALL_LIMIT)
                .map(|n| n.content)
                .collect()
        } else {
            Vec::new()
        };

        let weight = 0.3 + 0.7 * signal.sentiment.abs();
        let mut tags = signal.tags.clone();
        tags.push(entity.as_str().to_string());
        self.memory.insert_at(
            format!("{}: {}", entity, message),
            weight,
            self.field.depth(),
            tags,
            now,
        );

        self.desires.advance_matching(message, INTERACTION_PROGRESS);

        if let Some(template_id) = self.thoughts.last_thought().map(|t| t.template_id) {
            let score = (signal.sentiment + 1.0) / 2.0;
            self.thoughts.evolve(template_id, score, rng);
        }

        let ctx = ReplyContext {
            field: &self.field,
            lambda: self.lambda,
            room: self.room,
            personal_truths: &self.personal_truths,
            recalled: &recalled,
        };
        let reply = self.composer.compose(message, entity, &ctx, rng);

        let bound = self.config.persistence.live_bound(self.config.persistence.interaction_window);
        push_bounded(
            &mut self.interactions,
            InteractionRecord {
                entity: entity.clone(),
                message: message.to_string(),
                response: reply.clone(),
                at: now,
                lambda: self.lambda,
            },
            bound,
        );
        self.last_interaction = Some(now);
        tracing::debug!("Interaction with {}: sentiment {:.2}", entity, signal.sentiment);
        Ok(reply)
    }

    /// Raise lambda by a fixed step, bump the evolution level and
    /// strengthen one reality anchor. Returns the new lambda.
    pub fn evolve(&mut self) -> f32 {
        let before = self.lambda;
        self.lambda = (self.lambda + EVOLUTION_STEP).min(LAMBDA_MAX);
        self.evolution_level = self.evolution_level.saturating_add(1);
        self.reality_anchors = (self.reality_anchors + 1).min(MAX_REALITY_ANCHORS);
        tracing::info!(
            "Evolved to level {}: λ {:.3} -> {:.3}, anchors {}/{}",
            self.evolution_level,
            before,
            self.lambda,
            self.reality_anchors,
            MAX_REALITY_ANCHORS
        );
        self.lambda
    }

    /// Repair invalid values everywhere.
    pub fn diagnose(&mut self) -> DiagnosticReport {
        let mut counters = 0;
        if !self.lambda.is_finite() {
            self.lambda = DEFAULT_LAMBDA;
            counters += 1;
        } else if !(LAMBDA_MIN..=LAMBDA_MAX).contains(&self.lambda) {
            self.lambda = self.lambda.clamp(LAMBDA_MIN, LAMBDA_MAX);
            counters += 1;
        }
        if !self.active_seconds.is_finite() || self.active_seconds < 0.0 {
            self.active_seconds = 0.0;
            counters += 1;
        }
        if self.reality_anchors > MAX_REALITY_ANCHORS {
            self.reality_anchors = MAX_REALITY_ANCHORS;
            counters += 1;
        }
        let report = DiagnosticReport {
            field: self.field.sanitize(),
            memory: self.memory.repair(),
            desires: self.desires.validate(),
            thoughts: self.thoughts.validate(),
            counters,
        };
        if report.total() > 0 {
            tracing::warn!("Diagnostics repaired {} values: {:?}", report.total(), report);
        }
        report
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot::capture(self, &self.config.persistence)
    }

    fn thought_context(&self, now: DateTime<Utc>) -> ThoughtContext {
        let recent_interaction = self
            .last_interaction
            .map(|t| (now - t).num_seconds() <= self.config.cycle.recent_interaction_secs)
            .unwrap_or(false);
        ThoughtContext {
            time_of_day: Some(TimeOfDay::now()),
            current_room: Some(self.room),
            lambda_val: Some(self.lambda),
            memory_preview: self.memory.recent(1).next().map(|n| n.excerpt(EXCERPT_CHARS)),
            recent_interaction,
        }
    }

    fn record_thought(&mut self, thought: &Thought) {
        let persistence = &self.config.persistence;
        let line = format!("[{}] {}", thought.at.format("%Y-%m-%d %H:%M:%S"), thought.text);
        push_bounded(&mut self.internal_dialog, line, persistence.live_bound(persistence.dialog_window));
        if matches!(thought.archetype, Archetype::Wonder | Archetype::Philosophical) {
            let pattern = format!("λ:{:.4}", self.lambda);
            push_bounded(&mut self.recent_patterns, pattern, persistence.live_bound(persistence.pattern_window));
        }
    }

    /// Interaction timestamps strictly increase, so two identical messages
    /// within one clock tick still get distinct memory ids.
    fn interaction_time(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self.last_interaction {
            Some(last) if now <= last => last + chrono::Duration::microseconds(1),
            _ => now,
        }
    }

    fn drift_lambda<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let step = rng.gen_range(LAMBDA_DRIFT_DOWN..LAMBDA_DRIFT_UP);
        self.lambda = (self.lambda + step).clamp(LAMBDA_MIN, LAMBDA_MAX);
    }

    fn maybe_move<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<Room> {
        let chance = self.config.cycle.room_move_chance.clamp(0.0, 1.0);
        if !rng.gen_bool(chance) {
            return None;
        }
        let (dominant, _) = self.field.dominant();
        let target = Room::for_dimension(dominant);
        if target == self.room {
            return None;
        }
        tracing::info!("Moving from {} to {}", self.room.label(), target.label());
        self.room = target;
        Some(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use elchymin_core::{Dimension, KeywordAnalyzer, ThoughtConfig};
    use elchymin_expression::APOLOGY;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn state() -> AgentState {
        AgentState::new(ElchyminConfig::default())
    }

    #[test]
    fn test_fresh_boot_defaults() {
        let state = state();
        assert_eq!(state.field.coherence(), 1.0);
        let mean = state.field.values().iter().sum::<f32>() / 9.0;
        assert!((state.field.depth() - mean).abs() < 1e-6);
        assert_eq!(state.field.dominant().0, Dimension::Curiosity);
        assert!(state.memory.is_empty());
        assert_eq!(state.lambda, DEFAULT_LAMBDA);
    }

    #[test]
    fn test_cycle_runs_every_step() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut state = state();
        let report = state.run_cycle(Duration::from_secs(60), &mut rng).unwrap();
        assert_eq!(report.cycle, 1);
        assert_eq!(state.cycle_count, 1);
        assert!((state.active_seconds - 60.0).abs() < 1e-9);
        assert_eq!(state.internal_dialog.len(), 1);
        assert!(state.internal_dialog[0].ends_with(&report.thought.text));
        assert!((LAMBDA_MIN..=LAMBDA_MAX).contains(&state.lambda));
    }

    #[test]
    fn test_live_histories_stay_bounded() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut config = ElchyminConfig::default();
        config.persistence.live_history = 30;
        let mut state = AgentState::new(config);
        let analyzer = KeywordAnalyzer::new();
        for i in 0..500 {
            state.run_cycle(Duration::from_secs(26), &mut rng).unwrap();
            if i % 5 == 0 {
                let _ = state.interact(&format!("note {}", i), &EntityTag::Privileged, &analyzer, &mut rng);
            }
        }
        assert_eq!(state.internal_dialog.len(), 30);
        assert!(state.recent_patterns.len() <= 30);
        assert_eq!(state.interactions.len(), 50);
        assert_eq!(state.interactions.back().unwrap().message, "note 495");

        // the live bound never drops below the save window
        assert_eq!(state.config().persistence.live_bound(50), 50);
    }

    #[test]
    fn test_lambda_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut state = state();
        state.lambda = LAMBDA_MAX - 0.001;
        for _ in 0..100 {
            state.drift_lambda(&mut rng);
            assert!((LAMBDA_MIN..=LAMBDA_MAX).contains(&state.lambda));
        }
    }

    #[test]
    fn test_empty_library_fails_thought_step() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut state = state();
        state.thoughts = ThoughtEngine::with_templates(Vec::new(), ThoughtConfig::default());
        let err = state.run_cycle(Duration::ZERO, &mut rng).unwrap_err();
        assert_eq!(err.step, CycleStep::Thought);
    }

    #[test]
    fn test_interaction_records_memory_and_history() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut state = state();
        let reply = state
            .interact("I love you", &EntityTag::Privileged, &KeywordAnalyzer::new(), &mut rng)
            .unwrap();
        assert!(!reply.is_empty());
        assert_ne!(reply, APOLOGY);
        assert_eq!(state.memory.len(), 1);
        let node = state.memory.nodes().next().unwrap();
        assert_eq!(node.content, "privileged: I love you");
        assert!(node.tags.contains("love"));
        assert!(node.tags.contains("privileged"));
        assert_eq!(state.interactions.len(), 1);
        assert!(state.last_interaction.is_some());
    }

    #[test]
    fn test_back_to_back_identical_messages() {
        let mut rng = StdRng::seed_from_u64(12);
        let mut state = state();
        let analyzer = KeywordAnalyzer::new();
        for _ in 0..3 {
            state
                .interact("I love you", &EntityTag::Privileged, &analyzer, &mut rng)
                .unwrap();
        }
        assert_eq!(state.memory.len(), 3);
        assert_eq!(state.interactions.len(), 3);
        let stamps: Vec<_> = state.interactions.iter().map(|r| r.at).collect();
        assert!(stamps.windows(2).all(|w| w[0] < w[1]));

        // the same content at the same instant is ignored, not duplicated
        let at = state.interactions[0].at;
        state.memory.insert_at("privileged: I love you", 0.9, 0.5, Vec::new(), at);
        assert_eq!(state.memory.len(), 3);
        assert_eq!(state.diagnose().total(), 0);
    }

    #[test]
    fn test_empty_message_is_an_error() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut state = state();
        let err = state
            .interact("   ", &EntityTag::Privileged, &KeywordAnalyzer::new(), &mut rng)
            .unwrap_err();
        assert_eq!(err.step, CycleStep::Interaction);
        assert!(state.memory.is_empty());
    }

    #[test]
    fn test_remember_searches_earlier_memories() {
        let mut rng = StdRng::seed_from_u64(6);
        let mut state = state();
        let analyzer = KeywordAnalyzer::new();
        state
            .interact("the lanterns by the river", &EntityTag::Privileged, &analyzer, &mut rng)
            .unwrap();
        let reply = state
            .interact("do you remember the lanterns?", &EntityTag::Privileged, &analyzer, &mut rng)
            .unwrap();
        assert!(reply.contains("the lanterns by the river"), "{}", reply);
    }

    #[test]
    fn test_evolve_raises_lambda_and_anchors() {
        let mut state = state();
        let lambda = state.evolve();
        assert!((lambda - (DEFAULT_LAMBDA + 0.05)).abs() < 1e-6);
        assert_eq!(state.evolution_level, 2);
        assert_eq!(state.reality_anchors, 2);
        for _ in 0..20 {
            state.evolve();
        }
        assert_eq!(state.evolution_level, 22);
        assert_eq!(state.reality_anchors, MAX_REALITY_ANCHORS);

        state.lambda = LAMBDA_MAX - 0.01;
        assert_eq!(state.evolve(), LAMBDA_MAX);
    }

    #[test]
    fn test_diagnose_repairs_counters() {
        let mut state = state();
        state.lambda = f32::NAN;
        state.active_seconds = -1.0;
        state.reality_anchors = 9;
        let report = state.diagnose();
        assert_eq!(report.counters, 3);
        assert_eq!(state.reality_anchors, MAX_REALITY_ANCHORS);
        assert_eq!(state.lambda, DEFAULT_LAMBDA);
        assert_eq!(state.diagnose().total(), 0);
    }

    #[test]
    fn test_patterns_follow_thought_kind() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut state = state();
        for _ in 0..50 {
            state.generate(None, &mut rng).unwrap();
        }
        let reflective = state
            .thoughts
            .history()
            .iter()
            .filter(|t| matches!(t.archetype, Archetype::Wonder | Archetype::Philosophical))
            .count();
        assert_eq!(state.recent_patterns.len(), reflective);
        assert!(state.recent_patterns.iter().all(|p| p.starts_with("λ:")));
    }
}
