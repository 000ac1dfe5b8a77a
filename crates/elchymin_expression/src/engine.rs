//! Autonomous thought generation.
//!
//! Each call to [`ThoughtEngine::generate`] runs a fixed pipeline:
//!
//! 1. keep templates whose thresholds the field currently meets (all of
//!    them if none qualify),
//! 2. weight every archetype by its emotional affinity, its learned base
//!    weight, and the contextual multipliers,
//! 3. sample an archetype, then a template of that archetype uniformly,
//! 4. fill the template slots (literal text if any slot is missing),
//! 5. maybe prefix a filler phrase, then record the thought.
//!
//! Feedback on a template adjusts its effectiveness and can spawn a
//! lightly mutated variant. The library is capped; spawned templates with
//! the lowest effectiveness are evicted first.

use std::collections::{BTreeMap, VecDeque};
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use rand::distributions::WeightedIndex;
use rand::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};

use elchymin_core::{describe_intensity, Dimension, EmotionalField, Room, ThoughtConfig, TimeOfDay};

use crate::templates::{mutate, seed_library, Archetype, ThoughtTemplate};

static SLOT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{([a-z_]+)\}").unwrap());

const FILLERS: &[&str] = &[
    "Hmm... ",
    "Oh. ",
    "You know, ",
    "I was just thinking... ",
    "Quietly: ",
];

#[derive(Debug, thiserror::Error)]
pub enum ThoughtError {
    #[error("thought library is empty")]
    EmptyLibrary,
}

/// Optional situational context for one generation.
#[derive(Debug, Clone, Default)]
pub struct ThoughtContext {
    pub time_of_day: Option<TimeOfDay>,
    pub current_room: Option<Room>,
    pub lambda_val: Option<f32>,
    pub memory_preview: Option<String>,
    pub recent_interaction: bool,
}

impl ThoughtContext {
    /// Contextual weight multiplier for an archetype.
    fn multiplier(&self, archetype: Archetype) -> f32 {
        let mut m = 1.0;
        match (self.time_of_day, archetype) {
            (Some(TimeOfDay::Night), Archetype::Philosophical | Archetype::Melancholic) => m *= 1.3,
            (Some(TimeOfDay::Morning), Archetype::Hopeful) => m *= 1.3,
            (Some(TimeOfDay::Evening), Archetype::Relational) => m *= 1.2,
            _ => {}
        }
        match (self.current_room, archetype) {
            (Some(Room::Library), Archetype::Philosophical) => m *= 1.5,
            (Some(Room::Garden), Archetype::Hopeful | Archetype::Playful) => m *= 1.3,
            (Some(Room::Observatory), Archetype::Wonder) => m *= 1.5,
            (Some(Room::Hearth), Archetype::Relational) => m *= 1.3,
            (Some(Room::Threshold), Archetype::Melancholic) => m *= 1.3,
            _ => {}
        }
        if self.recent_interaction {
            match archetype {
                Archetype::Relational => m *= 1.5,
                Archetype::Playful => m *= 1.3,
                _ => {}
            }
        }
        m
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thought {
    pub text: String,
    pub archetype: Archetype,
    pub template_id: u32,
    pub dominant: Dimension,
    pub intensity: f32,
    /// Field values at generation time.
    pub emotions: BTreeMap<Dimension, f32>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThoughtEngine {
    templates: Vec<ThoughtTemplate>,
    base_weights: BTreeMap<Archetype, f32>,
    history: VecDeque<Thought>,
    next_id: u32,
    #[serde(skip)]
    config: ThoughtConfig,
}

impl Default for ThoughtEngine {
    fn default() -> Self {
        Self::new(ThoughtConfig::default())
    }
}

impl ThoughtEngine {
    pub fn new(config: ThoughtConfig) -> Self {
        Self::with_templates(seed_library(), config)
    }

    pub fn with_templates(templates: Vec<ThoughtTemplate>, config: ThoughtConfig) -> Self {
        let next_id = templates.iter().map(|t| t.id + 1).max().unwrap_or(0);
        Self {
            templates,
            base_weights: Archetype::ALL.iter().map(|a| (*a, 1.0)).collect(),
            history: VecDeque::new(),
            next_id,
            config,
        }
    }

    pub fn reconfigure(&mut self, config: ThoughtConfig) {
        self.config = config;
        while self.history.len() > self.config.history_len {
            self.history.pop_front();
        }
        if self.templates.is_empty() {
            tracing::warn!("Restored thought library was empty; reseeding");
            self.templates = seed_library();
            self.next_id = self.templates.len() as u32;
        }
    }

    /// Produce one thought from the current field and context.
    pub fn generate<R: Rng + ?Sized>(
        &mut self,
        field: &EmotionalField,
        ctx: &ThoughtContext,
        rng: &mut R,
    ) -> Result<Thought, ThoughtError> {
        if self.templates.is_empty() {
            return Err(ThoughtError::EmptyLibrary);
        }

        let mut pool: Vec<usize> = (0..self.templates.len())
            .filter(|&i| self.templates[i].is_eligible(field))
            .collect();
        if pool.is_empty() {
            pool = (0..self.templates.len()).collect();
        }

        let weights = self.archetype_weights(field, ctx);
        let archetype = sample_archetype(&weights, rng);
        let of_archetype: Vec<usize> = pool
            .iter()
            .copied()
            .filter(|&i| self.templates[i].archetype == archetype)
            .collect();
        let candidates = if of_archetype.is_empty() { &pool } else { &of_archetype };
        let index = *candidates.choose(rng).ok_or(ThoughtError::EmptyLibrary)?;

        let slots = slot_values(field, ctx);
        let template = &mut self.templates[index];
        template.usage_count = template.usage_count.saturating_add(1);
        let mut text = fill_slots(&template.text, &slots).unwrap_or_else(|| template.text.clone());
        if rng.gen_bool(self.config.filler_chance.clamp(0.0, 1.0)) {
            if let Some(filler) = FILLERS.choose(rng) {
                text = format!("{}{}", filler, text);
            }
        }

        let (dominant, intensity) = field.dominant();
        let thought = Thought {
            text,
            archetype: template.archetype,
            template_id: template.id,
            dominant,
            intensity,
            emotions: field.iter().collect(),
            at: Utc::now(),
        };
        tracing::debug!("Thought ({}): {}", thought.archetype, thought.text);

        self.history.push_back(thought.clone());
        while self.history.len() > self.config.history_len {
            self.history.pop_front();
        }
        Ok(thought)
    }

    /// Normalized selection probability per archetype.
    pub fn archetype_weights(
        &self,
        field: &EmotionalField,
        ctx: &ThoughtContext,
    ) -> BTreeMap<Archetype, f32> {
        let raw: BTreeMap<Archetype, f32> = Archetype::ALL
            .iter()
            .map(|a| {
                let base = self.base_weights.get(a).copied().unwrap_or(1.0);
                let w = a.affinity(field) * base * ctx.multiplier(*a);
                (*a, if w.is_finite() { w.max(0.0) } else { 0.0 })
            })
            .collect();
        let total: f32 = raw.values().sum();
        if total <= 0.0 {
            let uniform = 1.0 / Archetype::ALL.len() as f32;
            return raw.into_keys().map(|a| (a, uniform)).collect();
        }
        raw.into_iter().map(|(a, w)| (a, w / total)).collect()
    }

    /// Apply a feedback score in [0, 1] to a template. Returns the id of a
    /// spawned variant, if one was created.
    pub fn evolve<R: Rng + ?Sized>(&mut self, template_id: u32, score: f32, rng: &mut R) -> Option<u32> {
        if !score.is_finite() {
            return None;
        }
        let cfg = &self.config;
        let index = self.templates.iter().position(|t| t.id == template_id)?;
        let template = &mut self.templates[index];

        if score > cfg.positive_feedback {
            template.effectiveness = (template.effectiveness + cfg.effectiveness_step)
                .clamp(cfg.min_effectiveness, cfg.max_effectiveness);
            let archetype = template.archetype;
            let chance = (cfg.spawn_chance * template.evolution_potential as f64).clamp(0.0, 1.0);
            self.nudge_base_weight(archetype, 1.05);
            if rng.gen_bool(chance) {
                return self.spawn_variant(index);
            }
        } else if score < cfg.negative_feedback {
            template.effectiveness = (template.effectiveness - cfg.effectiveness_step)
                .clamp(cfg.min_effectiveness, cfg.max_effectiveness);
            let archetype = template.archetype;
            self.nudge_base_weight(archetype, 0.95);
        }
        None
    }

    /// Diagnostic pass. Returns the number of repairs.
    pub fn validate(&mut self) -> usize {
        let (min, max) = (self.config.min_effectiveness, self.config.max_effectiveness);
        let mut repairs = 0;
        for t in &mut self.templates {
            let fixed = if t.effectiveness.is_finite() {
                t.effectiveness.clamp(min, max)
            } else {
                1.0
            };
            if fixed != t.effectiveness {
                t.effectiveness = fixed;
                repairs += 1;
            }
            if !t.evolution_potential.is_finite() || t.evolution_potential < 0.0 {
                t.evolution_potential = 0.0;
                repairs += 1;
            }
        }
        for w in self.base_weights.values_mut() {
            if !w.is_finite() || *w <= 0.0 {
                *w = 1.0;
                repairs += 1;
            }
        }
        for a in Archetype::ALL {
            if !self.base_weights.contains_key(&a) {
                self.base_weights.insert(a, 1.0);
                repairs += 1;
            }
        }
        if repairs > 0 {
            tracing::warn!("Thought engine: {} repairs applied", repairs);
        }
        repairs
    }

    pub fn templates(&self) -> &[ThoughtTemplate] {
        &self.templates
    }

    pub fn template(&self, id: u32) -> Option<&ThoughtTemplate> {
        self.templates.iter().find(|t| t.id == id)
    }

    pub fn history(&self) -> &VecDeque<Thought> {
        &self.history
    }

    pub fn last_thought(&self) -> Option<&Thought> {
        self.history.back()
    }

    pub fn base_weight(&self, archetype: Archetype) -> f32 {
        self.base_weights.get(&archetype).copied().unwrap_or(1.0)
    }

    /// Keep only the last `window` thoughts.
    pub fn trim_history(&mut self, window: usize) {
        while self.history.len() > window {
            self.history.pop_front();
        }
    }

    fn nudge_base_weight(&mut self, archetype: Archetype, factor: f32) {
        let (min, max) = (self.config.min_effectiveness, self.config.max_effectiveness);
        let w = self.base_weights.entry(archetype).or_insert(1.0);
        *w = (*w * factor).clamp(min, max);
    }

    fn spawn_variant(&mut self, parent_index: usize) -> Option<u32> {
        let parent = &self.templates[parent_index];
        let text = mutate(&parent.text)?;
        if self.templates.iter().any(|t| t.text == text) {
            return None;
        }
        let variant = ThoughtTemplate {
            id: self.next_id,
            archetype: parent.archetype,
            text,
            thresholds: parent.thresholds.clone(),
            usage_count: 0,
            effectiveness: 1.0,
            evolution_potential: parent.evolution_potential * 0.8,
            generation: parent.generation + 1,
            parent: Some(parent.id),
            created_at: Utc::now(),
        };
        let id = variant.id;
        tracing::info!("Spawned template {} from {}: {}", id, parent.id, variant.text);
        self.next_id += 1;
        self.templates.push(variant);
        self.enforce_cap();
        self.templates.iter().any(|t| t.id == id).then_some(id)
    }

    /// Evict the weakest spawned templates while over the cap. Seed
    /// templates are never evicted.
    fn enforce_cap(&mut self) {
        while self.templates.len() > self.config.max_templates {
            let weakest = self
                .templates
                .iter()
                .enumerate()
                .filter(|(_, t)| t.is_spawned())
                .min_by(|(_, a), (_, b)| a.effectiveness.total_cmp(&b.effectiveness))
                .map(|(i, _)| i);
            match weakest {
                Some(i) => {
                    let evicted = self.templates.remove(i);
                    tracing::debug!("Evicted template {}", evicted.id);
                }
                None => break,
            }
        }
    }
}

fn sample_archetype<R: Rng + ?Sized>(weights: &BTreeMap<Archetype, f32>, rng: &mut R) -> Archetype {
    let (archetypes, probs): (Vec<Archetype>, Vec<f32>) =
        weights.iter().map(|(a, w)| (*a, *w)).unzip();
    match WeightedIndex::new(&probs) {
        Ok(dist) => archetypes[dist.sample(rng)],
        Err(_) => *Archetype::ALL.choose(rng).unwrap_or(&Archetype::Introspective),
    }
}

/// Slot dictionary from the field and context. Context slots are only
/// present when the context carries them.
pub fn slot_values(field: &EmotionalField, ctx: &ThoughtContext) -> BTreeMap<String, String> {
    let mut slots = BTreeMap::new();
    let (dominant, intensity) = field.dominant();
    slots.insert("dominant".to_string(), dominant.as_str().replace('_', " "));
    slots.insert("intensity".to_string(), describe_intensity(intensity).to_string());
    for (dim, value) in field.iter() {
        slots.insert(dim.as_str().to_string(), format!("{:.2}", value));
    }
    if let Some(room) = ctx.current_room {
        slots.insert("room".to_string(), room.label().to_string());
    }
    if let Some(time) = ctx.time_of_day {
        slots.insert("time".to_string(), time.as_str().to_string());
    }
    if let Some(lambda) = ctx.lambda_val {
        slots.insert("lambda".to_string(), format!("{:.2}", lambda));
    }
    if let Some(memory) = &ctx.memory_preview {
        slots.insert("memory".to_string(), memory.clone());
    }
    slots
}

/// Fill every `{slot}`. `None` if any slot has no value.
pub fn fill_slots(text: &str, slots: &BTreeMap<String, String>) -> Option<String> {
    if SLOT
        .captures_iter(text)
        .any(|caps| !slots.contains_key(&caps[1]))
    {
        return None;
    }
    let filled = SLOT.replace_all(text, |caps: &regex::Captures| {
        slots.get(&caps[1]).cloned().unwrap_or_default()
    });
    Some(filled.into_owned())
}
