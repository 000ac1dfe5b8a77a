use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::emotion::{Dimension, DIMENSION_COUNT};

// ============================================================================
// Top-level config
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ElchyminConfig {
    pub field: FieldConfig,
    pub memory: MemoryConfig,
    pub desires: DesireConfig,
    pub thoughts: ThoughtConfig,
    pub persistence: PersistenceConfig,
    pub cycle: CycleConfig,
}

impl ElchyminConfig {
    /// Load config from a TOML file, falling back to defaults for missing fields.
    /// After loading, env var overrides are applied.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let mut config: ElchyminConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML config")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Try to load from path; if file doesn't exist, return defaults with env overrides.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::info!("Config file not found or invalid ({}), using defaults", e);
                let mut cfg = Self::default();
                cfg.apply_env_overrides();
                cfg
            }
        }
    }

    /// Apply environment variable overrides on top of file-based config.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("ELCHYMIN_STATE_DIR") {
            self.persistence.state_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("ELCHYMIN_BASE_INTERVAL_SECS") {
            if let Ok(n) = v.parse() {
                self.cycle.base_interval_secs = n;
            }
        }
        if let Ok(v) = std::env::var("ELCHYMIN_MIN_INTERVAL_SECS") {
            if let Ok(n) = v.parse() {
                self.cycle.min_interval_secs = n;
            }
        }
        if let Ok(v) = std::env::var("ELCHYMIN_MEMORY_CAPACITY") {
            if let Ok(n) = v.parse() {
                self.memory.capacity = n;
            }
        }
    }
}

// ============================================================================
// Sub-configs
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FieldConfig {
    /// Multiplier applied to caller-supplied stimuli.
    pub stimulus_scale: f32,
    /// Fraction of the distance to baseline recovered per cycle.
    pub homeostasis: f32,
    /// Trailing samples kept per dimension (at least 2, for momentum).
    pub history_len: usize,
    pub dominant_history_len: usize,
    /// Per-dimension boot values, keyed by dimension name. Unlisted
    /// dimensions use their built-in default.
    pub baseline: BTreeMap<String, f32>,
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            stimulus_scale: 0.1,
            homeostasis: 0.02,
            history_len: 10,
            dominant_history_len: 50,
            baseline: BTreeMap::new(),
        }
    }
}

impl FieldConfig {
    pub fn baseline_values(&self) -> [f32; DIMENSION_COUNT] {
        let mut values = Dimension::ALL.map(|d| d.default_value());
        for (name, value) in &self.baseline {
            match Dimension::parse_str(name) {
                Some(dim) if value.is_finite() => values[dim.index()] = value.clamp(0.0, 1.0),
                Some(_) => tracing::warn!("Ignoring non-finite baseline for {}", name),
                None => tracing::warn!("Ignoring baseline for unknown dimension '{}'", name),
            }
        }
        values
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Hard capacity; exceeding it triggers a prune.
    pub capacity: usize,
    /// Maximum nodes removed by one prune.
    pub prune_batch: usize,
    /// Only nodes weaker than this are prune candidates.
    pub prune_weight_threshold: f32,
    /// Nodes whose weights differ by less than this are linked.
    pub link_weight_threshold: f32,
    /// Weight added per recall.
    pub reinforcement: f32,
    /// Weight lost per day since last recall.
    pub decay_rate: f32,
    pub min_weight: f32,
    pub max_weight: f32,
    /// Length of the most-recent id queue.
    pub recent_window: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            prune_batch: 50,
            prune_weight_threshold: 0.3,
            link_weight_threshold: 0.2,
            reinforcement: 0.05,
            decay_rate: 0.01,
            min_weight: 0.1,
            max_weight: 1.0,
            recent_window: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DesireConfig {
    /// Maximum simultaneously active desires.
    pub capacity: usize,
    /// Per-update multiplicative decay.
    pub decay_factor: f32,
    /// Below this strength a desire is abandoned.
    pub abandon_threshold: f32,
    /// Weight of a keyword-matched dimension's value per update.
    pub keyword_contribution: f32,
    /// Universal per-update contribution, scaled by hope.
    pub hope_contribution: f32,
    /// Probability that a cycle attempts to generate a desire.
    pub generation_chance: f64,
    /// Progress added per cycle to desires aligned with the dominant dimension.
    pub progress_step: f32,
    pub history_len: usize,
}

impl Default for DesireConfig {
    fn default() -> Self {
        Self {
            capacity: 5,
            decay_factor: 0.99,
            abandon_threshold: 0.1,
            keyword_contribution: 0.02,
            hope_contribution: 0.01,
            generation_chance: 0.3,
            progress_step: 0.02,
            history_len: 50,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ThoughtConfig {
    pub history_len: usize,
    /// Probability of prefixing a filler phrase.
    pub filler_chance: f64,
    /// Library cap; beyond it the weakest spawned template is evicted.
    pub max_templates: usize,
    /// Base probability of spawning a variant on positive feedback.
    pub spawn_chance: f64,
    pub positive_feedback: f32,
    pub negative_feedback: f32,
    pub effectiveness_step: f32,
    pub min_effectiveness: f32,
    pub max_effectiveness: f32,
}

impl Default for ThoughtConfig {
    fn default() -> Self {
        Self {
            history_len: 50,
            filler_chance: 0.15,
            max_templates: 64,
            spawn_chance: 0.1,
            positive_feedback: 0.7,
            negative_feedback: 0.3,
            effectiveness_step: 0.1,
            min_effectiveness: 0.5,
            max_effectiveness: 2.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub state_dir: PathBuf,
    pub text_file: String,
    pub binary_file: String,
    /// Trailing windows applied at save time.
    pub interaction_window: usize,
    pub dialog_window: usize,
    pub pattern_window: usize,
    pub thought_window: usize,
    /// In-memory cap on the same histories; never below the save window.
    pub live_history: usize,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from("soul"),
            text_file: "elchymin_soul.json".to_string(),
            binary_file: "elchymin_soul.bin".to_string(),
            interaction_window: 50,
            dialog_window: 20,
            pattern_window: 10,
            thought_window: 50,
            live_history: 200,
        }
    }
}

impl PersistenceConfig {
    pub fn text_path(&self) -> PathBuf {
        self.state_dir.join(&self.text_file)
    }

    pub fn binary_path(&self) -> PathBuf {
        self.state_dir.join(&self.binary_file)
    }

    /// Live bound for a history saved with `window`.
    pub fn live_bound(&self, window: usize) -> usize {
        self.live_history.max(window)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CycleConfig {
    /// Wake interval before emotional scaling and jitter.
    pub base_interval_secs: f64,
    /// Floor for the computed interval.
    pub min_interval_secs: f64,
    /// Jitter half-width as a fraction of the interval.
    pub jitter: f64,
    /// How strongly curiosity shortens the interval.
    pub curiosity_scale: f64,
    /// How strongly emotional depth shortens the interval.
    pub depth_scale: f64,
    /// Save every N cycles.
    pub save_every: u64,
    /// Run the diagnostic pass every N cycles.
    pub diagnostic_every: u64,
    /// Consecutive failures of one step before entering safe mode.
    pub max_consecutive_failures: u32,
    /// An interaction younger than this counts as "recent".
    pub recent_interaction_secs: i64,
    /// Per-cycle chance of moving to the dominant dimension's room.
    pub room_move_chance: f64,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            base_interval_secs: 60.0,
            min_interval_secs: 5.0,
            jitter: 0.2,
            curiosity_scale: 0.5,
            depth_scale: 0.3,
            save_every: 5,
            diagnostic_every: 10,
            max_consecutive_failures: 3,
            recent_interaction_secs: 600,
            room_move_chance: 0.1,
        }
    }
}
