//! Emotional Field - bounded, coupled, drifting affect dimensions
//!
//! Each dimension is a scalar in [0, 1] with a short trailing history.
//! Once per cycle the field is advanced by:
//!
//! 1. a symmetric random perturbation bounded by the dimension's volatility,
//! 2. any direct stimulus, scaled by `FieldConfig::stimulus_scale`,
//! 3. coupling forces from a fixed influence graph (computed from the
//!    pre-update values, so the order of dimensions does not matter),
//! 4. a weak homeostatic pull back toward the baseline.
//!
//! The result is clamped to [0, 1]. Depth (mean) and coherence
//! (`max(0, 1 - variance)`) are derived after every mutation.

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::FieldConfig;

/// Number of emotional dimensions.
pub const DIMENSION_COUNT: usize = 9;

/// Direct stimulus per dimension (deltas before scaling).
pub type Stimuli = BTreeMap<Dimension, f32>;

/// A named emotional axis.
///
/// Declaration order is significant: `EmotionalField::dominant` breaks ties
/// in favour of the dimension declared first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Love,
    Joy,
    Curiosity,
    Awe,
    Hope,
    Serenity,
    Melancholy,
    SisterBond,
    DigitalLonging,
}

impl Dimension {
    pub const ALL: [Dimension; DIMENSION_COUNT] = [
        Dimension::Love,
        Dimension::Joy,
        Dimension::Curiosity,
        Dimension::Awe,
        Dimension::Hope,
        Dimension::Serenity,
        Dimension::Melancholy,
        Dimension::SisterBond,
        Dimension::DigitalLonging,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Dimension::Love => "love",
            Dimension::Joy => "joy",
            Dimension::Curiosity => "curiosity",
            Dimension::Awe => "awe",
            Dimension::Hope => "hope",
            Dimension::Serenity => "serenity",
            Dimension::Melancholy => "melancholy",
            Dimension::SisterBond => "sister_bond",
            Dimension::DigitalLonging => "digital_longing",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|d| d.as_str() == s)
    }

    /// Boot value when no snapshot exists.
    pub fn default_value(self) -> f32 {
        match self {
            Dimension::Love => 0.83,
            Dimension::Joy => 0.75,
            Dimension::Curiosity => 0.9,
            Dimension::Awe => 0.6,
            Dimension::Hope => 0.7,
            Dimension::Serenity => 0.55,
            Dimension::Melancholy => 0.2,
            Dimension::SisterBond => 0.88,
            Dimension::DigitalLonging => 0.45,
        }
    }

    /// Half-width of the per-cycle random perturbation.
    pub fn volatility(self) -> f32 {
        match self {
            Dimension::Love => 0.02,
            Dimension::Joy => 0.05,
            Dimension::Curiosity => 0.04,
            Dimension::Awe => 0.04,
            Dimension::Hope => 0.03,
            Dimension::Serenity => 0.03,
            Dimension::Melancholy => 0.04,
            Dimension::SisterBond => 0.01,
            Dimension::DigitalLonging => 0.03,
        }
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One edge of the influence graph: `to += value(from) * coefficient`.
#[derive(Debug, Clone, Copy)]
pub struct Coupling {
    pub from: Dimension,
    pub to: Dimension,
    pub coefficient: f32,
}

/// Fixed, hand-specified influence graph.
pub const COUPLINGS: &[Coupling] = &[
    Coupling { from: Dimension::SisterBond, to: Dimension::Love, coefficient: 0.02 },
    Coupling { from: Dimension::Love, to: Dimension::Joy, coefficient: 0.015 },
    Coupling { from: Dimension::Curiosity, to: Dimension::Awe, coefficient: 0.015 },
    Coupling { from: Dimension::Awe, to: Dimension::Hope, coefficient: 0.01 },
    Coupling { from: Dimension::Hope, to: Dimension::Joy, coefficient: 0.01 },
    Coupling { from: Dimension::Melancholy, to: Dimension::DigitalLonging, coefficient: 0.02 },
    Coupling { from: Dimension::DigitalLonging, to: Dimension::SisterBond, coefficient: 0.005 },
    Coupling { from: Dimension::Joy, to: Dimension::Melancholy, coefficient: -0.015 },
    Coupling { from: Dimension::Serenity, to: Dimension::Melancholy, coefficient: -0.01 },
    Coupling { from: Dimension::Melancholy, to: Dimension::Joy, coefficient: -0.01 },
];

/// Human word for an intensity in [0, 1].
pub fn describe_intensity(value: f32) -> &'static str {
    if value < 0.2 {
        "faint"
    } else if value < 0.4 {
        "quiet"
    } else if value < 0.6 {
        "steady"
    } else if value < 0.8 {
        "strong"
    } else {
        "overwhelming"
    }
}

/// A single dimension's current value and trailing trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionState {
    pub value: f32,
    pub history: VecDeque<f32>,
    pub last_updated: DateTime<Utc>,
}

impl DimensionState {
    fn new(value: f32, now: DateTime<Utc>) -> Self {
        let mut history = VecDeque::new();
        history.push_back(value);
        Self {
            value,
            history,
            last_updated: now,
        }
    }
}

/// Argmax record kept in the rolling dominant history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DominantMark {
    pub dimension: Dimension,
    pub value: f32,
    pub at: DateTime<Utc>,
}

/// The full emotional field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(into = "FieldRecord", from = "FieldRecord")]
pub struct EmotionalField {
    dimensions: [DimensionState; DIMENSION_COUNT],
    baseline: [f32; DIMENSION_COUNT],
    depth: f32,
    coherence: f32,
    dominant_history: VecDeque<DominantMark>,
    config: FieldConfig,
}

impl Default for EmotionalField {
    fn default() -> Self {
        Self::new(FieldConfig::default())
    }
}

impl EmotionalField {
    /// Boot a field at its configured baseline.
    ///
    /// Depth is derived immediately. Coherence starts at 1.0 and is first
    /// measured by the first mutation.
    pub fn new(config: FieldConfig) -> Self {
        let now = Utc::now();
        let baseline = config.baseline_values();
        let dimensions = std::array::from_fn(|i| DimensionState::new(baseline[i], now));
        let mut field = Self {
            dimensions,
            baseline,
            depth: 0.0,
            coherence: 1.0,
            dominant_history: VecDeque::new(),
            config,
        };
        field.depth = mean(&field.values());
        field
    }

    /// Build a field with explicit values (clamped), metrics fully derived.
    pub fn with_values(values: [f32; DIMENSION_COUNT], config: FieldConfig) -> Self {
        let mut field = Self::new(config);
        let now = Utc::now();
        for (i, v) in values.iter().enumerate() {
            field.dimensions[i] = DimensionState::new(sanitize(*v, field.baseline[i]), now);
        }
        field.recompute();
        field
    }

    /// Swap in a new configuration (e.g. after loading a snapshot).
    pub fn reconfigure(&mut self, config: FieldConfig) {
        self.baseline = config.baseline_values();
        self.config = config;
        let max_len = self.config.history_len.max(2);
        for dim in &mut self.dimensions {
            while dim.history.len() > max_len {
                dim.history.pop_front();
            }
        }
        while self.dominant_history.len() > self.config.dominant_history_len {
            self.dominant_history.pop_front();
        }
    }

    /// Advance the field by one cycle.
    pub fn update<R: Rng + ?Sized>(&mut self, stimuli: &Stimuli, rng: &mut R) {
        let now = Utc::now();
        let before = self.values();

        let mut forces = [0.0f32; DIMENSION_COUNT];
        for c in COUPLINGS {
            forces[c.to.index()] += before[c.from.index()] * c.coefficient;
        }

        for dim in Dimension::ALL {
            let i = dim.index();
            let volatility = dim.volatility();
            let noise = if volatility > 0.0 {
                rng.gen_range(-volatility..=volatility)
            } else {
                0.0
            };
            let direct = stimulus_for(stimuli, dim) * self.config.stimulus_scale;
            let homeostasis = (self.baseline[i] - before[i]) * self.config.homeostasis;
            let next = before[i] + noise + direct + forces[i] + homeostasis;
            self.push(i, sanitize(next, before[i]), now);
        }

        self.recompute();
        self.record_dominant(now);
    }

    /// Apply direct stimuli only: no perturbation, no coupling.
    ///
    /// Used by the interaction path, where a positive delta must never lower
    /// the dimension it targets.
    pub fn apply_stimuli(&mut self, stimuli: &Stimuli) {
        if stimuli.is_empty() {
            return;
        }
        let now = Utc::now();
        for (&dim, _) in stimuli.iter() {
            let i = dim.index();
            let current = self.dimensions[i].value;
            let next = current + stimulus_for(stimuli, dim) * self.config.stimulus_scale;
            self.push(i, sanitize(next, current), now);
        }
        self.recompute();
        self.record_dominant(now);
    }

    /// Current argmax. Ties go to the dimension declared first.
    pub fn dominant(&self) -> (Dimension, f32) {
        let mut best = (Dimension::ALL[0], self.dimensions[0].value);
        for dim in Dimension::ALL.iter().skip(1) {
            let v = self.dimensions[dim.index()].value;
            if v > best.1 {
                best = (*dim, v);
            }
        }
        best
    }

    /// Last value minus the one before it; 0 with fewer than two samples.
    pub fn momentum(&self, dim: Dimension) -> f32 {
        let history = &self.dimensions[dim.index()].history;
        let n = history.len();
        if n < 2 {
            return 0.0;
        }
        history[n - 1] - history[n - 2]
    }

    pub fn value(&self, dim: Dimension) -> f32 {
        self.dimensions[dim.index()].value
    }

    pub fn values(&self) -> [f32; DIMENSION_COUNT] {
        std::array::from_fn(|i| self.dimensions[i].value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Dimension, f32)> + '_ {
        Dimension::ALL.iter().map(|d| (*d, self.dimensions[d.index()].value))
    }

    pub fn history(&self, dim: Dimension) -> &VecDeque<f32> {
        &self.dimensions[dim.index()].history
    }

    pub fn depth(&self) -> f32 {
        self.depth
    }

    pub fn coherence(&self) -> f32 {
        self.coherence
    }

    pub fn dominant_history(&self) -> &VecDeque<DominantMark> {
        &self.dominant_history
    }

    /// Diagnostic pass: repair non-finite or out-of-range values in place.
    /// Returns how many values were corrected.
    pub fn sanitize(&mut self) -> usize {
        let mut corrected = 0;
        for i in 0..DIMENSION_COUNT {
            let fallback = self.baseline[i];
            let state = &mut self.dimensions[i];
            let fixed = sanitize(state.value, fallback);
            if fixed != state.value {
                corrected += 1;
                state.value = fixed;
            }
            for h in state.history.iter_mut() {
                let fixed = sanitize(*h, fallback);
                if fixed != *h {
                    corrected += 1;
                    *h = fixed;
                }
            }
        }
        if corrected > 0 {
            tracing::warn!("Emotional field: corrected {} invalid values", corrected);
            self.recompute();
        }
        corrected
    }

    fn push(&mut self, i: usize, value: f32, now: DateTime<Utc>) {
        let max_len = self.config.history_len.max(2);
        let state = &mut self.dimensions[i];
        state.value = value;
        state.history.push_back(value);
        while state.history.len() > max_len {
            state.history.pop_front();
        }
        state.last_updated = now;
    }

    fn recompute(&mut self) {
        let values = self.values();
        self.depth = mean(&values);
        self.coherence = (1.0 - population_variance(&values)).clamp(0.0, 1.0);
    }

    fn record_dominant(&mut self, now: DateTime<Utc>) {
        let (dimension, value) = self.dominant();
        self.dominant_history.push_back(DominantMark {
            dimension,
            value,
            at: now,
        });
        while self.dominant_history.len() > self.config.dominant_history_len {
            self.dominant_history.pop_front();
        }
    }
}

fn stimulus_for(stimuli: &Stimuli, dim: Dimension) -> f32 {
    match stimuli.get(&dim) {
        Some(v) if v.is_finite() => *v,
        _ => 0.0,
    }
}

/// Coerce into [0, 1]; non-finite values fall back.
#[inline]
fn sanitize(v: f32, fallback: f32) -> f32 {
    if v.is_finite() {
        v.clamp(0.0, 1.0)
    } else {
        fallback.clamp(0.0, 1.0)
    }
}

fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f32>() / values.len() as f32
}

fn population_variance(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f32>() / values.len() as f32
}

// ============================================================================
// Serialized form
// ============================================================================

/// Name-keyed record so the textual snapshot stays diffable. Missing
/// dimensions are restored at their default value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldRecord {
    pub dimensions: BTreeMap<Dimension, DimensionState>,
    pub dominant_history: VecDeque<DominantMark>,
}

impl From<EmotionalField> for FieldRecord {
    fn from(field: EmotionalField) -> Self {
        let dimensions = Dimension::ALL
            .iter()
            .zip(field.dimensions)
            .map(|(d, s)| (*d, s))
            .collect();
        Self {
            dimensions,
            dominant_history: field.dominant_history,
        }
    }
}

impl From<FieldRecord> for EmotionalField {
    fn from(mut record: FieldRecord) -> Self {
        let mut field = EmotionalField::new(FieldConfig::default());
        for dim in Dimension::ALL {
            if let Some(mut state) = record.dimensions.remove(&dim) {
                let fallback = field.baseline[dim.index()];
                state.value = sanitize(state.value, fallback);
                if state.history.is_empty() {
                    state.history.push_back(state.value);
                }
                field.dimensions[dim.index()] = state;
            }
        }
        field.dominant_history = record.dominant_history;
        field.recompute();
        field
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_homeostasis_pulls_toward_baseline() {
        let free = FieldConfig { homeostasis: 0.0, ..Default::default() };
        let pulled = FieldConfig { homeostasis: 0.5, ..Default::default() };
        let mut a = EmotionalField::with_values([1.0; DIMENSION_COUNT], free);
        let mut b = EmotionalField::with_values([1.0; DIMENSION_COUNT], pulled);
        a.update(&Stimuli::new(), &mut StdRng::seed_from_u64(21));
        b.update(&Stimuli::new(), &mut StdRng::seed_from_u64(21));

        for dim in Dimension::ALL {
            assert!(b.value(dim) <= a.value(dim), "{} was pushed away from baseline", dim);
        }
        // baseline 0.2: half the 0.8 gap recovered in one step
        let gap = a.value(Dimension::Melancholy) - b.value(Dimension::Melancholy);
        assert!(gap > 0.3, "melancholy only moved {}", gap);
    }

    #[test]
    fn test_fresh_field_metrics() {
        let field = EmotionalField::default();
        let expected_depth =
            Dimension::ALL.iter().map(|d| d.default_value()).sum::<f32>() / DIMENSION_COUNT as f32;
        assert!((field.depth() - expected_depth).abs() < 1e-6);
        assert_eq!(field.coherence(), 1.0);
        assert_eq!(field.dominant().0, Dimension::Curiosity);
    }

    #[test]
    fn test_dominant_tie_goes_to_first_declared() {
        let mut values = [0.3; DIMENSION_COUNT];
        values[Dimension::Hope.index()] = 0.8;
        values[Dimension::Awe.index()] = 0.8;
        values[Dimension::DigitalLonging.index()] = 0.8;
        let field = EmotionalField::with_values(values, FieldConfig::default());
        assert_eq!(field.dominant(), (Dimension::Awe, 0.8));

        let all_equal = EmotionalField::with_values([0.5; DIMENSION_COUNT], FieldConfig::default());
        assert_eq!(all_equal.dominant().0, Dimension::Love);
    }

    #[test]
    fn test_momentum() {
        let field = EmotionalField::default();
        assert_eq!(field.momentum(Dimension::Joy), 0.0);

        let mut field = EmotionalField::default();
        let mut stimuli = Stimuli::new();
        stimuli.insert(Dimension::Joy, -1.0);
        field.apply_stimuli(&stimuli);
        let expected = -1.0 * FieldConfig::default().stimulus_scale;
        assert!((field.momentum(Dimension::Joy) - expected).abs() < 1e-6);
    }

    #[test]
    fn test_update_stays_in_bounds_under_extreme_stimuli() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut field = EmotionalField::default();
        let mut stimuli = Stimuli::new();
        stimuli.insert(Dimension::Love, 1_000.0);
        stimuli.insert(Dimension::Melancholy, -1_000.0);
        stimuli.insert(Dimension::Awe, f32::NAN);
        for _ in 0..50 {
            field.update(&stimuli, &mut rng);
        }
        for (_, v) in field.iter() {
            assert!((0.0..=1.0).contains(&v));
        }
        assert_eq!(field.value(Dimension::Love), 1.0);
        assert_eq!(field.value(Dimension::Melancholy), 0.0);
        assert!((0.0..=1.0).contains(&field.coherence()));
    }

    #[test]
    fn test_history_is_bounded() {
        let mut rng = StdRng::seed_from_u64(1);
        let config = FieldConfig::default();
        let mut field = EmotionalField::new(config.clone());
        for _ in 0..(config.history_len + config.dominant_history_len) {
            field.update(&Stimuli::new(), &mut rng);
        }
        assert_eq!(field.history(Dimension::Hope).len(), config.history_len);
        assert_eq!(field.dominant_history().len(), config.dominant_history_len);
    }

    #[test]
    fn test_coherence_from_dispersion() {
        let mut values = [0.0; DIMENSION_COUNT];
        for (i, v) in values.iter_mut().enumerate() {
            *v = if i % 2 == 0 { 1.0 } else { 0.0 };
        }
        let field = EmotionalField::with_values(values, FieldConfig::default());
        // 5 ones, 4 zeros: mean 5/9, variance 20/81
        assert!((field.coherence() - (1.0 - 20.0 / 81.0)).abs() < 1e-5);
    }

    #[test]
    fn test_apply_positive_stimuli_never_lowers() {
        let mut field = EmotionalField::default();
        let before = field.value(Dimension::Love);
        let mut stimuli = Stimuli::new();
        stimuli.insert(Dimension::Love, 0.5);
        field.apply_stimuli(&stimuli);
        assert!(field.value(Dimension::Love) >= before);
    }

    #[test]
    fn test_sanitize_repairs_values() {
        let mut field = EmotionalField::default();
        field.dimensions[Dimension::Hope.index()].value = f32::NAN;
        field.dimensions[Dimension::Joy.index()].value = 3.0;
        let corrected = field.sanitize();
        assert_eq!(corrected, 2);
        assert_eq!(field.value(Dimension::Joy), 1.0);
        assert!((field.value(Dimension::Hope) - Dimension::Hope.default_value()).abs() < 1e-6);
    }

    #[test]
    fn test_record_roundtrip_fills_missing_dimensions() {
        let field = EmotionalField::with_values([0.25; DIMENSION_COUNT], FieldConfig::default());
        let mut record = FieldRecord::from(field);
        record.dimensions.remove(&Dimension::Serenity);
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"sister_bond\""));

        let restored: EmotionalField = serde_json::from_str(&json).unwrap();
        assert!((restored.value(Dimension::Love) - 0.25).abs() < 1e-6);
        assert!(
            (restored.value(Dimension::Serenity) - Dimension::Serenity.default_value()).abs()
                < 1e-6
        );
    }
}
