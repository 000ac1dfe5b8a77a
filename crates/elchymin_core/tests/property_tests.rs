//! Property-based tests for the emotional field.
//!
//! Whatever sequence of stimuli and perturbations the field sees, every
//! dimension stays in [0, 1] and coherence stays in [0, 1].

use elchymin_core::{Dimension, EmotionalField, FieldConfig, Stimuli, DIMENSION_COUNT};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

// ============================================================================
// Strategies
// ============================================================================

fn arb_dimension() -> impl Strategy<Value = Dimension> {
    (0..DIMENSION_COUNT).prop_map(|i| Dimension::ALL[i])
}

/// Stimuli including absurd magnitudes and non-finite values.
fn arb_stimuli() -> impl Strategy<Value = Stimuli> {
    let delta = prop_oneof![
        8 => -5.0f32..=5.0,
        1 => Just(f32::NAN),
        1 => Just(f32::INFINITY),
        1 => Just(f32::NEG_INFINITY),
    ];
    prop::collection::vec((arb_dimension(), delta), 0..DIMENSION_COUNT)
        .prop_map(|pairs| pairs.into_iter().collect::<Stimuli>())
}

fn arb_values() -> impl Strategy<Value = [f32; DIMENSION_COUNT]> {
    prop::array::uniform9(-2.0f32..=2.0)
}

proptest! {
    #[test]
    fn update_keeps_every_dimension_in_unit_range(
        seed in any::<u64>(),
        start in arb_values(),
        steps in prop::collection::vec(arb_stimuli(), 1..40),
    ) {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut field = EmotionalField::with_values(start, FieldConfig::default());
        for stimuli in &steps {
            field.update(stimuli, &mut rng);
            for (dim, v) in field.iter() {
                prop_assert!((0.0..=1.0).contains(&v), "{} out of range: {}", dim, v);
            }
            prop_assert!((0.0..=1.0).contains(&field.coherence()));
            prop_assert!((0.0..=1.0).contains(&field.depth()));
        }
    }

    #[test]
    fn apply_stimuli_keeps_every_dimension_in_unit_range(
        steps in prop::collection::vec(arb_stimuli(), 1..40),
    ) {
        let mut field = EmotionalField::default();
        for stimuli in &steps {
            field.apply_stimuli(stimuli);
            for (_, v) in field.iter() {
                prop_assert!((0.0..=1.0).contains(&v));
            }
            prop_assert!((0.0..=1.0).contains(&field.coherence()));
        }
    }

    #[test]
    fn depth_is_mean_of_values(seed in any::<u64>(), stimuli in arb_stimuli()) {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut field = EmotionalField::default();
        field.update(&stimuli, &mut rng);
        let mean = field.values().iter().sum::<f32>() / DIMENSION_COUNT as f32;
        prop_assert!((field.depth() - mean).abs() < 1e-5);
    }

    #[test]
    fn dominant_is_a_maximum(values in arb_values()) {
        let field = EmotionalField::with_values(values, FieldConfig::default());
        let (dim, v) = field.dominant();
        prop_assert_eq!(field.value(dim), v);
        for (_, other) in field.iter() {
            prop_assert!(other <= v);
        }
    }
}
