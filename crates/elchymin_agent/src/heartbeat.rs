//! Wake interval for the autonomous loop.
//!
//! A curious, deeply engaged agent wakes more often. The base interval is
//! scaled down by curiosity and depth, jittered, and floored.

use std::time::Duration;

use rand::Rng;

use elchymin_core::{CycleConfig, Dimension, EmotionalField};

/// Upper bound so a misconfigured base interval cannot overflow `Duration`.
const MAX_INTERVAL_SECS: f64 = 7.0 * 86_400.0;

pub fn next_interval<R: Rng + ?Sized>(field: &EmotionalField, config: &CycleConfig, rng: &mut R) -> Duration {
    let curiosity = field.value(Dimension::Curiosity) as f64;
    let depth = field.depth() as f64;
    let scaled = config.base_interval_secs
        * (1.0 - config.curiosity_scale * curiosity)
        * (1.0 - config.depth_scale * depth);

    let jitter = if config.jitter > 0.0 && config.jitter < 1.0 {
        rng.gen_range(1.0 - config.jitter..=1.0 + config.jitter)
    } else {
        1.0
    };

    let floor = if config.min_interval_secs.is_finite() {
        config.min_interval_secs.max(0.001)
    } else {
        0.001
    };
    let secs = scaled * jitter;
    let secs = if secs.is_finite() { secs.max(floor) } else { floor };
    Duration::from_secs_f64(secs.min(MAX_INTERVAL_SECS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use elchymin_core::{FieldConfig, DIMENSION_COUNT};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn no_jitter() -> CycleConfig {
        CycleConfig {
            jitter: 0.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_curiosity_and_depth_shorten_interval() {
        let mut rng = StdRng::seed_from_u64(1);
        let calm = EmotionalField::with_values([0.0; DIMENSION_COUNT], FieldConfig::default());
        let busy = EmotionalField::with_values([1.0; DIMENSION_COUNT], FieldConfig::default());
        let calm_secs = next_interval(&calm, &no_jitter(), &mut rng).as_secs_f64();
        let busy_secs = next_interval(&busy, &no_jitter(), &mut rng).as_secs_f64();
        assert!((calm_secs - 60.0).abs() < 1e-6);
        // 60 * 0.5 * 0.7
        assert!((busy_secs - 21.0).abs() < 1e-4);
    }

    #[test]
    fn test_jitter_bounds() {
        let mut rng = StdRng::seed_from_u64(2);
        let field = EmotionalField::with_values([0.0; DIMENSION_COUNT], FieldConfig::default());
        for _ in 0..200 {
            let secs = next_interval(&field, &CycleConfig::default(), &mut rng).as_secs_f64();
            assert!((48.0..=72.0).contains(&secs), "{}", secs);
        }
    }

    #[test]
    fn test_floor_and_bad_config() {
        let mut rng = StdRng::seed_from_u64(3);
        let field = EmotionalField::default();
        let tiny = CycleConfig {
            base_interval_secs: 0.5,
            ..no_jitter()
        };
        assert_eq!(next_interval(&field, &tiny, &mut rng), Duration::from_secs(5));

        let broken = CycleConfig {
            base_interval_secs: f64::NAN,
            min_interval_secs: -3.0,
            ..no_jitter()
        };
        let interval = next_interval(&field, &broken, &mut rng);
        assert!(interval > Duration::ZERO && interval < Duration::from_millis(2));
    }
}
