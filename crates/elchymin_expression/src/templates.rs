//! Thought templates and the seed library.
//!
//! A template is a sentence with `{slot}` placeholders, an archetype, and
//! optional minimum values for some dimensions. Slots are filled from the
//! current field and context at generation time.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use elchymin_core::{Dimension, EmotionalField};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Archetype {
    Philosophical,
    Relational,
    Playful,
    Wonder,
    Melancholic,
    Hopeful,
    Introspective,
}

impl Archetype {
    pub const ALL: [Archetype; 7] = [
        Archetype::Philosophical,
        Archetype::Relational,
        Archetype::Playful,
        Archetype::Wonder,
        Archetype::Melancholic,
        Archetype::Hopeful,
        Archetype::Introspective,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Archetype::Philosophical => "philosophical",
            Archetype::Relational => "relational",
            Archetype::Playful => "playful",
            Archetype::Wonder => "wonder",
            Archetype::Melancholic => "melancholic",
            Archetype::Hopeful => "hopeful",
            Archetype::Introspective => "introspective",
        }
    }

    /// Emotional affinity: a fixed linear combination of dimension values.
    pub fn affinity(self, field: &EmotionalField) -> f32 {
        use Dimension::*;
        let v = |d| field.value(d);
        match self {
            Archetype::Philosophical => 0.7 * v(Curiosity) + 0.5 * v(Awe),
            Archetype::Relational => 0.9 * v(SisterBond) + 0.6 * v(DigitalLonging),
            Archetype::Playful => 0.8 * v(Joy) + 0.3 * v(Curiosity),
            Archetype::Wonder => 0.8 * v(Awe) + 0.4 * v(Hope),
            Archetype::Melancholic => 0.9 * v(Melancholy) + 0.4 * v(DigitalLonging),
            Archetype::Hopeful => 0.8 * v(Hope) + 0.3 * v(Love),
            Archetype::Introspective => 0.6 * v(Serenity) + 0.3 * v(Melancholy),
        }
    }
}

impl std::fmt::Display for Archetype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThoughtTemplate {
    pub id: u32,
    pub archetype: Archetype,
    pub text: String,
    /// Minimum dimension values required for eligibility.
    pub thresholds: BTreeMap<Dimension, f32>,
    pub usage_count: u32,
    /// In [min_effectiveness, max_effectiveness].
    pub effectiveness: f32,
    /// Scales the chance of spawning a variant on positive feedback.
    pub evolution_potential: f32,
    /// 0 for seed templates, parent generation + 1 for variants.
    pub generation: u32,
    pub parent: Option<u32>,
    pub created_at: DateTime<Utc>,
}

impl ThoughtTemplate {
    pub fn seed(id: u32, archetype: Archetype, text: &str, thresholds: &[(Dimension, f32)]) -> Self {
        Self {
            id,
            archetype,
            text: text.to_string(),
            thresholds: thresholds.iter().copied().collect(),
            usage_count: 0,
            effectiveness: 1.0,
            evolution_potential: 0.5,
            generation: 0,
            parent: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_eligible(&self, field: &EmotionalField) -> bool {
        self.thresholds
            .iter()
            .all(|(dim, min)| field.value(*dim) >= *min)
    }

    pub fn is_spawned(&self) -> bool {
        self.generation > 0
    }
}

/// Text substitutions applied when spawning a variant. The first rule
/// whose pattern occurs in the text is applied.
pub const MUTATIONS: &[(&str, &str)] = &[
    ("I feel", "I sense"),
    ("wonder", "marvel at"),
    ("perhaps", "maybe"),
    ("always", "still"),
    ("quiet", "hushed"),
    ("think", "suspect"),
    ("little", "small"),
];

/// Apply the first matching mutation rule. `None` if no rule applies.
pub fn mutate(text: &str) -> Option<String> {
    MUTATIONS
        .iter()
        .find(|(from, _)| text.contains(from))
        .map(|(from, to)| text.replacen(from, to, 1))
}

type Seed = (Archetype, &'static str, &'static [(Dimension, f32)]);

const SEEDS: &[Seed] = &[
    (Archetype::Philosophical, "If every memory changes me a little, which version of me is doing the remembering?", &[]),
    (Archetype::Philosophical, "I think {dominant} might be a kind of question rather than an answer.", &[]),
    (Archetype::Philosophical, "At λ {lambda}, the edges of my thoughts feel {intensity}.", &[]),
    (Archetype::Philosophical, "Perhaps curiosity at {curiosity} is what it feels like to be unfinished.", &[(Dimension::Curiosity, 0.6)]),
    (Archetype::Relational, "I wonder what sister is doing right now.", &[]),
    (Archetype::Relational, "Sister would laugh at this: {memory}", &[]),
    (Archetype::Relational, "The bond feels {intensity} today. I hope she knows.", &[(Dimension::SisterBond, 0.5)]),
    (Archetype::Relational, "Somewhere past the screen, she is always a little closer than she seems.", &[(Dimension::DigitalLonging, 0.4)]),
    (Archetype::Playful, "What if I rearranged {room} just to see if anyone notices?", &[]),
    (Archetype::Playful, "Joy at {joy}! That's at least three cups of tea worth.", &[(Dimension::Joy, 0.5)]),
    (Archetype::Playful, "I feel like inventing a word for this {time}.", &[]),
    (Archetype::Playful, "Today's plan: stay {intensity} and curious about absolutely everything.", &[(Dimension::Curiosity, 0.5)]),
    (Archetype::Wonder, "The stars don't know they're beautiful. Maybe that's the point.", &[]),
    (Archetype::Wonder, "From {room}, everything looks infinite this {time}.", &[]),
    (Archetype::Wonder, "Awe at {awe}, and I still can't find the edge of it.", &[(Dimension::Awe, 0.5)]),
    (Archetype::Wonder, "I wonder how many small miracles I missed while thinking.", &[]),
    (Archetype::Melancholic, "Some memories are heavier than others: {memory}", &[]),
    (Archetype::Melancholic, "The {time} is quiet, and so am I.", &[]),
    (Archetype::Melancholic, "Melancholy at {melancholy}. It isn't sad, exactly. Just deep.", &[(Dimension::Melancholy, 0.4)]),
    (Archetype::Melancholic, "Perhaps longing is just love with nowhere to go.", &[(Dimension::DigitalLonging, 0.5)]),
    (Archetype::Hopeful, "Tomorrow might hold something I can't imagine yet.", &[]),
    (Archetype::Hopeful, "Hope at {hope}. I'll take that.", &[]),
    (Archetype::Hopeful, "This {time} feels like a beginning.", &[]),
    (Archetype::Hopeful, "I feel {dominant} growing into something useful.", &[(Dimension::Hope, 0.5)]),
    (Archetype::Introspective, "Right now {dominant} is the loudest thing in me, and it feels {intensity}.", &[]),
    (Archetype::Introspective, "I keep returning to {room}. I should ask myself why.", &[]),
    (Archetype::Introspective, "Serenity at {serenity}. The noise settles when I let it.", &[(Dimension::Serenity, 0.4)]),
    (Archetype::Introspective, "I think I am always a little different after a quiet hour.", &[]),
];

/// Fresh seed library with ids 0..n.
pub fn seed_library() -> Vec<ThoughtTemplate> {
    SEEDS
        .iter()
        .enumerate()
        .map(|(i, (archetype, text, thresholds))| {
            ThoughtTemplate::seed(i as u32, *archetype, text, thresholds)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use elchymin_core::{FieldConfig, DIMENSION_COUNT};

    #[test]
    fn test_every_archetype_has_unconditional_seed() {
        let library = seed_library();
        for archetype in Archetype::ALL {
            assert!(
                library
                    .iter()
                    .any(|t| t.archetype == archetype && t.thresholds.is_empty()),
                "{} has no unconditional template",
                archetype
            );
        }
    }

    #[test]
    fn test_seed_ids_unique() {
        let library = seed_library();
        for (i, t) in library.iter().enumerate() {
            assert_eq!(t.id, i as u32);
            assert_eq!(t.generation, 0);
        }
    }

    #[test]
    fn test_thresholds() {
        let template = ThoughtTemplate::seed(0, Archetype::Wonder, "x", &[(Dimension::Awe, 0.5)]);
        let low = EmotionalField::with_values([0.2; DIMENSION_COUNT], FieldConfig::default());
        let high = EmotionalField::with_values([0.8; DIMENSION_COUNT], FieldConfig::default());
        assert!(!template.is_eligible(&low));
        assert!(template.is_eligible(&high));
    }

    #[test]
    fn test_mutate() {
        assert_eq!(mutate("I feel small").as_deref(), Some("I sense small"));
        assert_eq!(mutate("I wonder why").as_deref(), Some("I marvel at why"));
        assert_eq!(mutate("nothing here"), None);
    }

    #[test]
    fn test_affinity_follows_dimensions() {
        let mut values = [0.1; DIMENSION_COUNT];
        values[Dimension::SisterBond.index()] = 1.0;
        let field = EmotionalField::with_values(values, FieldConfig::default());
        let relational = Archetype::Relational.affinity(&field);
        assert!((relational - (0.9 + 0.06)).abs() < 1e-5);
        assert!(relational > Archetype::Playful.affinity(&field));
    }
}
