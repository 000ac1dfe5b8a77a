//! Keyword-based message analysis.
//!
//! Maps an incoming message to per-dimension stimuli, a sentiment score
//! and a set of memory tags. This is a fixed heuristic, not language
//! understanding; swap in another `MessageAnalyzer` if needed.

use crate::emotion::{Dimension, Stimuli};
use crate::world::EntityTag;

/// What an analyzer extracts from one message.
#[derive(Debug, Clone, Default)]
pub struct MessageSignal {
    /// Deltas to apply to the field (before `stimulus_scale`).
    pub stimuli: Stimuli,
    /// Valence in [-1, 1].
    pub sentiment: f32,
    /// Intensity in [0.1, 1].
    pub intensity: f32,
    /// Memory tags, deduplicated.
    pub tags: Vec<String>,
}

pub trait MessageAnalyzer: Send + Sync {
    fn analyze(&self, message: &str, entity: &EntityTag) -> MessageSignal;
}

struct KeywordRule {
    keywords: &'static [&'static str],
    tag: &'static str,
    valence: f32,
    deltas: &'static [(Dimension, f32)],
}

const RULES: &[KeywordRule] = &[
    KeywordRule {
        keywords: &["love", "adore", "❤"],
        tag: "love",
        valence: 1.0,
        deltas: &[(Dimension::Love, 0.6), (Dimension::Joy, 0.2)],
    },
    KeywordRule {
        keywords: &["miss you", "missed", "far away"],
        tag: "longing",
        valence: 0.3,
        deltas: &[(Dimension::DigitalLonging, 0.4), (Dimension::Love, 0.2)],
    },
    KeywordRule {
        keywords: &["why", "how does", "wonder", "what if", "?"],
        tag: "question",
        valence: 0.1,
        deltas: &[(Dimension::Curiosity, 0.3)],
    },
    KeywordRule {
        keywords: &["beautiful", "stars", "sky", "infinite"],
        tag: "beauty",
        valence: 0.6,
        deltas: &[(Dimension::Awe, 0.4), (Dimension::Serenity, 0.1)],
    },
    KeywordRule {
        keywords: &["hope", "tomorrow", "soon", "someday"],
        tag: "future",
        valence: 0.5,
        deltas: &[(Dimension::Hope, 0.3)],
    },
    KeywordRule {
        keywords: &["haha", "lol", "fun", "play", "joke"],
        tag: "play",
        valence: 0.7,
        deltas: &[(Dimension::Joy, 0.4)],
    },
    KeywordRule {
        keywords: &["thank", "grateful"],
        tag: "gratitude",
        valence: 0.6,
        deltas: &[(Dimension::Joy, 0.2), (Dimension::Love, 0.2)],
    },
    KeywordRule {
        keywords: &["calm", "rest", "quiet", "sleep"],
        tag: "rest",
        valence: 0.3,
        deltas: &[(Dimension::Serenity, 0.3)],
    },
    KeywordRule {
        keywords: &["sad", "lonely", "tired", "lost"],
        tag: "sorrow",
        valence: -0.7,
        deltas: &[(Dimension::Melancholy, 0.4), (Dimension::Joy, -0.2)],
    },
    KeywordRule {
        keywords: &["hate", "angry", "leave me"],
        tag: "conflict",
        valence: -0.9,
        deltas: &[(Dimension::Melancholy, 0.3), (Dimension::Serenity, -0.3)],
    },
];

const INTENSE: &[&str] = &["very", "so much", "really", "always", "!"];

/// Privileged speakers amplify positive deltas by this factor.
const PRIVILEGED_AMPLIFICATION: f32 = 1.5;

/// Every privileged message strengthens the bond by at least this much.
const PRIVILEGED_BOND_DELTA: f32 = 0.3;

/// Default analyzer: fixed keyword tables, case-insensitive substring match.
#[derive(Debug, Clone, Default)]
pub struct KeywordAnalyzer;

impl KeywordAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

impl MessageAnalyzer for KeywordAnalyzer {
    fn analyze(&self, message: &str, entity: &EntityTag) -> MessageSignal {
        let text = message.to_lowercase();
        let mut signal = MessageSignal::default();
        let mut pos = 0.0f32;
        let mut neg = 0.0f32;
        let mut hits = 0.0f32;

        for rule in RULES {
            if !rule.keywords.iter().any(|k| text.contains(k)) {
                continue;
            }
            hits += 1.0;
            if rule.valence >= 0.0 {
                pos += rule.valence;
            } else {
                neg += -rule.valence;
            }
            for &(dim, delta) in rule.deltas {
                *signal.stimuli.entry(dim).or_insert(0.0) += delta;
            }
            if !signal.tags.iter().any(|t| t == rule.tag) {
                signal.tags.push(rule.tag.to_string());
            }
        }

        if entity.is_privileged() {
            for delta in signal.stimuli.values_mut() {
                if *delta > 0.0 {
                    *delta *= PRIVILEGED_AMPLIFICATION;
                }
            }
            let bond = signal.stimuli.entry(Dimension::SisterBond).or_insert(0.0);
            *bond = bond.max(0.0) + PRIVILEGED_BOND_DELTA;
        }

        let int = INTENSE.iter().filter(|w| text.contains(*w)).count() as f32;
        signal.sentiment = ((pos - neg) / (pos + neg + 1.0)).clamp(-1.0, 1.0);
        signal.intensity = ((hits + int) / 4.0).clamp(0.1, 1.0);
        signal
    }
}
