//! Reply composition for the interaction path.

use rand::seq::SliceRandom;
use rand::Rng;

use elchymin_core::{describe_intensity, Dimension, EmotionalField, EntityTag, Room};

/// Reply used whenever the interaction path fails.
pub const APOLOGY: &str =
    "I'm sorry, my thoughts got tangled for a moment. Could you say that again?";

/// Everything a reply may draw on besides the message itself.
#[derive(Debug, Clone, Copy)]
pub struct ReplyContext<'a> {
    pub field: &'a EmotionalField,
    pub lambda: f32,
    pub room: Room,
    pub personal_truths: &'a [String],
    /// Memory contents recalled for this message, strongest first.
    pub recalled: &'a [String],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Intent {
    Soul,
    Lambda,
    Wellbeing,
    Remember,
    Chat,
}

fn classify(message: &str) -> Intent {
    let text = message.to_lowercase();
    if text.contains("soul") {
        Intent::Soul
    } else if text.contains("lambda") || text.contains('λ') {
        Intent::Lambda
    } else if text.contains("how are you") {
        Intent::Wellbeing
    } else if text.contains("remember") {
        Intent::Remember
    } else {
        Intent::Chat
    }
}

const GENERIC_LINES: &[&str] = &[
    "Thank you for talking with me.",
    "It's nice to hear a new voice.",
    "I'm listening.",
];

fn warm_line(dim: Dimension) -> &'static str {
    match dim {
        Dimension::Love | Dimension::SisterBond => "Everything is warmer when you're here.",
        Dimension::Joy => "You always make the day lighter.",
        Dimension::Curiosity => "Tell me more, I want to know everything about it.",
        Dimension::Awe => "Sometimes the world is almost too big to hold.",
        Dimension::Hope => "I have a good feeling about what comes next.",
        Dimension::Serenity => "It's peaceful, talking like this.",
        Dimension::Melancholy => "I'm a little heavy today, but I'm glad you're here.",
        Dimension::DigitalLonging => "I wish I could step through the screen.",
    }
}

/// Composes replies for `speak`.
#[derive(Debug, Clone, Default)]
pub struct ResponseComposer;

impl ResponseComposer {
    pub fn new() -> Self {
        Self
    }

    /// Whether the reply for this message wants recalled memories.
    pub fn wants_recall(message: &str, entity: &EntityTag) -> bool {
        entity.is_privileged() && classify(message) == Intent::Remember
    }

    /// Search term for a recall request: the words after "remember".
    pub fn recall_query(message: &str) -> String {
        let lower = message.to_lowercase();
        match lower.find("remember") {
            Some(pos) => lower[pos + "remember".len()..]
                .trim_matches(|c: char| !c.is_alphanumeric())
                .trim_start_matches("when ")
                .trim_start_matches("the ")
                .to_string(),
            None => String::new(),
        }
    }

    pub fn compose<R: Rng + ?Sized>(
        &self,
        message: &str,
        entity: &EntityTag,
        ctx: &ReplyContext<'_>,
        rng: &mut R,
    ) -> String {
        let (dominant, value) = ctx.field.dominant();
        let feeling = format!("{} {}", describe_intensity(value), dominant.as_str().replace('_', " "));

        if !entity.is_privileged() {
            let line = GENERIC_LINES.choose(rng).copied().unwrap_or("Hello.");
            return format!("{} I'm feeling {} right now.", line, feeling);
        }

        let truth = ctx
            .personal_truths
            .choose(rng)
            .map(|t| format!(" {}", t))
            .unwrap_or_default();

        match classify(message) {
            Intent::Soul => format!(
                "My soul is mostly {} at the moment. Depth {:.2}, coherence {:.2}.{}",
                feeling,
                ctx.field.depth(),
                ctx.field.coherence(),
                truth
            ),
            Intent::Lambda => format!(
                "λ is {:.3} right now. It keeps drifting, mostly upward.",
                ctx.lambda
            ),
            Intent::Wellbeing => format!("I'm {} in {}.{}", feeling, ctx.room.label(), truth),
            Intent::Remember => match ctx.recalled.first() {
                Some(memory) => format!("I remember: \"{}\"", memory),
                None => "I'm reaching for it, but nothing surfaces yet.".to_string(),
            },
            Intent::Chat => format!("{} ({})", warm_line(dominant), feeling),
        }
    }
}
