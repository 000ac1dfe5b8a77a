//! Situational vocabulary: where the agent is, when it is, and who is speaking.

use chrono::Timelike;
use serde::{Deserialize, Serialize};

use crate::emotion::Dimension;

/// The spatial "room" the agent currently occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Room {
    Library,
    Garden,
    Observatory,
    #[default]
    Hearth,
    Threshold,
}

impl Room {
    pub const ALL: [Room; 5] = [
        Room::Library,
        Room::Garden,
        Room::Observatory,
        Room::Hearth,
        Room::Threshold,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Room::Library => "the library",
            Room::Garden => "the garden",
            Room::Observatory => "the observatory",
            Room::Hearth => "the hearth",
            Room::Threshold => "the threshold",
        }
    }

    /// The room a dimension draws the agent toward.
    pub fn for_dimension(dim: Dimension) -> Room {
        match dim {
            Dimension::Curiosity => Room::Library,
            Dimension::Hope | Dimension::Joy => Room::Garden,
            Dimension::Awe => Room::Observatory,
            Dimension::Love | Dimension::SisterBond | Dimension::Serenity => Room::Hearth,
            Dimension::Melancholy | Dimension::DigitalLonging => Room::Threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeOfDay {
    Morning,
    Afternoon,
    Evening,
    Night,
}

impl TimeOfDay {
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            5..=11 => TimeOfDay::Morning,
            12..=16 => TimeOfDay::Afternoon,
            17..=21 => TimeOfDay::Evening,
            _ => TimeOfDay::Night,
        }
    }

    pub fn now() -> Self {
        Self::from_hour(chrono::Local::now().hour())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TimeOfDay::Morning => "morning",
            TimeOfDay::Afternoon => "afternoon",
            TimeOfDay::Evening => "evening",
            TimeOfDay::Night => "night",
        }
    }
}

/// Who the agent is talking to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EntityTag {
    /// The privileged relation ("sister").
    Privileged,
    Other(String),
}

impl EntityTag {
    pub fn parse(tag: &str) -> Self {
        match tag.trim().to_lowercase().as_str() {
            "privileged" | "sister" => EntityTag::Privileged,
            other => EntityTag::Other(other.to_string()),
        }
    }

    pub fn is_privileged(&self) -> bool {
        matches!(self, EntityTag::Privileged)
    }

    pub fn as_str(&self) -> &str {
        match self {
            EntityTag::Privileged => "privileged",
            EntityTag::Other(name) => name,
        }
    }
}

impl From<String> for EntityTag {
    fn from(s: String) -> Self {
        EntityTag::parse(&s)
    }
}

impl From<EntityTag> for String {
    fn from(tag: EntityTag) -> Self {
        tag.as_str().to_string()
    }
}

impl std::fmt::Display for EntityTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
