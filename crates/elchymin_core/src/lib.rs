//! # Elchymin Core
//!
//! Shared vocabulary for the agent: the emotional field and its
//! dimensions, the situational types (rooms, time of day, speakers), the
//! message analysis seam, and configuration.

pub mod analysis;
pub mod config;
pub mod emotion;
pub mod world;

pub use analysis::{KeywordAnalyzer, MessageAnalyzer, MessageSignal};
pub use config::{
    CycleConfig, DesireConfig, ElchyminConfig, FieldConfig, MemoryConfig, PersistenceConfig,
    ThoughtConfig,
};
pub use emotion::{
    describe_intensity, Dimension, DominantMark, EmotionalField, Stimuli, DIMENSION_COUNT,
};
pub use world::{EntityTag, Room, TimeOfDay};
