//! # Elchymin Expression
//!
//! Everything the agent says: autonomous thoughts drawn from an evolving
//! template library, and replies for the interaction path.

pub mod engine;
pub mod response;
pub mod templates;

pub use engine::{fill_slots, slot_values, Thought, ThoughtContext, ThoughtEngine, ThoughtError};
pub use response::{ReplyContext, ResponseComposer, APOLOGY};
pub use templates::{mutate, seed_library, Archetype, ThoughtTemplate};
