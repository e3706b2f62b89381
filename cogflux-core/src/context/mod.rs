//! Context loading
//!
//! Selects a bounded bundle of warm summaries, decisions, open hypotheses,
//! preferences and cold references for the next reasoning step.

mod loader;

pub use loader::{ContextLoader, LoadedContext};
