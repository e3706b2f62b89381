//! Hot memory: the volatile, token-budgeted active context of each agent

mod manager;
mod types;

pub use manager::{AppendOutcome, HotMemoryManager};
pub use types::{HotMemory, HotMessage, MessageRole, ReasoningState};

pub(crate) use types::ordered_set;
