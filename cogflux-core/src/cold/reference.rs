//! Cold reference types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::hot::{HotMemory, HotMessage, ReasoningState};

/// Kind of payload a cold reference points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColdEntryType {
    Conversation,
    Summary,
    Decision,
    Document,
}

/// Lightweight pointer into the external cold archive.
///
/// Represents archived content, never contains it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColdReference {
    pub entry_id: String,
    pub entry_type: ColdEntryType,
    /// Short human-readable description of the archived payload
    pub summary: String,
    pub relevance_score: f64,
    pub access_url: String,
    pub expires_at: DateTime<Utc>,
}

impl ColdReference {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }

    /// `needle` must be lowercase
    pub(crate) fn matches(&self, needle: &str) -> bool {
        self.summary.to_lowercase().contains(needle)
    }
}

/// Full-fidelity payload written to the cold archive when hot memory is archived
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveEntry {
    pub entry_id: String,
    pub agent_id: String,
    pub conversation_id: String,
    pub messages: Vec<HotMessage>,
    pub objectives: Vec<String>,
    pub constraints: Vec<String>,
    pub reasoning_state: ReasoningState,
    pub archived_at: DateTime<Utc>,
}

impl ArchiveEntry {
    /// Capture everything currently in `hot`
    pub fn capture(hot: &HotMemory) -> Self {
        Self {
            entry_id: uuid::Uuid::new_v4().to_string(),
            agent_id: hot.agent_id.clone(),
            conversation_id: hot.conversation_id.clone(),
            messages: hot.messages.clone(),
            objectives: hot.objectives.clone(),
            constraints: hot.constraints.clone(),
            reasoning_state: hot.reasoning_state.clone(),
            archived_at: Utc::now(),
        }
    }
}

/// Acknowledgement from the cold archive for a stored entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveReceipt {
    pub entry_id: String,
    pub access_url: String,
}
