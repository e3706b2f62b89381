//! Hot memory data model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tokens::TokenCounter;

/// Author of a hot memory message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::Tool => "tool",
        }
    }
}

/// A single message in an agent's active context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotMessage {
    pub role: MessageRole,
    pub content: String,
    /// Tokens this message consumes in the budget
    pub token_count: usize,
    pub timestamp: DateTime<Utc>,
}

impl HotMessage {
    /// Create a message with a caller-supplied token count
    pub fn new(role: MessageRole, content: impl Into<String>, token_count: usize) -> Self {
        Self {
            role,
            content: content.into(),
            token_count,
            timestamp: Utc::now(),
        }
    }

    /// Create a message whose token count comes from `counter`
    pub fn counted(
        role: MessageRole,
        content: impl Into<String>,
        counter: &dyn TokenCounter,
    ) -> Self {
        let content = content.into();
        let token_count = counter.count(&content);
        Self::new(role, content, token_count)
    }

    pub fn system(content: impl Into<String>, token_count: usize) -> Self {
        Self::new(MessageRole::System, content, token_count)
    }

    pub fn user(content: impl Into<String>, token_count: usize) -> Self {
        Self::new(MessageRole::User, content, token_count)
    }

    pub fn assistant(content: impl Into<String>, token_count: usize) -> Self {
        Self::new(MessageRole::Assistant, content, token_count)
    }

    pub fn is_system(&self) -> bool {
        self.role == MessageRole::System
    }
}

/// Working state of the agent's current line of reasoning
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReasoningState {
    pub current_task: Option<String>,
    pub pending_actions: Vec<String>,
    pub active_hypothesis_ids: Vec<String>,
    /// Confidence in the current line of reasoning (0.0-1.0)
    pub confidence: f64,
    /// Id of the archive entry this context last checkpointed to
    pub last_checkpoint_id: Option<String>,
}

/// Volatile, token-budgeted active context of one agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotMemory {
    pub agent_id: String,
    pub conversation_id: String,
    pub messages: Vec<HotMessage>,
    /// Ordered, duplicate-free
    pub objectives: Vec<String>,
    /// Ordered, duplicate-free
    pub constraints: Vec<String>,
    pub reasoning_state: ReasoningState,
    pub token_count: usize,
    pub max_tokens: usize,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    /// Messages appended since initialization or the last archive
    #[serde(default)]
    pub unarchived_messages: usize,
}

impl HotMemory {
    /// Create an empty hot memory
    pub fn new(
        agent_id: impl Into<String>,
        conversation_id: impl Into<String>,
        max_tokens: usize,
    ) -> Self {
        let now = Utc::now();
        Self {
            agent_id: agent_id.into(),
            conversation_id: conversation_id.into(),
            messages: Vec::new(),
            objectives: Vec::new(),
            constraints: Vec::new(),
            reasoning_state: ReasoningState::default(),
            token_count: 0,
            max_tokens,
            created_at: now,
            last_activity: now,
            unarchived_messages: 0,
        }
    }

    /// `token_count / max_tokens`
    pub fn utilization(&self) -> f64 {
        if self.max_tokens == 0 {
            return 0.0;
        }
        self.token_count as f64 / self.max_tokens as f64
    }

    /// Whether `additional` tokens fit into the remaining budget
    pub fn fits(&self, additional: usize) -> bool {
        self.token_count.saturating_add(additional) <= self.max_tokens
    }

    pub fn remaining_tokens(&self) -> usize {
        self.max_tokens.saturating_sub(self.token_count)
    }

    /// Whether anything was appended since initialization or the last archive
    pub fn has_unarchived_content(&self) -> bool {
        self.unarchived_messages > 0
    }

    /// Messages that aren't synthetic system messages
    pub fn conversation_messages(&self) -> impl Iterator<Item = &HotMessage> {
        self.messages.iter().filter(|m| !m.is_system())
    }

    /// Append without any budget check; callers enforce the budget
    pub(crate) fn push(&mut self, message: HotMessage) {
        self.token_count += message.token_count;
        self.last_activity = Utc::now();
        self.unarchived_messages += 1;
        self.messages.push(message);
    }

    /// Replace the context with a single marker message
    pub(crate) fn reset_to_marker(&mut self, marker: HotMessage, checkpoint_id: &str) {
        self.token_count = marker.token_count;
        self.messages = vec![marker];
        self.unarchived_messages = 0;
        self.reasoning_state.last_checkpoint_id = Some(checkpoint_id.to_string());
        self.last_activity = Utc::now();
    }
}

/// Deduplicate while keeping first-seen order
pub(crate) fn ordered_set(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}
