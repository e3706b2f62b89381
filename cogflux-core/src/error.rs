//! Error types for cogflux operations

use std::time::Duration;

/// Result type for cogflux operations
pub type Result<T> = std::result::Result<T, FluxError>;

/// Error types for the tri-layer memory manager
#[derive(Debug, thiserror::Error)]
pub enum FluxError {
    /// Operation referenced an agent that has no hot memory
    #[error("Validation error: no hot memory for agent {0}")]
    AgentNotFound(String),

    /// Invalid input
    #[error("Validation error: {0}")]
    Validation(String),

    /// A message cannot fit into the hot memory budget, even after archiving
    #[error("Capacity exceeded for {agent_id}: needs {required} tokens, budget {max_tokens}")]
    CapacityExceeded {
        agent_id: String,
        required: usize,
        max_tokens: usize,
    },

    /// Archiving hot memory failed; hot memory was left untouched
    #[error("Archive failed for agent {agent_id}: {reason}")]
    ArchiveFailure { agent_id: String, reason: String },

    /// The cold archive service failed or is unreachable
    #[error("Cold access error: {0}")]
    ColdAccess(String),

    /// The cold archive service did not answer in time
    #[error("Cold access timed out after {0:?}")]
    ColdAccessTimeout(Duration),

    /// Hypothesis not found in warm memory
    #[error("Hypothesis not found: {0}")]
    HypothesisNotFound(String),

    /// Illegal hypothesis status change
    #[error("Invalid hypothesis transition for {id}: {from} -> {to}")]
    InvalidTransition { id: String, from: String, to: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl FluxError {
    /// Whether the error leaves every memory tier unchanged and can be retried
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FluxError::ColdAccess(_) | FluxError::ColdAccessTimeout(_)
        )
    }
}

impl From<String> for FluxError {
    fn from(s: String) -> Self {
        FluxError::Other(s)
    }
}

impl From<&str> for FluxError {
    fn from(s: &str) -> Self {
        FluxError::Other(s.to_string())
    }
}

impl From<anyhow::Error> for FluxError {
    fn from(err: anyhow::Error) -> Self {
        FluxError::Other(err.to_string())
    }
}
