//! Token counting
//!
//! Every budget decision in the hot tier and every cost estimate in the
//! context loader goes through a [`TokenCounter`]. The default
//! [`HeuristicTokenCounter`] uses the rough "4 bytes per token" rule; plug in a
//! real tokenizer by implementing the trait or by passing a closure.

use std::sync::Arc;

/// Counts tokens in a piece of text
pub trait TokenCounter: Send + Sync {
    /// Number of tokens `text` would consume in a model context
    fn count(&self, text: &str) -> usize;
}

impl<F> TokenCounter for F
where
    F: Fn(&str) -> usize + Send + Sync,
{
    fn count(&self, text: &str) -> usize {
        self(text)
    }
}

/// Approximate counter: `len(text) / bytes_per_token`
#[derive(Debug, Clone, Copy)]
pub struct HeuristicTokenCounter {
    bytes_per_token: usize,
}

impl HeuristicTokenCounter {
    /// Create a counter with the default ratio of 4 bytes per token
    pub fn new() -> Self {
        Self { bytes_per_token: 4 }
    }

    /// Set the bytes-per-token ratio (minimum 1)
    pub fn with_bytes_per_token(mut self, bytes_per_token: usize) -> Self {
        self.bytes_per_token = bytes_per_token.max(1);
        self
    }
}

impl Default for HeuristicTokenCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenCounter for HeuristicTokenCounter {
    fn count(&self, text: &str) -> usize {
        text.len() / self.bytes_per_token
    }
}

/// Shared handle to a token counter
pub type SharedTokenCounter = Arc<dyn TokenCounter>;

/// The default shared counter
pub fn default_counter() -> SharedTokenCounter {
    Arc::new(HeuristicTokenCounter::new())
}
