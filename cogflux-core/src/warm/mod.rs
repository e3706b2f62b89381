//! Warm memory: the agent's persisted, compressible beliefs
//!
//! Summaries of archived conversations, decisions with their intentions,
//! hypotheses under evaluation and learned preferences. The store is bounded by
//! [`WarmMemoryStore::compress`], which ranks summaries by relevance and
//! decisions by recency.

mod store;
mod types;

pub use store::{CompressionReport, WarmMemoryStore, WarmSnapshot};
pub use types::{
    DecisionOutcome, DecisionRecord, Hypothesis, HypothesisStatus, HypothesisUpdate, Preference,
    SemanticSummary, Sentiment, SummaryBuilder,
};
