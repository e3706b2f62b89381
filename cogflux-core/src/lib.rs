//! # Cogflux - Tri-layer Context Memory for Agents
//!
//! Cogflux keeps an agent's working context inside its token budget by moving
//! knowledge between three tiers:
//! - **Hot**: the volatile, token-budgeted active context of each agent
//! - **Warm**: persisted summaries, decisions, hypotheses and preferences
//! - **Cold**: references into an immutable external archive
//!
//! When hot memory would overflow, its content is summarized into warm memory,
//! written in full to the cold archive, and replaced by a single marker
//! message. Before each reasoning step the orchestrator loads the most
//! relevant warm context back into hot memory.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cogflux_core::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let flux = CognitiveFluxOrchestrator::builder()
//!         .config(FluxConfig::load()?)
//!         .build()?;
//!     flux.start_monitor().await;
//!
//!     flux.initialize("planner", "conv-1", 8192).await?;
//!     flux.set_active_agent("planner").await?;
//!     flux.append_text("planner", MessageRole::User, "Plan the Q3 close").await?;
//!
//!     let context = flux.execute_flux("planner", Some("close")).await?;
//!     println!("{} summaries, {:?}", context.summaries.len(), flux.metrics().await);
//!
//!     flux.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **Archive pipeline**: all-or-nothing flush of hot memory to warm + cold
//! - **Context loader**: query-driven or relevance-ranked warm selection
//! - **Auto-archive monitor**: background task archiving the active agent
//!   before it reaches its budget
//! - **Pluggable token counting** through [`tokens::TokenCounter`]

pub mod archive;
pub mod cold;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod hot;
pub mod metrics;
pub mod monitor;
pub mod orchestrator;
pub mod tokens;
pub mod warm;

/// Current library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Re-export commonly used types
pub mod prelude {
    pub use crate::archive::{ArchiveOutcome, ArchiveReport};
    pub use crate::cold::{
        ArchiveEntry, ArchiveReceipt, ColdArchiveService, ColdEntryType, ColdReference,
        ColdReferenceIndex, HttpColdArchive, InMemoryColdArchive,
    };
    pub use crate::config::FluxConfig;
    pub use crate::context::{ContextLoader, LoadedContext};
    pub use crate::error::{FluxError, Result};
    pub use crate::events::FluxEvent;
    pub use crate::hot::{
        AppendOutcome, HotMemory, HotMemoryManager, HotMessage, MessageRole, ReasoningState,
    };
    pub use crate::metrics::FluxMetrics;
    pub use crate::orchestrator::{CognitiveFluxOrchestrator, CognitiveFluxOrchestratorBuilder};
    pub use crate::tokens::{HeuristicTokenCounter, SharedTokenCounter, TokenCounter};
    pub use crate::warm::{
        DecisionOutcome, DecisionRecord, Hypothesis, HypothesisStatus, HypothesisUpdate,
        Preference, SemanticSummary, Sentiment, WarmMemoryStore,
    };
}
