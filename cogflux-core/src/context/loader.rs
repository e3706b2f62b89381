//! Context loader: warm + cold -> bounded bundle for reasoning

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::cold::{ColdReference, ColdReferenceIndex};
use crate::config::ContextLoaderConfig;
use crate::tokens::SharedTokenCounter;
use crate::warm::{DecisionRecord, Hypothesis, Preference, SemanticSummary, WarmMemoryStore};

/// Bundle of warm and cold knowledge selected for one reasoning step.
///
/// Ephemeral: built per [`ContextLoader::load_context`] call and never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadedContext {
    pub query: Option<String>,
    pub summaries: Vec<SemanticSummary>,
    pub decisions: Vec<DecisionRecord>,
    pub active_hypotheses: Vec<Hypothesis>,
    pub preferences: Vec<Preference>,
    pub cold_references: Vec<ColdReference>,
    /// Approximate token cost of the selected summaries
    pub total_tokens: usize,
    #[serde(with = "humantime_serde")]
    pub load_latency: Duration,
    pub loaded_at: DateTime<Utc>,
}

impl LoadedContext {
    pub fn has_summaries(&self) -> bool {
        !self.summaries.is_empty()
    }

    /// Render the summaries as a system prompt section
    pub fn render_summaries(&self) -> String {
        let lines = self
            .summaries
            .iter()
            .map(|s| {
                if s.key_points.is_empty() {
                    format!("- {}", s.content)
                } else {
                    format!("- {} (key points: {})", s.content, s.key_points.join("; "))
                }
            })
            .collect::<Vec<_>>()
            .join("\n");
        format!("Relevant context from warm memory:\n{}", lines)
    }
}

/// Assembles [`LoadedContext`] bundles
pub struct ContextLoader {
    warm: Arc<WarmMemoryStore>,
    cold: Arc<ColdReferenceIndex>,
    counter: SharedTokenCounter,
    config: ContextLoaderConfig,
    last: RwLock<Option<LoadedContext>>,
}

impl ContextLoader {
    pub fn new(
        warm: Arc<WarmMemoryStore>,
        cold: Arc<ColdReferenceIndex>,
        counter: SharedTokenCounter,
        config: ContextLoaderConfig,
    ) -> Self {
        Self {
            warm,
            cold,
            counter,
            config,
            last: RwLock::new(None),
        }
    }

    /// Default summary limit
    pub fn default_max_summaries(&self) -> usize {
        self.config.max_summaries
    }

    /// Load context for an optional query.
    ///
    /// With a query: matching summaries (insertion order) capped at
    /// `max_summaries`, matching decisions capped at the configured decision
    /// limit, and cold references whose summary matches. Without a query: the
    /// most relevant summaries, the most recent decisions and the most relevant
    /// cold references. Open hypotheses and preferences are always included.
    pub async fn load_context(&self, query: Option<&str>, max_summaries: usize) -> LoadedContext {
        let started = Instant::now();
        let max_decisions = self.config.max_decisions;

        let (summaries, decisions, cold_references) = match query {
            Some(query) => {
                let (mut summaries, mut decisions) = self.warm.search(query).await;
                summaries.truncate(max_summaries);
                decisions.truncate(max_decisions);
                let mut references = self.cold.search(query).await;
                references.truncate(max_summaries);
                (summaries, decisions, references)
            }
            None => (
                self.warm.top_summaries(max_summaries).await,
                self.warm.recent_decisions(max_decisions).await,
                self.cold.top_references(max_summaries).await,
            ),
        };

        let active_hypotheses = self.warm.active_hypotheses().await;
        let mut preferences = self.warm.preferences().await;
        if let Some(cap) = self.config.max_preferences {
            preferences.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
            preferences.truncate(cap);
        }

        let total_tokens = summaries
            .iter()
            .map(|s| self.counter.count(&s.content))
            .sum();

        let context = LoadedContext {
            query: query.map(str::to_string),
            summaries,
            decisions,
            active_hypotheses,
            preferences,
            cold_references,
            total_tokens,
            load_latency: started.elapsed(),
            loaded_at: Utc::now(),
        };

        tracing::debug!(
            query = ?context.query,
            summaries = context.summaries.len(),
            decisions = context.decisions.len(),
            hypotheses = context.active_hypotheses.len(),
            total_tokens = context.total_tokens,
            latency = ?context.load_latency,
            "Loaded context"
        );

        *self.last.write().await = Some(context.clone());
        context
    }

    /// The most recently loaded context, if not cleared
    pub async fn last_context(&self) -> Option<LoadedContext> {
        self.last.read().await.clone()
    }

    /// Discard the most recently loaded context
    pub async fn clear_context(&self) {
        *self.last.write().await = None;
    }
}
