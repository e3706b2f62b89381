//! Warm memory store
//!
//! Holds the agent's persisted beliefs behind one store-wide lock. Every
//! mutation (including a full [`WarmMemoryStore::compress`] pass) runs under a
//! single write guard, so concurrent readers never observe a partial update.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tokio::sync::RwLock;

use crate::config::WarmConfig;
use crate::error::{FluxError, Result};

use super::types::{DecisionRecord, Hypothesis, HypothesisUpdate, Preference, SemanticSummary};

/// Serializable contents of a warm store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WarmSnapshot {
    pub summaries: Vec<SemanticSummary>,
    pub decisions: Vec<DecisionRecord>,
    pub hypotheses: Vec<Hypothesis>,
    pub preferences: Vec<Preference>,
}

/// Counts removed by a compression pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompressionReport {
    pub summaries_evicted: usize,
    pub decisions_evicted: usize,
}

impl CompressionReport {
    pub fn is_noop(&self) -> bool {
        self.summaries_evicted == 0 && self.decisions_evicted == 0
    }
}

/// Store of summaries, decisions, hypotheses and preferences
pub struct WarmMemoryStore {
    state: RwLock<WarmSnapshot>,
    config: WarmConfig,
}

impl WarmMemoryStore {
    /// Create an empty store
    pub fn new(config: WarmConfig) -> Self {
        Self {
            state: RwLock::new(WarmSnapshot::default()),
            config,
        }
    }

    /// Create a store pre-populated from a snapshot
    pub fn from_snapshot(config: WarmConfig, snapshot: WarmSnapshot) -> Self {
        Self {
            state: RwLock::new(snapshot),
            config,
        }
    }

    /// Append a summary, returning its id
    pub async fn add_summary(&self, summary: SemanticSummary) -> String {
        let id = summary.id.clone();
        self.state.write().await.summaries.push(summary);
        tracing::debug!(summary_id = %id, "Added warm summary");
        id
    }

    /// Append a decision, returning its id
    pub async fn add_decision(&self, decision: DecisionRecord) -> String {
        let id = decision.id.clone();
        self.state.write().await.decisions.push(decision);
        tracing::debug!(decision_id = %id, "Added warm decision");
        id
    }

    /// Insert a hypothesis, returning its id
    pub async fn add_hypothesis(&self, hypothesis: Hypothesis) -> String {
        let id = hypothesis.id.clone();
        self.state.write().await.hypotheses.push(hypothesis);
        id
    }

    /// Update a hypothesis in place.
    ///
    /// # Errors
    ///
    /// `HypothesisNotFound` for an unknown id, `InvalidTransition` when the
    /// requested status change is illegal. Neither modifies the hypothesis.
    pub async fn update_hypothesis(
        &self,
        id: &str,
        update: HypothesisUpdate,
    ) -> Result<Hypothesis> {
        let mut state = self.state.write().await;
        let hypothesis = state
            .hypotheses
            .iter_mut()
            .find(|h| h.id == id)
            .ok_or_else(|| FluxError::HypothesisNotFound(id.to_string()))?;

        if let Some(next) = update.status {
            if !hypothesis.status.can_transition_to(next) {
                return Err(FluxError::InvalidTransition {
                    id: id.to_string(),
                    from: hypothesis.status.to_string(),
                    to: next.to_string(),
                });
            }
            hypothesis.status = next;
        }
        if let Some(statement) = update.statement {
            hypothesis.statement = statement;
        }
        if let Some(confidence) = update.confidence {
            hypothesis.confidence = confidence.clamp(0.0, 1.0);
        }
        if let Some(evidence) = update.supporting_evidence {
            hypothesis.supporting_evidence = evidence;
        }
        if let Some(evidence) = update.contradicting_evidence {
            hypothesis.contradicting_evidence = evidence;
        }
        hypothesis.updated_at = Utc::now();

        Ok(hypothesis.clone())
    }

    /// Insert or overwrite the preference for its (category, key).
    ///
    /// Returns the id of the stored preference; an upsert keeps the original id.
    pub async fn add_preference(&self, preference: Preference) -> String {
        let mut state = self.state.write().await;
        if let Some(existing) = state
            .preferences
            .iter_mut()
            .find(|p| p.category == preference.category && p.key == preference.key)
        {
            existing.value = preference.value;
            existing.confidence = preference.confidence;
            existing.created_at = preference.created_at;
            return existing.id.clone();
        }
        let id = preference.id.clone();
        state.preferences.push(preference);
        id
    }

    /// Case-insensitive substring search over summaries (content, key points)
    /// and decisions (decision, intention), in insertion order
    pub async fn search(&self, query: &str) -> (Vec<SemanticSummary>, Vec<DecisionRecord>) {
        let needle = query.to_lowercase();
        let state = self.state.read().await;

        let summaries = state
            .summaries
            .iter()
            .filter(|s| s.matches(&needle))
            .cloned()
            .collect();
        let decisions = state
            .decisions
            .iter()
            .filter(|d| d.matches(&needle))
            .cloned()
            .collect();

        (summaries, decisions)
    }

    /// Apply the bounding policy.
    ///
    /// Summaries over `summary_limit` are cut to the `summaries_retained` most
    /// relevant; decisions over `decision_limit` are cut to the most recent
    /// `decision_limit`. The two collections are ranked differently: relevance
    /// for summaries, recency for decisions. Survivors keep insertion order.
    pub async fn compress(&self) -> CompressionReport {
        let mut state = self.state.write().await;
        let mut report = CompressionReport::default();

        if state.summaries.len() > self.config.summary_limit {
            let mut ranked: Vec<(&str, f64)> = state
                .summaries
                .iter()
                .map(|s| (s.id.as_str(), s.relevance_score))
                .collect();
            ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
            let keep: HashSet<String> = ranked
                .into_iter()
                .take(self.config.summaries_retained)
                .map(|(id, _)| id.to_string())
                .collect();

            let before = state.summaries.len();
            state.summaries.retain(|s| keep.contains(&s.id));
            report.summaries_evicted = before - state.summaries.len();
        }

        if state.decisions.len() > self.config.decision_limit {
            let mut ranked: Vec<(&str, DateTime<Utc>)> = state
                .decisions
                .iter()
                .map(|d| (d.id.as_str(), d.created_at))
                .collect();
            ranked.sort_by(|a, b| b.1.cmp(&a.1));
            let keep: HashSet<String> = ranked
                .into_iter()
                .take(self.config.decision_limit)
                .map(|(id, _)| id.to_string())
                .collect();

            let before = state.decisions.len();
            state.decisions.retain(|d| keep.contains(&d.id));
            report.decisions_evicted = before - state.decisions.len();
        }

        if !report.is_noop() {
            tracing::info!(
                summaries_evicted = report.summaries_evicted,
                decisions_evicted = report.decisions_evicted,
                "Compressed warm memory"
            );
        }
        report
    }

    /// All summaries in store order
    pub async fn summaries(&self) -> Vec<SemanticSummary> {
        self.state.read().await.summaries.clone()
    }

    /// The `limit` most relevant summaries, strictly by descending relevance
    pub async fn top_summaries(&self, limit: usize) -> Vec<SemanticSummary> {
        let mut summaries = self.summaries().await;
        summaries.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
        summaries.truncate(limit);
        summaries
    }

    /// All decisions in store order
    pub async fn decisions(&self) -> Vec<DecisionRecord> {
        self.state.read().await.decisions.clone()
    }

    /// The `limit` most recent decisions, newest first
    pub async fn recent_decisions(&self, limit: usize) -> Vec<DecisionRecord> {
        let state = self.state.read().await;
        let mut decisions: Vec<DecisionRecord> = state.decisions.clone();
        // Stable sort keeps later inserts first when timestamps tie
        decisions.reverse();
        decisions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        decisions.truncate(limit);
        decisions
    }

    pub async fn hypotheses(&self) -> Vec<Hypothesis> {
        self.state.read().await.hypotheses.clone()
    }

    pub async fn hypothesis(&self, id: &str) -> Option<Hypothesis> {
        self.state
            .read()
            .await
            .hypotheses
            .iter()
            .find(|h| h.id == id)
            .cloned()
    }

    /// Hypotheses still under evaluation (active or revised)
    pub async fn active_hypotheses(&self) -> Vec<Hypothesis> {
        self.state
            .read()
            .await
            .hypotheses
            .iter()
            .filter(|h| h.status.is_open())
            .cloned()
            .collect()
    }

    pub async fn preferences(&self) -> Vec<Preference> {
        self.state.read().await.preferences.clone()
    }

    pub async fn preference(&self, category: &str, key: &str) -> Option<Preference> {
        self.state
            .read()
            .await
            .preferences
            .iter()
            .find(|p| p.category == category && p.key == key)
            .cloned()
    }

    /// Summaries plus decisions
    pub async fn entry_count(&self) -> usize {
        let state = self.state.read().await;
        state.summaries.len() + state.decisions.len()
    }

    /// Drop everything
    pub async fn clear(&self) {
        *self.state.write().await = WarmSnapshot::default();
    }

    /// Copy of the current contents
    pub async fn snapshot(&self) -> WarmSnapshot {
        self.state.read().await.clone()
    }

    /// Replace the current contents
    pub async fn restore(&self, snapshot: WarmSnapshot) {
        *self.state.write().await = snapshot;
    }

    /// Compress, then write the store as pretty JSON
    pub async fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        self.compress().await;
        let json = serde_json::to_string_pretty(&*self.state.read().await)?;
        tokio::fs::write(path.as_ref(), json).await?;
        tracing::debug!(path = %path.as_ref().display(), "Saved warm memory snapshot");
        Ok(())
    }

    /// Replace the current contents with a JSON snapshot from disk
    pub async fn load_from_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = tokio::fs::read_to_string(path.as_ref()).await?;
        let snapshot: WarmSnapshot = serde_json::from_str(&json)?;
        self.restore(snapshot).await;
        Ok(())
    }
}

impl Default for WarmMemoryStore {
    fn default() -> Self {
        Self::new(WarmConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warm::types::{DecisionOutcome, HypothesisStatus};

    fn summary(content: &str, relevance: f64) -> SemanticSummary {
        SemanticSummary::builder("conv", content)
            .relevance(relevance)
            .build()
    }

    #[tokio::test]
    async fn test_preference_upsert() {
        let store = WarmMemoryStore::default();
        let first = store
            .add_preference(Preference::new("ui", "theme", "dark", 0.6))
            .await;
        let second = store
            .add_preference(Preference::new("ui", "theme", "light", 0.9))
            .await;

        assert_eq!(first, second);
        let prefs = store.preferences().await;
        assert_eq!(prefs.len(), 1);
        assert_eq!(prefs[0].value, serde_json::json!("light"));
        assert_eq!(prefs[0].confidence, 0.9);
    }

    #[tokio::test]
    async fn test_distinct_preference_keys() {
        let store = WarmMemoryStore::default();
        store
            .add_preference(Preference::new("ui", "theme", "dark", 0.6))
            .await;
        store
            .add_preference(Preference::new("ui", "density", "compact", 0.6))
            .await;
        store
            .add_preference(Preference::new("lang", "theme", "x", 0.6))
            .await;
        assert_eq!(store.preferences().await.len(), 3);
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive() {
        let store = WarmMemoryStore::default();
        store.add_summary(summary("Paid the INVOICE for March", 0.5)).await;
        store.add_summary(summary("Weather chat", 0.9)).await;
        store
            .add_summary(
                SemanticSummary::builder("conv", "budget review")
                    .key_points(vec!["invoice totals".into()])
                    .build(),
            )
            .await;
        store
            .add_decision(DecisionRecord::new("conv", "Approve invoice", "close books", ""))
            .await;
        store
            .add_decision(DecisionRecord::new("conv", "Book travel", "Invoice the client", ""))
            .await;
        store
            .add_decision(DecisionRecord::new("conv", "Book travel", "see family", ""))
            .await;

        let (summaries, decisions) = store.search("Invoice").await;
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].content, "Paid the INVOICE for March");
        assert_eq!(decisions.len(), 2);
        assert_eq!(decisions[0].decision, "Approve invoice");
    }

    #[tokio::test]
    async fn test_compress_keeps_most_relevant_summaries() {
        let store = WarmMemoryStore::default();
        for i in 0..101 {
            store
                .add_summary(summary(&format!("s{}", i), (i as f64) / 100.0))
                .await;
        }

        let report = store.compress().await;
        assert_eq!(report.summaries_evicted, 51);

        let kept = store.summaries().await;
        assert_eq!(kept.len(), 50);
        let min_kept = kept
            .iter()
            .map(|s| s.relevance_score)
            .fold(f64::INFINITY, f64::min);
        assert!(min_kept >= 0.51 - f64::EPSILON);
    }

    #[tokio::test]
    async fn test_compress_below_limit_is_noop() {
        let store = WarmMemoryStore::default();
        for i in 0..100 {
            store.add_summary(summary(&format!("s{}", i), 0.1)).await;
        }
        assert!(store.compress().await.is_noop());
        assert_eq!(store.summaries().await.len(), 100);
    }

    #[tokio::test]
    async fn test_compress_keeps_most_recent_decisions() {
        let store = WarmMemoryStore::default();
        let base = Utc::now();
        for i in 0..105 {
            let mut decision = DecisionRecord::new("conv", format!("d{}", i), "", "");
            decision.created_at = base + chrono::Duration::seconds(i);
            store.add_decision(decision).await;
        }

        let report = store.compress().await;
        assert_eq!(report.decisions_evicted, 5);

        let decisions = store.decisions().await;
        assert_eq!(decisions.len(), 100);
        assert!(decisions.iter().all(|d| d.decision != "d0" && d.decision != "d4"));
        assert_eq!(decisions[0].decision, "d5");
        assert_eq!(decisions[99].decision, "d104");
    }

    #[tokio::test]
    async fn test_search_after_compress_keeps_insertion_order() {
        let store = WarmMemoryStore::default();
        let base = Utc::now();
        for i in 0..101 {
            store
                .add_summary(summary(&format!("invoice {}", i), (i as f64) / 100.0))
                .await;
            let mut decision = DecisionRecord::new("conv", format!("invoice {}", i), "", "");
            decision.created_at = base + chrono::Duration::seconds(i);
            store.add_decision(decision).await;
        }

        let report = store.compress().await;
        assert_eq!(report.summaries_evicted, 51);
        assert_eq!(report.decisions_evicted, 1);

        let (summaries, decisions) = store.search("invoice").await;
        let contents: Vec<_> = summaries.iter().map(|s| s.content.as_str()).collect();
        assert_eq!(&contents[..3], &["invoice 51", "invoice 52", "invoice 53"]);
        assert_eq!(contents.last(), Some(&"invoice 100"));

        let texts: Vec<_> = decisions.iter().map(|d| d.decision.as_str()).collect();
        assert_eq!(&texts[..3], &["invoice 1", "invoice 2", "invoice 3"]);
        assert_eq!(texts.last(), Some(&"invoice 100"));
    }

    #[tokio::test]
    async fn test_hypothesis_lifecycle() {
        let store = WarmMemoryStore::default();
        let id = store
            .add_hypothesis(Hypothesis::new("The cache is stale", 0.4))
            .await;

        let revised = store
            .update_hypothesis(
                &id,
                HypothesisUpdate::status(HypothesisStatus::Revised).with_confidence(0.6),
            )
            .await
            .expect("active -> revised is legal");
        assert_eq!(revised.status, HypothesisStatus::Revised);
        assert_eq!(revised.confidence, 0.6);

        store
            .update_hypothesis(&id, HypothesisUpdate::status(HypothesisStatus::Confirmed))
            .await
            .expect("revised -> confirmed is legal");

        let err = store
            .update_hypothesis(
                &id,
                HypothesisUpdate::status(HypothesisStatus::Active).with_confidence(0.1),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FluxError::InvalidTransition { .. }));

        let unchanged = store.hypothesis(&id).await.unwrap();
        assert_eq!(unchanged.status, HypothesisStatus::Confirmed);
        assert_eq!(unchanged.confidence, 0.6);
    }

    #[tokio::test]
    async fn test_update_unknown_hypothesis() {
        let store = WarmMemoryStore::default();
        let err = store
            .update_hypothesis("missing", HypothesisUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FluxError::HypothesisNotFound(_)));
    }

    #[tokio::test]
    async fn test_active_hypotheses_excludes_terminal() {
        let store = WarmMemoryStore::default();
        store.add_hypothesis(Hypothesis::new("open", 0.5)).await;
        let rejected = store.add_hypothesis(Hypothesis::new("wrong", 0.5)).await;
        store
            .update_hypothesis(&rejected, HypothesisUpdate::status(HypothesisStatus::Rejected))
            .await
            .unwrap();

        let active = store.active_hypotheses().await;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].statement, "open");
    }

    #[tokio::test]
    async fn test_recent_decisions_newest_first() {
        let store = WarmMemoryStore::default();
        let base = Utc::now();
        for i in 0..5 {
            let mut decision = DecisionRecord::new("conv", format!("d{}", i), "", "")
                .with_outcome(DecisionOutcome::Pending);
            decision.created_at = base + chrono::Duration::seconds(i);
            store.add_decision(decision).await;
        }

        let recent = store.recent_decisions(3).await;
        let names: Vec<_> = recent.iter().map(|d| d.decision.as_str()).collect();
        assert_eq!(names, vec!["d4", "d3", "d2"]);
    }

    #[tokio::test]
    async fn test_snapshot_file_round_trip() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("warm.json");

        let store = WarmMemoryStore::default();
        store.add_summary(summary("persist me", 0.7)).await;
        store
            .add_preference(Preference::new("ui", "theme", "dark", 0.6))
            .await;
        store.save_to_file(&path).await.expect("save");

        let restored = WarmMemoryStore::default();
        restored.load_from_file(&path).await.expect("load");
        assert_eq!(restored.summaries().await[0].content, "persist me");
        assert_eq!(restored.preferences().await.len(), 1);
        assert_eq!(restored.entry_count().await, 1);
    }
}
