//! Warm memory data model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Overall tone of a summarized conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    #[default]
    Neutral,
    Negative,
}

/// Compressed summary of an archived conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticSummary {
    pub id: String,
    pub conversation_id: String,
    pub content: String,
    pub key_points: Vec<String>,
    pub entities: Vec<String>,
    pub sentiment: Sentiment,
    /// Retention/selection priority (0.0-1.0)
    pub relevance_score: f64,
    pub created_at: DateTime<Utc>,
}

impl SemanticSummary {
    pub fn builder(
        conversation_id: impl Into<String>,
        content: impl Into<String>,
    ) -> SummaryBuilder {
        SummaryBuilder::new(conversation_id, content)
    }

    /// Case-insensitive match on content and key points; `needle` must be lowercase
    pub(crate) fn matches(&self, needle: &str) -> bool {
        self.content.to_lowercase().contains(needle)
            || self
                .key_points
                .iter()
                .any(|p| p.to_lowercase().contains(needle))
    }
}

/// Builder for [`SemanticSummary`]
#[derive(Debug, Clone)]
pub struct SummaryBuilder {
    conversation_id: String,
    content: String,
    key_points: Vec<String>,
    entities: Vec<String>,
    sentiment: Sentiment,
    relevance_score: f64,
}

impl SummaryBuilder {
    fn new(conversation_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            content: content.into(),
            key_points: Vec::new(),
            entities: Vec::new(),
            sentiment: Sentiment::Neutral,
            relevance_score: 0.5,
        }
    }

    pub fn key_points(mut self, key_points: Vec<String>) -> Self {
        self.key_points = key_points;
        self
    }

    pub fn entities(mut self, entities: Vec<String>) -> Self {
        self.entities = entities;
        self
    }

    pub fn sentiment(mut self, sentiment: Sentiment) -> Self {
        self.sentiment = sentiment;
        self
    }

    /// Relevance, clamped to 0.0-1.0
    pub fn relevance(mut self, score: f64) -> Self {
        self.relevance_score = score.clamp(0.0, 1.0);
        self
    }

    /// Assign an id and timestamp
    pub fn build(self) -> SemanticSummary {
        SemanticSummary {
            id: Uuid::new_v4().to_string(),
            conversation_id: self.conversation_id,
            content: self.content,
            key_points: self.key_points,
            entities: self.entities,
            sentiment: self.sentiment,
            relevance_score: self.relevance_score,
            created_at: Utc::now(),
        }
    }
}

/// Result of a decision once known
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionOutcome {
    Success,
    Failure,
    Pending,
}

/// A decision the agent took, with the intention behind it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub id: String,
    pub conversation_id: String,
    pub decision: String,
    pub intention: String,
    pub context_snapshot: String,
    pub outcome: Option<DecisionOutcome>,
    pub created_at: DateTime<Utc>,
}

impl DecisionRecord {
    pub fn new(
        conversation_id: impl Into<String>,
        decision: impl Into<String>,
        intention: impl Into<String>,
        context_snapshot: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.into(),
            decision: decision.into(),
            intention: intention.into(),
            context_snapshot: context_snapshot.into(),
            outcome: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_outcome(mut self, outcome: DecisionOutcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    /// `needle` must be lowercase
    pub(crate) fn matches(&self, needle: &str) -> bool {
        self.decision.to_lowercase().contains(needle)
            || self.intention.to_lowercase().contains(needle)
    }
}

/// Lifecycle of a hypothesis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HypothesisStatus {
    #[default]
    Active,
    Confirmed,
    Rejected,
    Revised,
}

impl HypothesisStatus {
    /// Confirmed and rejected hypotheses never change again
    pub fn is_terminal(&self) -> bool {
        matches!(self, HypothesisStatus::Confirmed | HypothesisStatus::Rejected)
    }

    /// Still under evaluation. Revised hypotheses re-enter evaluation.
    pub fn is_open(&self) -> bool {
        !self.is_terminal()
    }

    /// Legal transitions:
    /// active -> confirmed | rejected | revised,
    /// revised -> active | confirmed | rejected | revised,
    /// any status -> itself.
    pub fn can_transition_to(&self, next: HypothesisStatus) -> bool {
        if *self == next {
            return true;
        }
        match self {
            HypothesisStatus::Active => next != HypothesisStatus::Active,
            HypothesisStatus::Revised => true,
            HypothesisStatus::Confirmed | HypothesisStatus::Rejected => false,
        }
    }
}

impl fmt::Display for HypothesisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HypothesisStatus::Active => "active",
            HypothesisStatus::Confirmed => "confirmed",
            HypothesisStatus::Rejected => "rejected",
            HypothesisStatus::Revised => "revised",
        };
        f.write_str(s)
    }
}

/// A belief the agent is testing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hypothesis {
    pub id: String,
    pub statement: String,
    /// 0.0-1.0
    pub confidence: f64,
    pub supporting_evidence: Vec<String>,
    pub contradicting_evidence: Vec<String>,
    pub status: HypothesisStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Hypothesis {
    pub fn new(statement: impl Into<String>, confidence: f64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            statement: statement.into(),
            confidence: confidence.clamp(0.0, 1.0),
            supporting_evidence: Vec::new(),
            contradicting_evidence: Vec::new(),
            status: HypothesisStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update for a hypothesis; `None` fields are left unchanged
#[derive(Debug, Clone, Default)]
pub struct HypothesisUpdate {
    pub statement: Option<String>,
    pub confidence: Option<f64>,
    pub supporting_evidence: Option<Vec<String>>,
    pub contradicting_evidence: Option<Vec<String>>,
    pub status: Option<HypothesisStatus>,
}

impl HypothesisUpdate {
    pub fn status(status: HypothesisStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_statement(mut self, statement: impl Into<String>) -> Self {
        self.statement = Some(statement.into());
        self
    }

    pub fn with_supporting_evidence(mut self, evidence: Vec<String>) -> Self {
        self.supporting_evidence = Some(evidence);
        self
    }

    pub fn with_contradicting_evidence(mut self, evidence: Vec<String>) -> Self {
        self.contradicting_evidence = Some(evidence);
        self
    }
}

/// A learned preference, unique per (category, key)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preference {
    pub id: String,
    pub category: String,
    pub key: String,
    pub value: serde_json::Value,
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
}

impl Preference {
    pub fn new(
        category: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
        confidence: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            category: category.into(),
            key: key.into(),
            value: value.into(),
            confidence: confidence.clamp(0.0, 1.0),
            created_at: Utc::now(),
        }
    }
}
