//! Hot memory manager
//!
//! Owns one [`HotMemory`] per agent. Each agent's memory sits behind its own
//! async mutex: appends, archives and field updates for one agent are
//! serialized, while different agents never contend.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::archive::{ArchiveOutcome, ArchivePipeline, ArchiveReport};
use crate::error::{FluxError, Result};
use crate::events::{EventPublisher, FluxEvent};
use crate::tokens::SharedTokenCounter;

use super::types::{HotMemory, HotMessage, MessageRole, ReasoningState, ordered_set};

type AgentSlot = Arc<Mutex<HotMemory>>;

/// Result of a successful append
#[derive(Debug, Clone)]
pub struct AppendOutcome {
    pub token_count: usize,
    pub max_tokens: usize,
    pub utilization: f64,
    /// Set when the append had to archive first to make room
    pub archive: Option<ArchiveReport>,
}

/// Per-agent, token-budgeted active context
pub struct HotMemoryManager {
    agents: RwLock<HashMap<String, AgentSlot>>,
    active_agent: RwLock<Option<String>>,
    pipeline: Arc<ArchivePipeline>,
    counter: SharedTokenCounter,
    events: EventPublisher,
}

impl HotMemoryManager {
    pub fn new(pipeline: Arc<ArchivePipeline>, counter: SharedTokenCounter) -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
            active_agent: RwLock::new(None),
            pipeline,
            counter,
            events: EventPublisher::disabled(),
        }
    }

    /// Publish utilization and archive events through `events`
    pub fn with_events(mut self, events: EventPublisher) -> Self {
        self.events = events;
        self
    }

    pub fn pipeline(&self) -> &Arc<ArchivePipeline> {
        &self.pipeline
    }

    pub fn token_counter(&self) -> &SharedTokenCounter {
        &self.counter
    }

    async fn slot(&self, agent_id: &str) -> Result<AgentSlot> {
        self.agents
            .read()
            .await
            .get(agent_id)
            .cloned()
            .ok_or_else(|| FluxError::AgentNotFound(agent_id.to_string()))
    }

    /// Create a fresh hot memory for `agent_id`.
    ///
    /// Replaces any existing one. Un-archived content in the replaced memory
    /// is lost; archive first if it matters.
    pub async fn initialize(
        &self,
        agent_id: &str,
        conversation_id: &str,
        max_tokens: usize,
    ) -> Result<()> {
        let marker_tokens = self.pipeline.marker_tokens();
        if max_tokens <= marker_tokens {
            return Err(FluxError::Validation(format!(
                "max_tokens ({}) must exceed the archive marker size ({})",
                max_tokens, marker_tokens
            )));
        }

        let hot = HotMemory::new(agent_id, conversation_id, max_tokens);
        let previous = self
            .agents
            .write()
            .await
            .insert(agent_id.to_string(), Arc::new(Mutex::new(hot)));

        if let Some(previous) = previous {
            let previous = previous.lock().await;
            if previous.has_unarchived_content() {
                tracing::warn!(
                    agent_id = %agent_id,
                    discarded_messages = previous.unarchived_messages,
                    "Re-initialized hot memory with un-archived content"
                );
            }
        }

        tracing::debug!(
            agent_id = %agent_id,
            conversation_id = %conversation_id,
            max_tokens,
            "Initialized hot memory"
        );
        Ok(())
    }

    /// Append a message, archiving first when it would overflow the budget.
    ///
    /// # Errors
    ///
    /// - `AgentNotFound` if the agent has no hot memory
    /// - `CapacityExceeded` if the message can't fit even into a freshly
    ///   archived memory (nothing is archived in that case)
    /// - `ArchiveFailure` if the archive fails; the message is not appended and
    ///   the existing memory is untouched
    pub async fn append_message(
        &self,
        agent_id: &str,
        message: HotMessage,
    ) -> Result<AppendOutcome> {
        let slot = self.slot(agent_id).await?;
        let mut hot = slot.lock().await;

        let mut archive = None;
        if !hot.fits(message.token_count) {
            let required = self.pipeline.marker_tokens() + message.token_count;
            if required > hot.max_tokens {
                return Err(FluxError::CapacityExceeded {
                    agent_id: agent_id.to_string(),
                    required,
                    max_tokens: hot.max_tokens,
                });
            }

            tracing::debug!(
                agent_id = %agent_id,
                token_count = hot.token_count,
                incoming = message.token_count,
                max_tokens = hot.max_tokens,
                "Hot memory would overflow; archiving before append"
            );
            let outcome = self.pipeline.archive(&mut hot).await?;
            if let ArchiveOutcome::Archived(report) = outcome {
                self.publish_archived(&report);
                archive = Some(report);
            }

            if !hot.fits(message.token_count) {
                return Err(FluxError::CapacityExceeded {
                    agent_id: agent_id.to_string(),
                    required: hot.token_count + message.token_count,
                    max_tokens: hot.max_tokens,
                });
            }
        }

        hot.push(message);
        self.publish_utilization(&hot);

        Ok(AppendOutcome {
            token_count: hot.token_count,
            max_tokens: hot.max_tokens,
            utilization: hot.utilization(),
            archive,
        })
    }

    /// Append text, counting its tokens with the manager's counter
    pub async fn append_text(
        &self,
        agent_id: &str,
        role: MessageRole,
        content: impl Into<String>,
    ) -> Result<AppendOutcome> {
        let message = HotMessage::counted(role, content, self.counter.as_ref());
        self.append_message(agent_id, message).await
    }

    /// Mutate the agent's reasoning state in place
    pub async fn update_reasoning_state<F>(&self, agent_id: &str, update: F) -> Result<()>
    where
        F: FnOnce(&mut ReasoningState),
    {
        let slot = self.slot(agent_id).await?;
        let mut hot = slot.lock().await;
        update(&mut hot.reasoning_state);
        hot.reasoning_state.confidence = hot.reasoning_state.confidence.clamp(0.0, 1.0);
        hot.last_activity = Utc::now();
        Ok(())
    }

    /// Replace the agent's objectives (duplicates dropped, order kept)
    pub async fn set_objectives(&self, agent_id: &str, objectives: Vec<String>) -> Result<()> {
        let slot = self.slot(agent_id).await?;
        let mut hot = slot.lock().await;
        hot.objectives = ordered_set(objectives);
        hot.last_activity = Utc::now();
        Ok(())
    }

    /// Replace the agent's constraints (duplicates dropped, order kept)
    pub async fn set_constraints(&self, agent_id: &str, constraints: Vec<String>) -> Result<()> {
        let slot = self.slot(agent_id).await?;
        let mut hot = slot.lock().await;
        hot.constraints = ordered_set(constraints);
        hot.last_activity = Utc::now();
        Ok(())
    }

    /// Archive the agent's hot memory now.
    ///
    /// Resolves to `AlreadyArchived` if nothing was appended since the last
    /// archive, so racing triggers never duplicate warm or cold entries.
    pub async fn archive_hot(&self, agent_id: &str) -> Result<ArchiveOutcome> {
        let slot = self.slot(agent_id).await?;
        let mut hot = slot.lock().await;
        let outcome = self.pipeline.archive(&mut hot).await?;
        if let ArchiveOutcome::Archived(report) = &outcome {
            self.publish_archived(report);
            self.publish_utilization(&hot);
        }
        Ok(outcome)
    }

    /// Archive only if utilization is still at or above `threshold` once the
    /// agent's lock is held
    pub async fn archive_if_above(&self, agent_id: &str, threshold: f64) -> Result<ArchiveOutcome> {
        let slot = self.slot(agent_id).await?;
        let mut hot = slot.lock().await;
        if hot.utilization() < threshold {
            return Ok(ArchiveOutcome::NotNeeded);
        }
        let outcome = self.pipeline.archive(&mut hot).await?;
        if let ArchiveOutcome::Archived(report) = &outcome {
            self.publish_archived(report);
            self.publish_utilization(&hot);
        }
        Ok(outcome)
    }

    /// Remove the agent's hot memory, returning it if it existed
    pub async fn clear(&self, agent_id: &str) -> Option<HotMemory> {
        let removed = self.agents.write().await.remove(agent_id);

        let mut active = self.active_agent.write().await;
        if active.as_deref() == Some(agent_id) {
            *active = None;
        }
        drop(active);

        match removed {
            Some(slot) => Some(slot.lock().await.clone()),
            None => None,
        }
    }

    /// Mark `agent_id` as the focused agent
    pub async fn set_active_agent(&self, agent_id: &str) -> Result<()> {
        if !self.contains(agent_id).await {
            return Err(FluxError::AgentNotFound(agent_id.to_string()));
        }
        *self.active_agent.write().await = Some(agent_id.to_string());
        Ok(())
    }

    pub async fn clear_active_agent(&self) {
        *self.active_agent.write().await = None;
    }

    pub async fn active_agent(&self) -> Option<String> {
        self.active_agent.read().await.clone()
    }

    /// Utilization of the focused agent, if any
    pub async fn active_utilization(&self) -> Option<(String, f64)> {
        let agent_id = self.active_agent().await?;
        let utilization = self.utilization(&agent_id).await.ok()?;
        Some((agent_id, utilization))
    }

    pub async fn contains(&self, agent_id: &str) -> bool {
        self.agents.read().await.contains_key(agent_id)
    }

    /// Copy of the agent's hot memory
    pub async fn snapshot(&self, agent_id: &str) -> Result<HotMemory> {
        let slot = self.slot(agent_id).await?;
        let hot = slot.lock().await;
        Ok(hot.clone())
    }

    pub async fn utilization(&self, agent_id: &str) -> Result<f64> {
        let slot = self.slot(agent_id).await?;
        let hot = slot.lock().await;
        Ok(hot.utilization())
    }

    pub async fn agent_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.agents.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn len(&self) -> usize {
        self.agents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.agents.read().await.is_empty()
    }

    fn publish_utilization(&self, hot: &HotMemory) {
        self.events.publish(FluxEvent::Utilization {
            agent_id: hot.agent_id.clone(),
            token_count: hot.token_count,
            max_tokens: hot.max_tokens,
            utilization: hot.utilization(),
            timestamp: Utc::now(),
        });
    }

    fn publish_archived(&self, report: &ArchiveReport) {
        self.events.publish(FluxEvent::Archived {
            agent_id: report.agent_id.clone(),
            summary_id: report.summary_id.clone(),
            entry_id: report.entry_id.clone(),
            timestamp: report.archived_at,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cold::{ColdReferenceIndex, InMemoryColdArchive};
    use crate::config::{ArchiveConfig, HotConfig, WarmConfig};
    use crate::events::event_channel;
    use crate::tokens::default_counter;
    use crate::warm::WarmMemoryStore;
    use std::time::Duration;

    struct Fixture {
        archive: Arc<InMemoryColdArchive>,
        warm: Arc<WarmMemoryStore>,
        cold: Arc<ColdReferenceIndex>,
        manager: HotMemoryManager,
    }

    fn fixture() -> Fixture {
        let archive = Arc::new(InMemoryColdArchive::new());
        let warm = Arc::new(WarmMemoryStore::new(WarmConfig::default()));
        let cold = Arc::new(ColdReferenceIndex::new(
            archive.clone(),
            Duration::from_secs(1),
        ));
        let pipeline = Arc::new(ArchivePipeline::new(
            warm.clone(),
            cold.clone(),
            default_counter(),
            ArchiveConfig {
                retry_delay: Duration::from_millis(1),
                ..Default::default()
            },
            &HotConfig::default(),
        ));
        Fixture {
            archive,
            warm,
            cold,
            manager: HotMemoryManager::new(pipeline, default_counter()),
        }
    }

    #[tokio::test]
    async fn test_append_within_budget() {
        let fx = fixture();
        fx.manager.initialize("a", "conv", 1000).await.unwrap();

        let outcome = fx
            .manager
            .append_message("a", HotMessage::user("hi", 400))
            .await
            .unwrap();
        assert_eq!(outcome.token_count, 400);
        assert_eq!(outcome.utilization, 0.4);
        assert!(outcome.archive.is_none());
    }

    #[tokio::test]
    async fn test_overflow_archives_then_appends() {
        let fx = fixture();
        fx.manager.initialize("a", "conv", 5000).await.unwrap();

        for _ in 0..2 {
            fx.manager
                .append_message("a", HotMessage::user("x", 2000))
                .await
                .unwrap();
        }
        let outcome = fx
            .manager
            .append_message("a", HotMessage::user("third", 2000))
            .await
            .unwrap();

        assert!(outcome.archive.is_some());
        let marker = fx.manager.pipeline().marker_tokens();
        assert_eq!(outcome.token_count, marker + 2000);

        let hot = fx.manager.snapshot("a").await.unwrap();
        assert_eq!(hot.messages.len(), 2);
        assert_eq!(hot.messages[1].content, "third");
        assert_eq!(fx.warm.summaries().await.len(), 1);
        assert_eq!(fx.cold.len().await, 1);
    }

    #[tokio::test]
    async fn test_oversized_message_rejected_without_archiving() {
        let fx = fixture();
        fx.manager.initialize("a", "conv", 1000).await.unwrap();
        fx.manager
            .append_message("a", HotMessage::user("x", 500))
            .await
            .unwrap();

        let err = fx
            .manager
            .append_message("a", HotMessage::user("huge", 1000))
            .await
            .unwrap_err();
        assert!(matches!(err, FluxError::CapacityExceeded { .. }));

        let hot = fx.manager.snapshot("a").await.unwrap();
        assert_eq!(hot.token_count, 500);
        assert_eq!(fx.warm.entry_count().await, 0);
    }

    #[tokio::test]
    async fn test_archive_failure_keeps_message_out_and_memory_intact() {
        let fx = fixture();
        fx.manager.initialize("a", "conv", 1000).await.unwrap();
        fx.manager
            .append_message("a", HotMessage::user("keep me", 800))
            .await
            .unwrap();

        fx.archive.fail_next(2);
        let err = fx
            .manager
            .append_message("a", HotMessage::user("overflow", 400))
            .await
            .unwrap_err();
        assert!(matches!(err, FluxError::ArchiveFailure { .. }));

        let hot = fx.manager.snapshot("a").await.unwrap();
        assert_eq!(hot.token_count, 800);
        assert_eq!(hot.messages.len(), 1);
        assert_eq!(hot.messages[0].content, "keep me");

        // Service recovered: the same append now succeeds
        let outcome = fx
            .manager
            .append_message("a", HotMessage::user("overflow", 400))
            .await
            .unwrap();
        assert!(outcome.archive.is_some());
    }

    #[tokio::test]
    async fn test_unknown_agent() {
        let fx = fixture();
        let err = fx
            .manager
            .append_message("ghost", HotMessage::user("hi", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, FluxError::AgentNotFound(_)));
        assert!(fx.manager.set_objectives("ghost", vec![]).await.is_err());
        assert!(fx.manager.set_active_agent("ghost").await.is_err());
        assert!(fx
            .manager
            .update_reasoning_state("ghost", |_| {})
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_initialize_validates_budget() {
        let fx = fixture();
        let marker = fx.manager.pipeline().marker_tokens();
        assert!(fx.manager.initialize("a", "conv", marker).await.is_err());
        assert!(fx.manager.initialize("a", "conv", marker + 1).await.is_ok());
    }

    #[tokio::test]
    async fn test_initialize_overwrites() {
        let fx = fixture();
        fx.manager.initialize("a", "conv-1", 1000).await.unwrap();
        fx.manager
            .append_message("a", HotMessage::user("old", 10))
            .await
            .unwrap();

        fx.manager.initialize("a", "conv-2", 2000).await.unwrap();
        let hot = fx.manager.snapshot("a").await.unwrap();
        assert_eq!(hot.conversation_id, "conv-2");
        assert!(hot.messages.is_empty());
        assert_eq!(fx.manager.len().await, 1);
    }

    #[tokio::test]
    async fn test_field_mutations() {
        let fx = fixture();
        fx.manager.initialize("a", "conv", 1000).await.unwrap();

        fx.manager
            .set_objectives("a", vec!["ship".into(), "test".into(), "ship".into()])
            .await
            .unwrap();
        fx.manager
            .set_constraints("a", vec!["no prod access".into()])
            .await
            .unwrap();
        fx.manager
            .update_reasoning_state("a", |state| {
                state.current_task = Some("triage".into());
                state.confidence = 1.4;
            })
            .await
            .unwrap();

        let hot = fx.manager.snapshot("a").await.unwrap();
        assert_eq!(hot.objectives, vec!["ship".to_string(), "test".to_string()]);
        assert_eq!(hot.constraints.len(), 1);
        assert_eq!(hot.reasoning_state.current_task.as_deref(), Some("triage"));
        assert_eq!(hot.reasoning_state.confidence, 1.0);
    }

    #[tokio::test]
    async fn test_active_agent_bookkeeping() {
        let fx = fixture();
        fx.manager.initialize("a", "conv", 1000).await.unwrap();
        fx.manager.initialize("b", "conv", 1000).await.unwrap();

        fx.manager.set_active_agent("b").await.unwrap();
        assert_eq!(fx.manager.active_agent().await.as_deref(), Some("b"));

        let removed = fx.manager.clear("b").await;
        assert!(removed.is_some());
        assert!(fx.manager.active_agent().await.is_none());
        assert_eq!(fx.manager.agent_ids().await, vec!["a".to_string()]);
        assert!(fx.manager.clear("b").await.is_none());
    }

    #[tokio::test]
    async fn test_archive_if_above_rechecks_under_lock() {
        let fx = fixture();
        fx.manager.initialize("a", "conv", 1000).await.unwrap();
        fx.manager
            .append_message("a", HotMessage::user("x", 950))
            .await
            .unwrap();

        let first = fx.manager.archive_if_above("a", 0.9).await.unwrap();
        assert!(first.is_archived());
        let second = fx.manager.archive_if_above("a", 0.9).await.unwrap();
        assert!(matches!(second, ArchiveOutcome::NotNeeded));
        let explicit = fx.manager.archive_hot("a").await.unwrap();
        assert!(matches!(explicit, ArchiveOutcome::AlreadyArchived));

        assert_eq!(fx.warm.summaries().await.len(), 1);
    }

    #[tokio::test]
    async fn test_events_published() {
        let (tx, mut rx) = event_channel(16);
        let mut fx = fixture();
        fx.manager = fx.manager.with_events(EventPublisher::new(tx));

        fx.manager.initialize("a", "conv", 1000).await.unwrap();
        fx.manager
            .append_text("a", MessageRole::User, "x".repeat(400))
            .await
            .unwrap();

        match rx.recv().await.unwrap() {
            FluxEvent::Utilization {
                token_count,
                utilization,
                ..
            } => {
                assert_eq!(token_count, 100);
                assert_eq!(utilization, 0.1);
            }
            other => panic!("unexpected event: {:?}", other),
        }

        fx.manager.archive_hot("a").await.unwrap();
        assert!(matches!(rx.recv().await.unwrap(), FluxEvent::Archived { .. }));
    }
}
