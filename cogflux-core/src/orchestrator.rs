//! Cognitive flux orchestrator
//!
//! Public entry point tying the tiers together. It owns the hot memory
//! manager, the warm store, the cold reference index, the context loader and,
//! once started, the auto-archive monitor.
//!
//! # Example
//!
//! ```rust,no_run
//! use cogflux_core::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let flux = CognitiveFluxOrchestrator::builder()
//!         .config(FluxConfig::default())
//!         .build()?;
//!
//!     flux.initialize("agent-1", "conv-1", 8192).await?;
//!     flux.append_text("agent-1", MessageRole::User, "Reconcile the March invoices").await?;
//!
//!     let context = flux.execute_flux("agent-1", Some("invoice")).await?;
//!     println!("{} summaries loaded", context.summaries.len());
//!
//!     flux.shutdown().await;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use tokio::sync::Mutex;

use crate::archive::{ArchiveOutcome, ArchivePipeline};
use crate::cold::{
    ColdArchiveService, ColdReference, ColdReferenceIndex, HttpColdArchive, InMemoryColdArchive,
};
use crate::config::FluxConfig;
use crate::context::{ContextLoader, LoadedContext};
use crate::error::{FluxError, Result};
use crate::events::{EventPublisher, EventReceiver, event_channel};
use crate::hot::{AppendOutcome, HotMemory, HotMemoryManager, HotMessage, MessageRole};
use crate::metrics::FluxMetrics;
use crate::monitor::{AutoArchiveMonitor, MonitorHandle};
use crate::tokens::{SharedTokenCounter, default_counter};
use crate::warm::{DecisionRecord, SemanticSummary, WarmMemoryStore};

/// Builder for [`CognitiveFluxOrchestrator`]
#[derive(Default)]
pub struct CognitiveFluxOrchestratorBuilder {
    config: Option<FluxConfig>,
    cold_archive: Option<Arc<dyn ColdArchiveService>>,
    token_counter: Option<SharedTokenCounter>,
    warm: Option<Arc<WarmMemoryStore>>,
}

impl CognitiveFluxOrchestratorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration (defaults when unset)
    pub fn config(mut self, config: FluxConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the cold archive service.
    ///
    /// When unset, an HTTP archive is used if `cold.service_url` is
    /// configured, otherwise an in-process archive.
    pub fn cold_archive(mut self, service: Arc<dyn ColdArchiveService>) -> Self {
        self.cold_archive = Some(service);
        self
    }

    /// Set the token counter (heuristic counter when unset)
    pub fn token_counter(mut self, counter: SharedTokenCounter) -> Self {
        self.token_counter = Some(counter);
        self
    }

    /// Start from an existing warm store, e.g. one restored from a snapshot
    pub fn warm_store(mut self, warm: Arc<WarmMemoryStore>) -> Self {
        self.warm = Some(warm);
        self
    }

    /// Wire up the tiers.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the configuration fails validation.
    pub fn build(self) -> Result<CognitiveFluxOrchestrator> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let counter = self.token_counter.unwrap_or_else(default_counter);
        let service: Arc<dyn ColdArchiveService> =
            match (self.cold_archive, &config.cold.service_url) {
                (Some(service), _) => service,
                (None, Some(url)) => Arc::new(HttpColdArchive::new(url.clone())),
                (None, None) => Arc::new(InMemoryColdArchive::new()),
            };

        let warm = self
            .warm
            .unwrap_or_else(|| Arc::new(WarmMemoryStore::new(config.warm.clone())));
        let cold = Arc::new(ColdReferenceIndex::new(service, config.cold.access_timeout));
        let pipeline = Arc::new(ArchivePipeline::new(
            warm.clone(),
            cold.clone(),
            counter.clone(),
            config.archive.clone(),
            &config.hot,
        ));

        let mut manager = HotMemoryManager::new(pipeline, counter.clone());
        let mut events = None;
        if config.monitor.enabled {
            let (tx, rx) = event_channel(config.monitor.buffer_size);
            manager = manager.with_events(EventPublisher::new(tx));
            events = Some(rx);
        }

        let loader = ContextLoader::new(
            warm.clone(),
            cold.clone(),
            counter.clone(),
            config.context.clone(),
        );

        Ok(CognitiveFluxOrchestrator {
            config,
            hot: Arc::new(manager),
            warm,
            cold,
            loader,
            counter,
            events: Mutex::new(events),
            monitor: Mutex::new(None),
        })
    }
}

/// Tri-layer memory manager for agents
pub struct CognitiveFluxOrchestrator {
    config: FluxConfig,
    hot: Arc<HotMemoryManager>,
    warm: Arc<WarmMemoryStore>,
    cold: Arc<ColdReferenceIndex>,
    loader: ContextLoader,
    counter: SharedTokenCounter,
    events: Mutex<Option<EventReceiver>>,
    monitor: Mutex<Option<MonitorHandle>>,
}

impl CognitiveFluxOrchestrator {
    pub fn builder() -> CognitiveFluxOrchestratorBuilder {
        CognitiveFluxOrchestratorBuilder::new()
    }

    pub fn config(&self) -> &FluxConfig {
        &self.config
    }

    pub fn hot(&self) -> &Arc<HotMemoryManager> {
        &self.hot
    }

    pub fn warm(&self) -> &Arc<WarmMemoryStore> {
        &self.warm
    }

    pub fn cold(&self) -> &Arc<ColdReferenceIndex> {
        &self.cold
    }

    pub fn loader(&self) -> &ContextLoader {
        &self.loader
    }

    pub fn token_counter(&self) -> &SharedTokenCounter {
        &self.counter
    }

    /// Create hot memory for an agent with an explicit budget
    pub async fn initialize(
        &self,
        agent_id: &str,
        conversation_id: &str,
        max_tokens: usize,
    ) -> Result<()> {
        self.hot
            .initialize(agent_id, conversation_id, max_tokens)
            .await
    }

    /// Create hot memory for an agent with the configured default budget
    pub async fn initialize_default(&self, agent_id: &str, conversation_id: &str) -> Result<()> {
        self.initialize(agent_id, conversation_id, self.config.hot.default_max_tokens)
            .await
    }

    pub async fn append_message(
        &self,
        agent_id: &str,
        message: HotMessage,
    ) -> Result<AppendOutcome> {
        self.hot.append_message(agent_id, message).await
    }

    pub async fn append_text(
        &self,
        agent_id: &str,
        role: MessageRole,
        content: impl Into<String>,
    ) -> Result<AppendOutcome> {
        self.hot.append_text(agent_id, role, content).await
    }

    /// Load context and inject its summaries into the agent's hot memory.
    ///
    /// When the query matches no summaries, hot memory is left unchanged. The
    /// injected system message follows the normal overflow rule, so it may
    /// archive first.
    ///
    /// # Errors
    ///
    /// `AgentNotFound` for an unknown agent, plus any error of
    /// [`HotMemoryManager::append_message`].
    pub async fn execute_flux(&self, agent_id: &str, query: Option<&str>) -> Result<LoadedContext> {
        if !self.hot.contains(agent_id).await {
            return Err(FluxError::AgentNotFound(agent_id.to_string()));
        }

        let context = self
            .loader
            .load_context(query, self.loader.default_max_summaries())
            .await;

        if context.has_summaries() {
            let outcome = self
                .hot
                .append_text(agent_id, MessageRole::System, context.render_summaries())
                .await?;
            tracing::debug!(
                agent_id = %agent_id,
                summaries = context.summaries.len(),
                token_count = outcome.token_count,
                "Injected warm context into hot memory"
            );
        }

        Ok(context)
    }

    /// Load context without touching hot memory
    pub async fn load_context(
        &self,
        query: Option<&str>,
        max_summaries: Option<usize>,
    ) -> LoadedContext {
        let limit = max_summaries.unwrap_or_else(|| self.loader.default_max_summaries());
        self.loader.load_context(query, limit).await
    }

    pub async fn archive_hot(&self, agent_id: &str) -> Result<ArchiveOutcome> {
        self.hot.archive_hot(agent_id).await
    }

    /// Case-insensitive substring search over warm summaries and decisions
    pub async fn search_warm(&self, query: &str) -> (Vec<SemanticSummary>, Vec<DecisionRecord>) {
        self.warm.search(query).await
    }

    /// Request access to an archived entry.
    ///
    /// Failures surface as `ColdAccess` or `ColdAccessTimeout` and leave hot
    /// and warm memory untouched.
    pub async fn request_cold_access(&self, entry_id: &str, reason: &str) -> Result<ColdReference> {
        self.cold.request_access(entry_id, reason).await
    }

    pub async fn set_active_agent(&self, agent_id: &str) -> Result<()> {
        self.hot.set_active_agent(agent_id).await
    }

    /// Remove an agent's hot memory without archiving it
    pub async fn remove_agent(&self, agent_id: &str) -> Option<HotMemory> {
        self.hot.clear(agent_id).await
    }

    pub async fn metrics(&self) -> FluxMetrics {
        let active = self.hot.active_utilization().await;
        let pipeline = self.hot.pipeline();

        FluxMetrics {
            active_agent: active.as_ref().map(|(agent_id, _)| agent_id.clone()),
            hot_utilization: active.map(|(_, utilization)| utilization),
            resident_agents: self.hot.len().await,
            warm_entry_count: self.warm.entry_count().await,
            cold_reference_count: self.cold.len().await,
            cold_access_count: self.cold.access_count(),
            archive_count: pipeline.archive_count(),
            last_archive_time: pipeline.last_archive_time().await,
        }
    }

    /// Start the auto-archive monitor.
    ///
    /// Returns `false` if the monitor is disabled in configuration or already
    /// running.
    pub async fn start_monitor(&self) -> bool {
        if !self.config.monitor.enabled {
            tracing::debug!("Auto-archive monitor disabled by configuration");
            return false;
        }

        let mut monitor = self.monitor.lock().await;
        if monitor.as_ref().is_some_and(MonitorHandle::is_running) {
            return false;
        }

        let events = self.events.lock().await.take();
        if events.is_none() {
            tracing::debug!("Event stream already consumed; monitor will poll only");
        }
        let handle = AutoArchiveMonitor::new(self.hot.clone(), &self.config.monitor).spawn(events);
        *monitor = Some(handle);
        true
    }

    pub async fn is_monitor_running(&self) -> bool {
        self.monitor
            .lock()
            .await
            .as_ref()
            .is_some_and(MonitorHandle::is_running)
    }

    /// Stop background work
    pub async fn shutdown(&self) {
        let handle = self.monitor.lock().await.take();
        if let Some(handle) = handle {
            handle.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn orchestrator() -> CognitiveFluxOrchestrator {
        CognitiveFluxOrchestrator::builder()
            .config(FluxConfig::default().with_archive_retry_delay(Duration::from_millis(1)))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_execute_flux_unknown_agent() {
        let flux = orchestrator();
        let err = flux.execute_flux("ghost", Some("x")).await.unwrap_err();
        assert!(matches!(err, FluxError::AgentNotFound(_)));
    }

    #[tokio::test]
    async fn test_execute_flux_injects_summaries() {
        let flux = orchestrator();
        flux.initialize("a", "conv", 4096).await.unwrap();
        flux.warm()
            .add_summary(SemanticSummary::builder("old", "Paid invoice 42").build())
            .await;

        let context = flux.execute_flux("a", Some("invoice")).await.unwrap();
        assert_eq!(context.summaries.len(), 1);

        let hot = flux.hot().snapshot("a").await.unwrap();
        assert_eq!(hot.messages.len(), 1);
        assert!(hot.messages[0].is_system());
        assert!(hot.messages[0].content.contains("Paid invoice 42"));
    }

    #[tokio::test]
    async fn test_execute_flux_without_matches_leaves_hot_alone() {
        let flux = orchestrator();
        flux.initialize("a", "conv", 4096).await.unwrap();
        let context = flux.execute_flux("a", Some("nothing")).await.unwrap();
        assert!(context.summaries.is_empty());
        assert!(flux.hot().snapshot("a").await.unwrap().messages.is_empty());
    }

    #[tokio::test]
    async fn test_initialize_default_uses_config_budget() {
        let flux = CognitiveFluxOrchestrator::builder()
            .config(FluxConfig::default().with_default_max_tokens(2048))
            .build()
            .unwrap();
        flux.initialize_default("a", "conv").await.unwrap();
        assert_eq!(flux.hot().snapshot("a").await.unwrap().max_tokens, 2048);
    }

    #[tokio::test]
    async fn test_metrics() {
        let flux = orchestrator();
        flux.initialize("a", "conv", 1000).await.unwrap();
        flux.set_active_agent("a").await.unwrap();
        flux.append_message("a", HotMessage::user("x", 250)).await.unwrap();
        flux.archive_hot("a").await.unwrap();

        let metrics = flux.metrics().await;
        assert_eq!(metrics.active_agent.as_deref(), Some("a"));
        assert_eq!(metrics.resident_agents, 1);
        assert_eq!(metrics.archive_count, 1);
        assert_eq!(metrics.warm_entry_count, 1);
        assert_eq!(metrics.cold_reference_count, 1);
        assert!(metrics.last_archive_time.is_some());
        assert!(metrics.hot_utilization.unwrap() < 0.1);
    }

    #[tokio::test]
    async fn test_monitor_lifecycle() {
        let flux = orchestrator();
        assert!(flux.start_monitor().await);
        assert!(!flux.start_monitor().await);
        assert!(flux.is_monitor_running().await);
        flux.shutdown().await;
        assert!(!flux.is_monitor_running().await);
    }

    #[tokio::test]
    async fn test_monitor_disabled() {
        let flux = CognitiveFluxOrchestrator::builder()
            .config(FluxConfig::default().with_monitor(false))
            .build()
            .unwrap();
        assert!(!flux.start_monitor().await);
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let mut config = FluxConfig::default();
        config.monitor.buffer_size = 0;
        let result = CognitiveFluxOrchestrator::builder().config(config).build();
        assert!(matches!(result, Err(FluxError::Configuration(_))));
    }
}
