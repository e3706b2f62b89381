//! Archive pipeline: hot memory -> warm summary + cold reference -> reset

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

use crate::cold::{ArchiveEntry, ArchiveReceipt, ColdEntryType, ColdReference, ColdReferenceIndex};
use crate::config::{ArchiveConfig, HotConfig};
use crate::error::{FluxError, Result};
use crate::hot::{HotMemory, HotMessage};
use crate::tokens::SharedTokenCounter;
use crate::warm::{SemanticSummary, Sentiment, WarmMemoryStore};

use super::retry::{RetryPolicy, with_retry};

/// What an archive run produced
#[derive(Debug, Clone)]
pub struct ArchiveReport {
    pub agent_id: String,
    pub conversation_id: String,
    /// Warm summary written by the run; `None` when hot memory held only
    /// system messages, which go to cold storage alone
    pub summary_id: Option<String>,
    pub entry_id: String,
    pub messages_archived: usize,
    pub tokens_before: usize,
    pub tokens_after: usize,
    pub archived_at: DateTime<Utc>,
}

/// Result of an archive trigger
#[derive(Debug, Clone)]
pub enum ArchiveOutcome {
    /// Hot memory was flushed to warm + cold and reset
    Archived(ArchiveReport),
    /// Nothing was appended since the last archive; the trigger was a no-op
    AlreadyArchived,
    /// Utilization was below the proactive threshold once the lock was held
    NotNeeded,
}

impl ArchiveOutcome {
    pub fn is_archived(&self) -> bool {
        matches!(self, ArchiveOutcome::Archived(_))
    }

    pub fn report(&self) -> Option<&ArchiveReport> {
        match self {
            ArchiveOutcome::Archived(report) => Some(report),
            ArchiveOutcome::AlreadyArchived | ArchiveOutcome::NotNeeded => None,
        }
    }
}

/// Flushes a hot memory into warm and cold storage.
///
/// The run is all-or-nothing: the cold write happens first (with retry), then
/// the summary and reference are committed, and only then is hot memory reset.
/// Callers hold the agent's lock for the whole run.
pub struct ArchivePipeline {
    warm: Arc<WarmMemoryStore>,
    cold: Arc<ColdReferenceIndex>,
    counter: SharedTokenCounter,
    config: ArchiveConfig,
    marker_text: String,
    archive_count: AtomicU64,
    last_archive: RwLock<Option<DateTime<Utc>>>,
}

impl ArchivePipeline {
    pub fn new(
        warm: Arc<WarmMemoryStore>,
        cold: Arc<ColdReferenceIndex>,
        counter: SharedTokenCounter,
        config: ArchiveConfig,
        hot_config: &HotConfig,
    ) -> Self {
        Self {
            warm,
            cold,
            counter,
            config,
            marker_text: hot_config.archive_marker.clone(),
            archive_count: AtomicU64::new(0),
            last_archive: RwLock::new(None),
        }
    }

    /// The system message left in hot memory after an archive
    pub fn marker_message(&self) -> HotMessage {
        HotMessage::counted(
            crate::hot::MessageRole::System,
            self.marker_text.clone(),
            self.counter.as_ref(),
        )
    }

    /// Token cost of the marker message
    pub fn marker_tokens(&self) -> usize {
        self.counter.count(&self.marker_text)
    }

    /// Archive `hot` in place.
    ///
    /// # Errors
    ///
    /// `ArchiveFailure` if the cold write fails after all attempts. Hot memory,
    /// warm memory and the cold index are unchanged in that case.
    pub async fn archive(&self, hot: &mut HotMemory) -> Result<ArchiveOutcome> {
        if !hot.has_unarchived_content() {
            tracing::debug!(agent_id = %hot.agent_id, "Nothing to archive; skipping");
            return Ok(ArchiveOutcome::AlreadyArchived);
        }

        let tokens_before = hot.token_count;
        let messages_archived = hot.messages.len();

        // 1. Summary (not committed yet), skipped when there is no conversation
        let summary = self.build_summary(hot);

        // 2. Full-fidelity cold entry
        let entry = ArchiveEntry::capture(hot);
        let receipt = self.write_cold(&entry).await.map_err(|e| {
            tracing::warn!(agent_id = %hot.agent_id, error = %e, "Archive failed; hot memory kept");
            FluxError::ArchiveFailure {
                agent_id: hot.agent_id.clone(),
                reason: e.to_string(),
            }
        })?;
        let reference = self.build_reference(hot, summary.as_ref(), &receipt, messages_archived);

        // 3. Commit, then reset
        let summary_id = match summary {
            Some(summary) => {
                let id = self.warm.add_summary(summary).await;
                self.warm.compress().await;
                Some(id)
            }
            None => None,
        };
        self.cold.add_reference(reference).await;
        hot.reset_to_marker(self.marker_message(), &receipt.entry_id);

        let archived_at = Utc::now();
        self.archive_count.fetch_add(1, Ordering::Relaxed);
        *self.last_archive.write().await = Some(archived_at);

        tracing::info!(
            agent_id = %hot.agent_id,
            conversation_id = %hot.conversation_id,
            summary_id = ?summary_id,
            entry_id = %receipt.entry_id,
            tokens_before,
            tokens_after = hot.token_count,
            "Archived hot memory"
        );

        Ok(ArchiveOutcome::Archived(ArchiveReport {
            agent_id: hot.agent_id.clone(),
            conversation_id: hot.conversation_id.clone(),
            summary_id,
            entry_id: receipt.entry_id,
            messages_archived,
            tokens_before,
            tokens_after: hot.token_count,
            archived_at,
        }))
    }

    /// Completed archives since creation
    pub fn archive_count(&self) -> u64 {
        self.archive_count.load(Ordering::Relaxed)
    }

    pub async fn last_archive_time(&self) -> Option<DateTime<Utc>> {
        *self.last_archive.read().await
    }

    async fn write_cold(&self, entry: &ArchiveEntry) -> Result<ArchiveReceipt> {
        let policy = RetryPolicy::from_config(&self.config);
        let timeout = self.cold.access_timeout();
        let service = self.cold.service();

        with_retry(&policy, || async move {
            match tokio::time::timeout(timeout, service.archive(entry)).await {
                Ok(result) => result,
                Err(_) => Err(FluxError::ColdAccessTimeout(timeout)),
            }
        })
        .await
    }

    fn build_summary(&self, hot: &HotMemory) -> Option<SemanticSummary> {
        let lines = hot
            .conversation_messages()
            .map(|m| {
                let text = excerpt(&m.content, self.config.excerpt_chars);
                format!("{}: {}", m.role.as_str(), text)
            })
            .collect::<Vec<_>>();
        if lines.is_empty() {
            return None;
        }

        let summary = SemanticSummary::builder(hot.conversation_id.clone(), lines.join("\n"))
            .key_points(hot.objectives.clone())
            .sentiment(Sentiment::Neutral)
            .relevance(self.config.default_relevance)
            .build();
        Some(summary)
    }

    fn build_reference(
        &self,
        hot: &HotMemory,
        summary: Option<&SemanticSummary>,
        receipt: &ArchiveReceipt,
        messages: usize,
    ) -> ColdReference {
        let ttl = ChronoDuration::from_std(self.config.cold_ttl)
            .unwrap_or_else(|_| ChronoDuration::days(365));

        ColdReference {
            entry_id: receipt.entry_id.clone(),
            entry_type: ColdEntryType::Conversation,
            summary: match summary {
                Some(summary) => format!(
                    "{} messages from conversation {}: {}",
                    messages,
                    hot.conversation_id,
                    excerpt(&summary.content, 160)
                ),
                None => format!(
                    "{} system messages from conversation {}",
                    messages, hot.conversation_id
                ),
            },
            relevance_score: 1.0,
            access_url: receipt.access_url.clone(),
            expires_at: Utc::now() + ttl,
        }
    }
}

/// First `max_chars` characters of `text`, with an ellipsis when cut
fn excerpt(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cold::InMemoryColdArchive;
    use crate::config::WarmConfig;
    use crate::tokens::default_counter;
    use std::time::Duration;

    struct Fixture {
        archive: Arc<InMemoryColdArchive>,
        warm: Arc<WarmMemoryStore>,
        cold: Arc<ColdReferenceIndex>,
        pipeline: ArchivePipeline,
    }

    fn fixture() -> Fixture {
        let archive = Arc::new(InMemoryColdArchive::new());
        let warm = Arc::new(WarmMemoryStore::new(WarmConfig::default()));
        let cold = Arc::new(ColdReferenceIndex::new(
            archive.clone(),
            Duration::from_secs(1),
        ));
        let config = ArchiveConfig {
            retry_delay: Duration::from_millis(1),
            ..Default::default()
        };
        let pipeline = ArchivePipeline::new(
            warm.clone(),
            cold.clone(),
            default_counter(),
            config,
            &HotConfig::default(),
        );
        Fixture {
            archive,
            warm,
            cold,
            pipeline,
        }
    }

    fn busy_hot() -> HotMemory {
        let mut hot = HotMemory::new("agent-a", "conv-1", 5000);
        hot.objectives = vec!["Reconcile the invoice".into()];
        hot.push(HotMessage::system("You are a bookkeeper", 5));
        hot.push(HotMessage::user("Where is invoice 42?", 1000));
        hot.push(HotMessage::assistant("It was paid on Monday", 1000));
        hot
    }

    #[tokio::test]
    async fn test_archive_flushes_and_resets() {
        let fx = fixture();
        let mut hot = busy_hot();

        let outcome = fx.pipeline.archive(&mut hot).await.unwrap();
        let report = outcome.report().expect("archived");

        assert_eq!(report.tokens_before, 2005);
        assert_eq!(report.messages_archived, 3);
        assert_eq!(hot.messages.len(), 1);
        assert!(hot.messages[0].is_system());
        assert_eq!(hot.token_count, fx.pipeline.marker_tokens());
        assert_eq!(hot.max_tokens, 5000);
        assert_eq!(
            hot.reasoning_state.last_checkpoint_id.as_deref(),
            Some(report.entry_id.as_str())
        );

        let summaries = fx.warm.summaries().await;
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].relevance_score, 0.8);
        assert_eq!(summaries[0].key_points, vec!["Reconcile the invoice".to_string()]);
        assert!(summaries[0].content.contains("user: Where is invoice 42?"));
        assert!(!summaries[0].content.contains("bookkeeper"));

        let references = fx.cold.references().await;
        assert_eq!(references.len(), 1);
        assert_eq!(references[0].relevance_score, 1.0);
        assert!(references[0].expires_at > Utc::now() + ChronoDuration::days(360));

        let stored = fx.archive.entry(&report.entry_id).await.expect("cold entry");
        assert_eq!(stored.messages.len(), 3);
        assert_eq!(fx.pipeline.archive_count(), 1);
        assert!(fx.pipeline.last_archive_time().await.is_some());
    }

    #[tokio::test]
    async fn test_second_archive_is_noop() {
        let fx = fixture();
        let mut hot = busy_hot();

        assert!(fx.pipeline.archive(&mut hot).await.unwrap().is_archived());
        let second = fx.pipeline.archive(&mut hot).await.unwrap();
        assert!(matches!(second, ArchiveOutcome::AlreadyArchived));

        assert_eq!(fx.warm.summaries().await.len(), 1);
        assert_eq!(fx.cold.len().await, 1);
        assert_eq!(fx.pipeline.archive_count(), 1);
    }

    #[tokio::test]
    async fn test_retries_once_then_succeeds() {
        let fx = fixture();
        let mut hot = busy_hot();

        fx.archive.fail_next(1);
        assert!(fx.pipeline.archive(&mut hot).await.unwrap().is_archived());
        assert_eq!(fx.archive.entry_count().await, 1);
    }

    #[tokio::test]
    async fn test_failure_leaves_everything_untouched() {
        let fx = fixture();
        let mut hot = busy_hot();
        let before = hot.clone();

        fx.archive.fail_next(2);
        let err = fx.pipeline.archive(&mut hot).await.unwrap_err();
        assert!(matches!(err, FluxError::ArchiveFailure { .. }));

        assert_eq!(hot.messages.len(), before.messages.len());
        assert_eq!(hot.token_count, before.token_count);
        assert!(hot.has_unarchived_content());
        assert_eq!(fx.warm.entry_count().await, 0);
        assert!(fx.cold.is_empty().await);
        assert_eq!(fx.pipeline.archive_count(), 0);
        assert!(fx.pipeline.last_archive_time().await.is_none());
    }

    #[tokio::test]
    async fn test_system_only_memory_skips_warm_summary() {
        let fx = fixture();
        let mut hot = HotMemory::new("agent-a", "conv-1", 5000);
        hot.push(HotMessage::system("Relevant context from warm memory:\n- Paid invoice", 12));

        let outcome = fx.pipeline.archive(&mut hot).await.unwrap();
        let report = outcome.report().expect("archived");
        assert!(report.summary_id.is_none());
        assert_eq!(report.messages_archived, 1);

        assert!(fx.warm.summaries().await.is_empty());
        assert_eq!(fx.cold.len().await, 1);
        assert_eq!(fx.archive.entry_count().await, 1);
        assert_eq!(hot.token_count, fx.pipeline.marker_tokens());
        assert!(!hot.has_unarchived_content());
    }

    #[test]
    fn test_excerpt() {
        assert_eq!(excerpt("short", 10), "short");
        assert_eq!(excerpt("abcdefghij", 4), "abcd...");
        assert_eq!(excerpt("héllo wörld", 5), "héllo...");
    }
}
