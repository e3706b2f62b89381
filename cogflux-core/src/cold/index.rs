//! Cold reference index

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

use crate::error::{FluxError, Result};

use super::reference::ColdReference;
use super::service::ColdArchiveService;

/// Local cache of pointers into the cold archive.
///
/// Holds references only; payloads stay in the [`ColdArchiveService`]. Access
/// requests never touch hot or warm state, so a failing archive cannot leave
/// them inconsistent.
pub struct ColdReferenceIndex {
    service: Arc<dyn ColdArchiveService>,
    references: RwLock<Vec<ColdReference>>,
    access_count: AtomicU64,
    access_timeout: Duration,
}

impl ColdReferenceIndex {
    pub fn new(service: Arc<dyn ColdArchiveService>, access_timeout: Duration) -> Self {
        Self {
            service,
            references: RwLock::new(Vec::new()),
            access_count: AtomicU64::new(0),
            access_timeout,
        }
    }

    /// The archive service behind this index
    pub fn service(&self) -> &Arc<dyn ColdArchiveService> {
        &self.service
    }

    /// Default timeout for service calls
    pub fn access_timeout(&self) -> Duration {
        self.access_timeout
    }

    /// Insert a reference, replacing any cached one with the same entry id
    pub async fn add_reference(&self, reference: ColdReference) {
        let mut references = self.references.write().await;
        match references
            .iter_mut()
            .find(|r| r.entry_id == reference.entry_id)
        {
            Some(existing) => *existing = reference,
            None => references.push(reference),
        }
    }

    /// Request access to an archived entry using the default timeout
    pub async fn request_access(&self, entry_id: &str, reason: &str) -> Result<ColdReference> {
        self.request_access_with_timeout(entry_id, reason, self.access_timeout)
            .await
    }

    /// Request access to an archived entry, giving up after `timeout`.
    ///
    /// The reason is written to the audit log before the call is made.
    pub async fn request_access_with_timeout(
        &self,
        entry_id: &str,
        reason: &str,
        timeout: Duration,
    ) -> Result<ColdReference> {
        tracing::info!(
            target: "cogflux::audit",
            entry_id = %entry_id,
            reason = %reason,
            "Cold access requested"
        );

        let reference =
            match tokio::time::timeout(timeout, self.service.request_access(entry_id, reason)).await
            {
                Ok(Ok(reference)) => reference,
                Ok(Err(e)) => {
                    tracing::warn!(entry_id = %entry_id, error = %e, "Cold access failed");
                    return Err(match e {
                        FluxError::ColdAccess(_) | FluxError::ColdAccessTimeout(_) => e,
                        other => FluxError::ColdAccess(other.to_string()),
                    });
                }
                Err(_) => {
                    tracing::warn!(entry_id = %entry_id, ?timeout, "Cold access timed out");
                    return Err(FluxError::ColdAccessTimeout(timeout));
                }
            };

        self.access_count.fetch_add(1, Ordering::Relaxed);
        self.add_reference(reference.clone()).await;
        Ok(reference)
    }

    pub async fn get(&self, entry_id: &str) -> Option<ColdReference> {
        self.references
            .read()
            .await
            .iter()
            .find(|r| r.entry_id == entry_id)
            .cloned()
    }

    /// All cached references in insertion order
    pub async fn references(&self) -> Vec<ColdReference> {
        self.references.read().await.clone()
    }

    /// The `limit` most relevant references
    pub async fn top_references(&self, limit: usize) -> Vec<ColdReference> {
        let mut references = self.references().await;
        references.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
        references.truncate(limit);
        references
    }

    /// References whose summary contains `query`, case-insensitively
    pub async fn search(&self, query: &str) -> Vec<ColdReference> {
        let needle = query.to_lowercase();
        self.references
            .read()
            .await
            .iter()
            .filter(|r| r.matches(&needle))
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.references.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.references.read().await.is_empty()
    }

    /// Successful access requests since creation
    pub fn access_count(&self) -> u64 {
        self.access_count.load(Ordering::Relaxed)
    }

    /// Drop the local cache. The remote archive is unaffected.
    pub async fn clear(&self) {
        self.references.write().await.clear();
    }
}
