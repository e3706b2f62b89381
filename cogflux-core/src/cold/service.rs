//! Cold archive service seam
//!
//! The durable archive lives outside this crate. [`ColdArchiveService`] is the
//! only way in: store a full-fidelity entry, or request time-limited access to
//! one. [`InMemoryColdArchive`] backs tests and local runs;
//! [`HttpColdArchive`] talks to a remote service.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

use crate::error::{FluxError, Result};

use super::reference::{ArchiveEntry, ArchiveReceipt, ColdEntryType, ColdReference};

/// External durable archive
#[async_trait]
pub trait ColdArchiveService: Send + Sync {
    /// Durably store an entry
    async fn archive(&self, entry: &ArchiveEntry) -> Result<ArchiveReceipt>;

    /// Materialize access to an entry. Must be idempotent per (entry_id, reason).
    async fn request_access(&self, entry_id: &str, reason: &str) -> Result<ColdReference>;
}

/// In-process archive for tests and single-node runs.
///
/// Can be told to fail the next `n` calls to exercise failure paths.
pub struct InMemoryColdArchive {
    entries: RwLock<HashMap<String, ArchiveEntry>>,
    grants: RwLock<HashMap<(String, String), ColdReference>>,
    access_log: RwLock<Vec<(String, String)>>,
    grant_ttl: Duration,
    failures_remaining: AtomicUsize,
    latency: Option<Duration>,
}

impl Default for InMemoryColdArchive {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryColdArchive {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            grants: RwLock::new(HashMap::new()),
            access_log: RwLock::new(Vec::new()),
            grant_ttl: Duration::from_secs(60 * 60),
            failures_remaining: AtomicUsize::new(0),
            latency: None,
        }
    }

    /// Fail the next `count` calls with a `ColdAccess` error
    pub fn fail_next(&self, count: usize) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// Delay every call, to exercise timeouts
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Lifetime of access grants
    pub fn with_grant_ttl(mut self, ttl: Duration) -> Self {
        self.grant_ttl = ttl;
        self
    }

    pub async fn entry(&self, entry_id: &str) -> Option<ArchiveEntry> {
        self.entries.read().await.get(entry_id).cloned()
    }

    pub async fn entry_count(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Every (entry_id, reason) access request received, in order
    pub async fn access_log(&self) -> Vec<(String, String)> {
        self.access_log.read().await.clone()
    }

    async fn simulate(&self) -> Result<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let injected = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(FluxError::ColdAccess("cold archive unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ColdArchiveService for InMemoryColdArchive {
    async fn archive(&self, entry: &ArchiveEntry) -> Result<ArchiveReceipt> {
        self.simulate().await?;
        self.entries
            .write()
            .await
            .insert(entry.entry_id.clone(), entry.clone());
        Ok(ArchiveReceipt {
            entry_id: entry.entry_id.clone(),
            access_url: format!("memory://cold/{}", entry.entry_id),
        })
    }

    async fn request_access(&self, entry_id: &str, reason: &str) -> Result<ColdReference> {
        self.simulate().await?;
        self.access_log
            .write()
            .await
            .push((entry_id.to_string(), reason.to_string()));

        let key = (entry_id.to_string(), reason.to_string());
        if let Some(existing) = self.grants.read().await.get(&key) {
            if !existing.is_expired() {
                return Ok(existing.clone());
            }
        }

        let entries = self.entries.read().await;
        let entry = entries
            .get(entry_id)
            .ok_or_else(|| FluxError::ColdAccess(format!("unknown cold entry: {}", entry_id)))?;

        let ttl = ChronoDuration::from_std(self.grant_ttl).unwrap_or(ChronoDuration::hours(1));
        let reference = ColdReference {
            entry_id: entry_id.to_string(),
            entry_type: ColdEntryType::Conversation,
            summary: format!(
                "Conversation {} ({} messages)",
                entry.conversation_id,
                entry.messages.len()
            ),
            relevance_score: 1.0,
            access_url: format!("memory://cold/{}?grant={}", entry_id, uuid::Uuid::new_v4()),
            expires_at: Utc::now() + ttl,
        };
        drop(entries);

        self.grants.write().await.insert(key, reference.clone());
        Ok(reference)
    }
}

#[derive(Debug, Serialize)]
struct AccessRequest<'a> {
    reason: &'a str,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: String,
}

/// HTTP client for a remote cold archive service.
///
/// `POST {base}/entries` stores an entry; `POST {base}/entries/{id}/access`
/// requests access with a JSON `{ "reason": ... }` body.
pub struct HttpColdArchive {
    client: reqwest::Client,
    base_url: String,
}

impl HttpColdArchive {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body: ErrorBody = response.json().await.unwrap_or(ErrorBody {
            error: String::new(),
        });
        Err(FluxError::ColdAccess(format!(
            "cold archive returned {}: {}",
            status, body.error
        )))
    }
}

#[async_trait]
impl ColdArchiveService for HttpColdArchive {
    async fn archive(&self, entry: &ArchiveEntry) -> Result<ArchiveReceipt> {
        let url = format!("{}/entries", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(entry)
            .send()
            .await
            .map_err(|e| FluxError::ColdAccess(format!("POST {} failed: {}", url, e)))?;

        Self::check(response)
            .await?
            .json::<ArchiveReceipt>()
            .await
            .map_err(|e| FluxError::ColdAccess(format!("Invalid archive receipt: {}", e)))
    }

    async fn request_access(&self, entry_id: &str, reason: &str) -> Result<ColdReference> {
        let url = format!(
            "{}/entries/{}/access",
            self.base_url,
            urlencoding::encode(entry_id)
        );
        let response = self
            .client
            .post(&url)
            .json(&AccessRequest { reason })
            .send()
            .await
            .map_err(|e| FluxError::ColdAccess(format!("POST {} failed: {}", url, e)))?;

        Self::check(response)
            .await?
            .json::<ColdReference>()
            .await
            .map_err(|e| FluxError::ColdAccess(format!("Invalid cold reference: {}", e)))
    }
}
