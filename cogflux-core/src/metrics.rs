//! Observability snapshot

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Point-in-time counters across the three tiers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FluxMetrics {
    /// Agent currently in focus
    pub active_agent: Option<String>,
    /// Hot utilization of the active agent
    pub hot_utilization: Option<f64>,
    /// Agents with a resident hot memory
    pub resident_agents: usize,
    /// Summaries and decisions in warm memory
    pub warm_entry_count: usize,
    /// Cold references held in the index
    pub cold_reference_count: usize,
    /// Successful cold access requests
    pub cold_access_count: u64,
    pub archive_count: u64,
    pub last_archive_time: Option<DateTime<Utc>>,
}

impl FluxMetrics {
    /// Hot utilization as a percentage, 0 when no agent is active
    pub fn hot_utilization_percent(&self) -> f64 {
        self.hot_utilization.unwrap_or(0.0) * 100.0
    }
}
