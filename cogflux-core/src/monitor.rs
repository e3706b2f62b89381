//! Auto-archive monitor
//!
//! Background task that archives the active agent before it hits its budget.
//! It reacts to utilization events from the hot memory manager and also polls
//! the active agent on an interval, so events dropped on a full channel are
//! caught on the next tick.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::archive::ArchiveOutcome;
use crate::config::MonitorConfig;
use crate::error::FluxError;
use crate::events::{EventReceiver, FluxEvent};
use crate::hot::HotMemoryManager;

/// Proactive archiver for the active agent
pub struct AutoArchiveMonitor {
    manager: Arc<HotMemoryManager>,
    threshold: f64,
    poll_interval: Duration,
}

impl AutoArchiveMonitor {
    pub fn new(manager: Arc<HotMemoryManager>, config: &MonitorConfig) -> Self {
        Self {
            manager,
            threshold: config.threshold,
            poll_interval: config.poll_interval.max(Duration::from_millis(1)),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Start the monitor task.
    ///
    /// With `events` set the monitor reacts to utilization events as they
    /// arrive; without, it relies on the poll alone.
    pub fn spawn(self, events: Option<EventReceiver>) -> MonitorHandle {
        let token = CancellationToken::new();
        let task_token = token.clone();
        tracing::info!(
            threshold = self.threshold,
            poll_interval = ?self.poll_interval,
            reactive = events.is_some(),
            "Starting auto-archive monitor"
        );
        let join = tokio::spawn(async move { self.run(events, task_token).await });
        MonitorHandle { token, join }
    }

    async fn run(self, mut events: Option<EventReceiver>, token: CancellationToken) {
        let mut poll = tokio::time::interval(self.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut events_open = events.is_some();

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                event = next_event(&mut events), if events_open => match event {
                    Some(event) => self.on_event(event).await,
                    None => {
                        tracing::debug!("Flux event channel closed; continuing with polling");
                        events_open = false;
                    }
                },
                _ = poll.tick() => self.poll_active().await,
            }
        }

        tracing::info!("Auto-archive monitor stopped");
    }

    async fn on_event(&self, event: FluxEvent) {
        let FluxEvent::Utilization {
            agent_id,
            utilization,
            ..
        } = event
        else {
            return;
        };
        if utilization < self.threshold {
            return;
        }
        if self.manager.active_agent().await.as_deref() != Some(agent_id.as_str()) {
            return;
        }
        self.archive(&agent_id).await;
    }

    async fn poll_active(&self) {
        let Some((agent_id, utilization)) = self.manager.active_utilization().await else {
            return;
        };
        if utilization >= self.threshold {
            self.archive(&agent_id).await;
        }
    }

    async fn archive(&self, agent_id: &str) {
        match self.manager.archive_if_above(agent_id, self.threshold).await {
            Ok(ArchiveOutcome::Archived(report)) => {
                tracing::info!(
                    agent_id = %agent_id,
                    entry_id = %report.entry_id,
                    tokens_before = report.tokens_before,
                    "Proactively archived hot memory"
                );
            }
            Ok(_) => {}
            Err(FluxError::AgentNotFound(_)) => {
                tracing::debug!(agent_id = %agent_id, "Agent removed before proactive archive");
            }
            Err(e) => {
                tracing::warn!(agent_id = %agent_id, error = %e, "Proactive archive failed");
            }
        }
    }
}

async fn next_event(events: &mut Option<EventReceiver>) -> Option<FluxEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => None,
    }
}

/// Handle to a running monitor
pub struct MonitorHandle {
    token: CancellationToken,
    join: JoinHandle<()>,
}

impl MonitorHandle {
    pub fn is_running(&self) -> bool {
        !self.join.is_finished()
    }

    /// Stop the monitor and wait for it to exit
    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Err(e) = (&mut self.join).await {
            tracing::warn!("Auto-archive monitor task ended abnormally: {}", e);
        }
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
