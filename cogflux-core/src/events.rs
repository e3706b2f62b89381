//! Flux events
//!
//! The hot memory manager publishes an event after every change to an agent's
//! budget and after every archive. The auto-archive monitor is the main
//! consumer; anything else holding the receiver (a dashboard bridge, a test)
//! can observe the same stream.
//!
//! # Example
//!
//! ```rust,ignore
//! use cogflux_core::events::{event_channel, FluxEvent};
//!
//! let (tx, mut rx) = event_channel(100);
//!
//! tokio::spawn(async move {
//!     while let Some(event) = rx.recv().await {
//!         if let FluxEvent::Utilization { agent_id, utilization, .. } = event {
//!             println!("{} at {:.0}%", agent_id, utilization * 100.0);
//!         }
//!     }
//! });
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Events emitted by the memory manager
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FluxEvent {
    /// An agent's hot memory changed size
    Utilization {
        agent_id: String,
        token_count: usize,
        max_tokens: usize,
        utilization: f64,
        timestamp: DateTime<Utc>,
    },

    /// An agent's hot memory was archived
    Archived {
        agent_id: String,
        summary_id: Option<String>,
        entry_id: String,
        timestamp: DateTime<Utc>,
    },
}

impl FluxEvent {
    pub fn agent_id(&self) -> &str {
        match self {
            FluxEvent::Utilization { agent_id, .. } | FluxEvent::Archived { agent_id, .. } => {
                agent_id
            }
        }
    }
}

/// Sender half of an event channel
pub type EventSender = mpsc::Sender<FluxEvent>;

/// Receiver half of an event channel
pub type EventReceiver = mpsc::Receiver<FluxEvent>;

/// Creates a new event channel with the specified buffer capacity
pub fn event_channel(buffer_size: usize) -> (EventSender, EventReceiver) {
    mpsc::channel(buffer_size)
}

/// Non-blocking publisher.
///
/// Mutations never wait on a slow consumer: when the buffer is full the event
/// is dropped. The monitor's periodic poll covers anything missed.
#[derive(Clone, Default)]
pub struct EventPublisher {
    sender: Option<EventSender>,
}

impl EventPublisher {
    pub fn new(sender: EventSender) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    /// A publisher that discards everything
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.sender.is_some()
    }

    pub fn publish(&self, event: FluxEvent) {
        let Some(sender) = &self.sender else {
            return;
        };
        if let Err(e) = sender.try_send(event) {
            tracing::debug!("Dropped flux event: {}", e);
        }
    }
}
