//! Domain event system — observing a run without coupling to the loop.
//!
//! The agent loop publishes an event for every notable transition. Other
//! components (CLI progress output, tests) subscribe and filter for what
//! they care about.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::tool::ToolOutcome;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A run was started for a question
    RunStarted {
        run_id: String,
        budget: u32,
        timestamp: DateTime<Utc>,
    },

    /// The provider returned a batch of candidates
    CompletionReceived {
        run_id: String,
        iteration: u32,
        candidates: usize,
        valid: usize,
        tokens_used: Option<u32>,
        timestamp: DateTime<Utc>,
    },

    /// A candidate failed validation and was diverted
    CandidateRejected {
        run_id: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A plan was captured from the model
    PlanCaptured {
        run_id: String,
        steps: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// The current step changed
    StepAdvanced {
        run_id: String,
        from: u32,
        to: u32,
        timestamp: DateTime<Utc>,
    },

    /// A tool was executed
    ToolExecuted {
        run_id: String,
        tool_name: String,
        outcome: ToolOutcome,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// The loop exited
    RunFinished {
        run_id: String,
        iterations: u32,
        terminal: bool,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
