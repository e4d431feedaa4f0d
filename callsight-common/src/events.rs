//! Event types for analysis progress reporting
//!
//! Provides the shared event enum and the EventBus used to publish
//! run and batch progress to any listener (log tailers, dashboards, tests).

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Callsight event types
///
/// Events are broadcast via [`EventBus`] and serialize with a `type` tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CallsightEvent {
    /// Orchestrator pass started
    AnalysisRunStarted {
        run_id: Uuid,
        /// "normal" or "reanalysis"
        mode: String,
        start_offset: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// One batch went through analysis and reconciliation
    AnalysisBatchCompleted {
        run_id: Uuid,
        /// 1-based batch number within the run
        batch_number: usize,
        batch_size: usize,
        batch_succeeded: usize,
        batch_failed: usize,
        batch_skipped: usize,
        /// Cumulative counts for the run so far
        total_processed: usize,
        total_succeeded: usize,
        total_failed: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Orchestrator pass finished (drained or cancelled)
    AnalysisRunCompleted {
        run_id: Uuid,
        processed: usize,
        succeeded: usize,
        failed: usize,
        skipped: usize,
        cancelled: bool,
        duration_seconds: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl CallsightEvent {
    /// Event type name, matching the serialized `type` tag
    pub fn event_type(&self) -> &'static str {
        match self {
            CallsightEvent::AnalysisRunStarted { .. } => "AnalysisRunStarted",
            CallsightEvent::AnalysisBatchCompleted { .. } => "AnalysisBatchCompleted",
            CallsightEvent::AnalysisRunCompleted { .. } => "AnalysisRunCompleted",
        }
    }
}

/// Central event distribution bus
///
/// Wraps a tokio broadcast channel: publishing never blocks, slow
/// subscribers observe `Lagged` instead of stalling the pipeline.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CallsightEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<CallsightEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: CallsightEvent,
    ) -> Result<usize, broadcast::error::SendError<CallsightEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: CallsightEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
