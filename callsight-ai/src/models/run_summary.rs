//! Run bookkeeping: summary counts and persisted run state

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of one orchestrator pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Running,
    Completed,
    Cancelled,
    /// Aborted because work selection itself failed
    Failed,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Running => "running",
            RunState::Completed => "completed",
            RunState::Cancelled => "cancelled",
            RunState::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(RunState::Running),
            "completed" => Some(RunState::Completed),
            "cancelled" => Some(RunState::Cancelled),
            "failed" => Some(RunState::Failed),
            _ => None,
        }
    }
}

/// A record that could not be reconciled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordError {
    pub record_id: String,
    pub message: String,
}

/// Cumulative outcome of an orchestrator pass
///
/// `processed` counts records sent through analysis; records with empty
/// transcripts are counted in `skipped` only. `succeeded` includes degraded
/// results, which are also counted in `degraded`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub mode: String,
    /// Canonical mode plus filter; resume only continues a run with the same key
    pub selection: String,
    pub state: RunState,
    pub start_offset: usize,
    /// Key of the last record of the last completed batch (resume point)
    pub last_key: Option<String>,
    pub batches: usize,
    pub processed: usize,
    pub succeeded: usize,
    pub degraded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub errors: Vec<RecordError>,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub ended_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl RunSummary {
    pub fn new(mode: impl Into<String>, start_offset: usize) -> Self {
        let mode = mode.into();
        Self {
            run_id: Uuid::new_v4(),
            selection: mode.clone(),
            mode,
            state: RunState::Running,
            start_offset,
            last_key: None,
            batches: 0,
            processed: 0,
            succeeded: 0,
            degraded: 0,
            failed: 0,
            skipped: 0,
            errors: Vec::new(),
            started_at: chrono::Utc::now(),
            ended_at: None,
        }
    }

    pub fn with_selection(mut self, selection: impl Into<String>) -> Self {
        self.selection = selection.into();
        self
    }

    /// Mark the run as ended in `state`
    pub fn finish(&mut self, state: RunState) {
        self.state = state;
        self.ended_at = Some(chrono::Utc::now());
    }
}
