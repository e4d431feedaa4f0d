//! In-process analyzer standing in for the analysis API

use async_trait::async_trait;
use callsight_ai::models::SourceRecord;
use callsight_ai::services::{Analyze, AnalysisOutcome};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Answers every record with a fixed analysis; counts calls
#[derive(Default)]
pub struct FakeAnalyzer {
    calls: AtomicUsize,
    seen: Mutex<Vec<String>>,
    /// Cancelled once this many calls were made
    cancel_after: Option<(usize, CancellationToken)>,
}

impl FakeAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancelling_after(calls: usize, token: CancellationToken) -> Self {
        Self {
            cancel_after: Some((calls, token)),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Record ids in call order
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Analyze for FakeAnalyzer {
    async fn analyze(&self, record: &SourceRecord) -> AnalysisOutcome {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.seen.lock().unwrap().push(record.id.clone());
        if let Some((limit, token)) = &self.cancel_after {
            if n >= *limit {
                token.cancel();
            }
        }

        let payload = json!({
            "summary": format!("Summary for {}", record.id),
            "tags": ["billing", " refund ", "billing"],
            "sentiment": 12,
            "resolution_status": "Resolved by agent",
            "call_type": "support"
        });
        match payload {
            serde_json::Value::Object(map) => AnalysisOutcome::Completed(map),
            _ => unreachable!("payload literal is an object"),
        }
    }
}
