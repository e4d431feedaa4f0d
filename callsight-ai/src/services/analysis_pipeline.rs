//! Pipeline assembly
//!
//! Wires selector, client, reconciler and orchestrator together from one
//! [`PipelineConfig`]. This is what the binary runs.

use crate::config::PipelineConfig;
use crate::db;
use crate::models::{RunState, RunSummary, SelectionMode, SelectionQuery};
use crate::services::analysis_client::AnalysisClient;
use crate::services::batch_orchestrator::{Analyze, BatchOrchestrator, OrchestratorOptions};
use crate::services::record_selector::RecordSelector;
use crate::services::state_reconciler::StateReconciler;
use callsight_common::events::EventBus;
use callsight_common::{Error, Result};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// What to analyze in one run
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    pub mode: SelectionMode,
    pub limit: Option<usize>,
    pub offset: usize,
    /// Continue after the last completed batch of the latest unfinished run
    pub resume: bool,
}

impl PipelineRequest {
    pub fn new(mode: SelectionMode) -> Self {
        Self {
            mode,
            limit: None,
            offset: 0,
            resume: false,
        }
    }
}

pub struct AnalysisPipeline {
    db: SqlitePool,
    config: PipelineConfig,
    event_bus: EventBus,
    cancel: CancellationToken,
}

impl AnalysisPipeline {
    pub fn new(db: SqlitePool, config: PipelineConfig, event_bus: EventBus) -> Self {
        Self {
            db,
            config,
            event_bus,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run against the configured analysis API
    pub async fn run(&self, request: PipelineRequest) -> Result<RunSummary> {
        let client = AnalysisClient::new(self.config.analysis.clone())
            .map_err(|e| Error::Config(format!("Failed to build analysis client: {}", e)))?;
        self.run_with(Arc::new(client), request).await
    }

    /// Run with a caller-supplied analyzer
    pub async fn run_with(&self, analyzer: Arc<dyn Analyze>, request: PipelineRequest) -> Result<RunSummary> {
        let selection = request.mode.selection_key();
        let mut query = SelectionQuery::new(request.mode.clone()).with_offset(request.offset);
        query.limit = request.limit;

        let mut run = RunSummary::new(request.mode.label(), request.offset).with_selection(selection.clone());
        if request.resume {
            if let Some(key) = self.resume_key(&selection).await? {
                query = query.after(key.clone());
                run.last_key = Some(key);
            }
        }

        let selector = RecordSelector::new(self.db.clone(), self.config.page_size);
        let mut cursor = selector.select(query);

        let reconciler = Arc::new(StateReconciler::new(self.db.clone(), self.config.db_max_lock_wait_ms));
        let orchestrator = BatchOrchestrator::new(
            analyzer,
            reconciler,
            OrchestratorOptions {
                batch_size: self.config.batch_size,
                concurrency: self.config.concurrency,
                batch_delay: self.config.batch_delay,
                db_max_lock_wait_ms: self.config.db_max_lock_wait_ms,
            },
        )
        .with_event_bus(self.event_bus.clone())
        .with_run_store(self.db.clone())
        .with_cancellation(self.cancel.clone());

        orchestrator.run(&mut cursor, run).await
    }

    /// Resume point of the latest run over the same selection, unless that run finished
    async fn resume_key(&self, selection: &str) -> Result<Option<String>> {
        let Some(previous) = db::runs::load_latest_run(&self.db, selection).await? else {
            info!(selection, "No previous run to resume, starting from the beginning");
            return Ok(None);
        };

        if previous.state == RunState::Completed {
            info!(
                selection,
                previous_run = %previous.run_id,
                "Previous run completed, starting from the beginning"
            );
            return Ok(None);
        }

        info!(
            selection,
            previous_run = %previous.run_id,
            previous_state = previous.state.as_str(),
            resume_after = ?previous.last_key,
            "Resuming previous run"
        );
        Ok(previous.last_key)
    }
}
