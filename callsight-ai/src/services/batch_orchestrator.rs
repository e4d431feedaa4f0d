//! Batch orchestrator
//!
//! Drains a [`WorkSource`] one batch at a time. Each record of a batch becomes
//! one task on the [`TaskRunner`]: analyze, normalize, reconcile. A failing
//! record is counted and logged; it never stops the run. Only a failure of the
//! work source itself aborts.
//!
//! After every batch the cumulative [`RunSummary`] is published on the event
//! bus and persisted, so a later run can resume after the last completed batch.

use crate::db;
use crate::models::{AnalysisResult, RecordError, RunState, RunSummary, SourceRecord};
use crate::services::analysis_client::AnalysisOutcome;
use crate::services::record_selector::WorkSource;
use crate::services::task_runner::{TaskOutcome, TaskRunner};
use async_trait::async_trait;
use callsight_common::events::{CallsightEvent, EventBus};
use callsight_common::Result;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Produces an analysis for one record; never fails
#[async_trait]
pub trait Analyze: Send + Sync {
    async fn analyze(&self, record: &SourceRecord) -> AnalysisOutcome;
}

/// Persists one record's normalized result
#[async_trait]
pub trait Reconcile: Send + Sync {
    async fn reconcile(&self, record: &SourceRecord, result: &AnalysisResult) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub batch_size: usize,
    pub concurrency: usize,
    /// Pause between batches
    pub batch_delay: Duration,
    pub db_max_lock_wait_ms: u64,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            batch_size: 50,
            concurrency: 5,
            batch_delay: Duration::ZERO,
            db_max_lock_wait_ms: 5000,
        }
    }
}

/// How one record's task ended
enum RecordOutcome {
    Analyzed,
    Degraded,
}

pub struct BatchOrchestrator {
    analyzer: Arc<dyn Analyze>,
    reconciler: Arc<dyn Reconcile>,
    options: OrchestratorOptions,
    event_bus: Option<EventBus>,
    run_store: Option<SqlitePool>,
    cancel: CancellationToken,
}

impl BatchOrchestrator {
    pub fn new(analyzer: Arc<dyn Analyze>, reconciler: Arc<dyn Reconcile>, options: OrchestratorOptions) -> Self {
        Self {
            analyzer,
            reconciler,
            options,
            event_bus: None,
            run_store: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Publish progress events on `bus`
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Persist run progress to the `analysis_runs` table
    pub fn with_run_store(mut self, db: SqlitePool) -> Self {
        self.run_store = Some(db);
        self
    }

    /// Stop between batches once `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Drive `source` until it is drained or the run is cancelled
    ///
    /// `run` carries the run identity, mode and starting position; it is
    /// returned with final counts. Errors only when the work source fails.
    pub async fn run(&self, source: &mut dyn WorkSource, mut run: RunSummary) -> Result<RunSummary> {
        let started = Instant::now();
        let batch_size = self.options.batch_size.max(1);
        let runner = TaskRunner::new(self.options.concurrency);

        info!(
            run_id = %run.run_id,
            mode = %run.mode,
            start_offset = run.start_offset,
            resume_after = ?run.last_key,
            batch_size,
            concurrency = runner.max_concurrency(),
            "Starting analysis run"
        );
        self.emit(CallsightEvent::AnalysisRunStarted {
            run_id: run.run_id,
            mode: run.mode.clone(),
            start_offset: run.start_offset,
            timestamp: chrono::Utc::now(),
        });
        self.persist(&run).await;

        let mut cancelled = false;
        loop {
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let batch = match source.next_batch(batch_size).await {
                Ok(batch) => batch,
                Err(e) => {
                    error!(run_id = %run.run_id, error = %e, "Work selection failed, aborting run");
                    run.errors.push(RecordError {
                        record_id: String::new(),
                        message: format!("work selection failed: {}", e),
                    });
                    run.finish(RunState::Failed);
                    self.persist(&run).await;
                    self.emit_completed(&run, started, false);
                    return Err(e);
                }
            };
            if batch.is_empty() {
                break;
            }

            let batch_number = run.batches + 1;
            let batch_len = batch.len();
            let last_key = batch.last().map(|r| r.id.clone());
            let (runnable, empty): (Vec<SourceRecord>, Vec<SourceRecord>) =
                batch.into_iter().partition(SourceRecord::has_transcript);

            let tasks = runnable.iter().map(|record| (record.id.clone(), self.process_record(record)));
            let outcomes = runner.run(tasks).await;

            let mut batch_succeeded = 0;
            let mut batch_failed = 0;
            for (record_id, outcome) in outcomes {
                match outcome {
                    TaskOutcome::Finished(Ok(RecordOutcome::Analyzed)) => batch_succeeded += 1,
                    TaskOutcome::Finished(Ok(RecordOutcome::Degraded)) => {
                        batch_succeeded += 1;
                        run.degraded += 1;
                    }
                    TaskOutcome::Finished(Err(e)) => {
                        batch_failed += 1;
                        warn!(record_id = %record_id, error = %e, "Record failed");
                        run.errors.push(RecordError {
                            record_id,
                            message: e.to_string(),
                        });
                    }
                    TaskOutcome::Panicked(message) => {
                        batch_failed += 1;
                        run.errors.push(RecordError {
                            record_id,
                            message: format!("task panicked: {}", message),
                        });
                    }
                }
            }

            run.batches = batch_number;
            run.processed += runnable.len();
            run.succeeded += batch_succeeded;
            run.failed += batch_failed;
            run.skipped += empty.len();
            run.last_key = last_key;

            info!(
                run_id = %run.run_id,
                batch = batch_number,
                size = batch_len,
                succeeded = batch_succeeded,
                failed = batch_failed,
                skipped = empty.len(),
                total_processed = run.processed,
                total_succeeded = run.succeeded,
                total_failed = run.failed,
                "Batch complete"
            );
            self.emit(CallsightEvent::AnalysisBatchCompleted {
                run_id: run.run_id,
                batch_number,
                batch_size: batch_len,
                batch_succeeded,
                batch_failed,
                batch_skipped: empty.len(),
                total_processed: run.processed,
                total_succeeded: run.succeeded,
                total_failed: run.failed,
                timestamp: chrono::Utc::now(),
            });
            self.persist(&run).await;

            if !self.options.batch_delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(self.options.batch_delay) => {}
                    _ = self.cancel.cancelled() => {}
                }
            }
        }

        run.finish(if cancelled { RunState::Cancelled } else { RunState::Completed });
        self.persist(&run).await;
        self.emit_completed(&run, started, cancelled);

        info!(
            run_id = %run.run_id,
            state = run.state.as_str(),
            batches = run.batches,
            processed = run.processed,
            succeeded = run.succeeded,
            degraded = run.degraded,
            failed = run.failed,
            skipped = run.skipped,
            duration_ms = started.elapsed().as_millis() as u64,
            "Analysis run finished"
        );
        Ok(run)
    }

    async fn process_record(&self, record: &SourceRecord) -> Result<RecordOutcome> {
        let outcome = self.analyzer.analyze(record).await;
        let degraded = match &outcome {
            AnalysisOutcome::Degraded(reason) => {
                warn!(record_id = %record.id, reason = %reason, "Using degraded analysis");
                true
            }
            AnalysisOutcome::Completed(_) => false,
        };

        let result = outcome.into_result();
        self.reconciler.reconcile(record, &result).await?;

        Ok(if degraded {
            RecordOutcome::Degraded
        } else {
            RecordOutcome::Analyzed
        })
    }

    fn emit(&self, event: CallsightEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit_lossy(event);
        }
    }

    fn emit_completed(&self, run: &RunSummary, started: Instant, cancelled: bool) {
        self.emit(CallsightEvent::AnalysisRunCompleted {
            run_id: run.run_id,
            processed: run.processed,
            succeeded: run.succeeded,
            failed: run.failed,
            skipped: run.skipped,
            cancelled,
            duration_seconds: started.elapsed().as_secs(),
            timestamp: chrono::Utc::now(),
        });
    }

    /// Run bookkeeping is best effort; a failed save never stops analysis
    async fn persist(&self, run: &RunSummary) {
        if let Some(db) = &self.run_store {
            if let Err(e) = db::runs::save_run(db, run, self.options.db_max_lock_wait_ms).await {
                warn!(run_id = %run.run_id, error = %e, "Failed to persist run progress");
            }
        }
    }
}
