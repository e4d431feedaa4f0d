//! Pipeline services

pub mod analysis_client;
pub mod analysis_pipeline;
pub mod batch_orchestrator;
pub mod join_key;
pub mod record_selector;
pub mod response_envelope;
pub mod result_normalizer;
pub mod state_reconciler;
pub mod task_runner;

pub use analysis_client::{AnalysisClient, AnalysisError, AnalysisOutcome};
pub use analysis_pipeline::{AnalysisPipeline, PipelineRequest};
pub use batch_orchestrator::{Analyze, BatchOrchestrator, OrchestratorOptions, Reconcile};
pub use join_key::{derive_recording_ref, JoinKeyDeriver};
pub use record_selector::{RecordSelector, WorkCursor, WorkSource};
pub use response_envelope::ResponseEnvelope;
pub use result_normalizer::normalize;
pub use state_reconciler::StateReconciler;
pub use task_runner::{TaskOutcome, TaskRunner};
