//! Data models for the analysis pipeline

pub mod analysis_result;
pub mod run_summary;
pub mod selection;
pub mod source_record;

pub use analysis_result::{
    AnalysisPayload, AnalysisResult, ResolutionStatus, DEGRADED_TAG, NEUTRAL_SENTIMENT, SENTIMENT_MAX, SENTIMENT_MIN,
};
pub use run_summary::{RecordError, RunState, RunSummary};
pub use selection::{CallLogColumn, FieldFilter, FilterOp, ReanalysisFilter, SelectionMode, SelectionQuery};
pub use source_record::{RecordOrigin, SourceRecord};
