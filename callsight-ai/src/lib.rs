//! callsight-ai library interface
//!
//! Bounded-concurrency, resumable analysis of call transcripts: selects the
//! records that still need analysis, sends each transcript to the analysis
//! service, normalizes the answer and writes it back to the document store
//! and the call log table.
//!
//! Exposed as a library so integration tests can drive the pipeline.

pub mod config;
pub mod db;
pub mod models;
pub mod services;
pub mod utils;

pub use config::{AnalysisConfig, PipelineConfig};
pub use services::{AnalysisPipeline, PipelineRequest};
