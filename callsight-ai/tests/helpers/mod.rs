//! Test Helper Utilities
//!
//! Shared utilities for testing callsight-ai

#![allow(dead_code)]

pub mod db_utils;
pub mod fake_analyzer;

pub use db_utils::{count_rows, create_test_db, seed_call_logs, seed_documents, test_pipeline_config};
pub use fake_analyzer::FakeAnalyzer;
