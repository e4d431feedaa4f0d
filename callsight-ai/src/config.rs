//! Configuration resolution for callsight-ai
//!
//! Builds the explicit [`PipelineConfig`] handed to every component.
//! The API credential uses multi-tier resolution with Database → ENV → TOML
//! priority; the endpoint and chatflow use ENV → TOML.

use crate::db;
use callsight_common::config::TomlConfig;
use callsight_common::{Error, Result};
use sqlx::SqlitePool;
use std::time::Duration;
use tracing::{info, warn};

pub const API_KEY_ENV_VAR: &str = "CALLSIGHT_API_KEY";
pub const ENDPOINT_ENV_VAR: &str = "CALLSIGHT_ENDPOINT";
pub const CHATFLOW_ENV_VAR: &str = "CALLSIGHT_CHATFLOW_ID";

/// Settings for the analysis API client
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Base URL, without trailing `/prediction/...`
    pub endpoint: String,
    pub chatflow_id: String,
    pub api_key: String,
    /// Wall-clock limit for one request
    pub timeout: Duration,
    /// Transcripts longer than this are retried truncated to this many characters
    pub truncate_chars: usize,
    pub requests_per_minute: Option<u32>,
    pub system_prompt: Option<String>,
    pub example_json: Option<serde_json::Value>,
}

impl AnalysisConfig {
    /// Config with defaults for everything but the connection details
    pub fn new(endpoint: impl Into<String>, chatflow_id: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            chatflow_id: chatflow_id.into(),
            api_key: api_key.into(),
            timeout: Duration::from_secs(60),
            truncate_chars: 1000,
            requests_per_minute: None,
            system_prompt: None,
            example_json: None,
        }
    }

    /// Full prediction URL
    pub fn prediction_url(&self) -> String {
        format!("{}/prediction/{}", self.endpoint.trim_end_matches('/'), self.chatflow_id)
    }
}

/// Everything the pipeline needs, passed explicitly into constructors
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub analysis: AnalysisConfig,
    pub batch_size: usize,
    pub concurrency: usize,
    pub batch_delay: Duration,
    pub page_size: usize,
    pub db_max_lock_wait_ms: u64,
}

impl PipelineConfig {
    /// Resolve configuration from database, environment and TOML
    pub async fn resolve(db: &SqlitePool, toml_config: &TomlConfig) -> Result<Self> {
        let api_key = resolve_api_key(db, toml_config).await?;

        let endpoint = first_valid(std::env::var(ENDPOINT_ENV_VAR).ok(), toml_config.analysis.endpoint.clone())
            .ok_or_else(|| {
                Error::Config(format!(
                    "Analysis endpoint not configured. Set {} or [analysis] endpoint in the TOML config.",
                    ENDPOINT_ENV_VAR
                ))
            })?;

        let chatflow_id = first_valid(std::env::var(CHATFLOW_ENV_VAR).ok(), toml_config.analysis.chatflow_id.clone())
            .ok_or_else(|| {
                Error::Config(format!(
                    "Chatflow id not configured. Set {} or [analysis] chatflow_id in the TOML config.",
                    CHATFLOW_ENV_VAR
                ))
            })?;

        let section = &toml_config.analysis;
        let pipeline = &toml_config.pipeline;

        Ok(Self {
            analysis: AnalysisConfig {
                endpoint,
                chatflow_id,
                api_key,
                timeout: Duration::from_secs(section.timeout_secs.max(1)),
                truncate_chars: section.truncate_chars.max(1),
                requests_per_minute: section.requests_per_minute.filter(|rpm| *rpm > 0),
                system_prompt: section.system_prompt.clone(),
                example_json: section.example_json.clone(),
            },
            batch_size: pipeline.batch_size.max(1),
            concurrency: pipeline.concurrency.max(1),
            batch_delay: Duration::from_millis(pipeline.batch_delay_ms),
            page_size: pipeline.page_size.max(1),
            db_max_lock_wait_ms: pipeline.db_max_lock_wait_ms,
        })
    }
}

/// Resolve the analysis API credential from 3-tier configuration
///
/// **Priority:** Database → ENV → TOML
pub async fn resolve_api_key(db: &SqlitePool, toml_config: &TomlConfig) -> Result<String> {
    let db_key = db::settings::get_api_key(db).await?.filter(|k| is_valid_key(k));
    let env_key = std::env::var(API_KEY_ENV_VAR).ok().filter(|k| is_valid_key(k));
    let toml_key = toml_config.analysis.api_key.clone().filter(|k| is_valid_key(k));

    let sources: Vec<&str> = [
        db_key.as_ref().map(|_| "database"),
        env_key.as_ref().map(|_| "environment"),
        toml_key.as_ref().map(|_| "TOML"),
    ]
    .into_iter()
    .flatten()
    .collect();

    if sources.len() > 1 {
        warn!(
            "Analysis API key found in multiple sources: {}. Using {} (highest priority).",
            sources.join(", "),
            sources[0]
        );
    }

    if let Some(key) = db_key {
        info!("Analysis API key loaded from database");
        return Ok(key);
    }
    if let Some(key) = env_key {
        info!("Analysis API key loaded from environment variable");
        return Ok(key);
    }
    if let Some(key) = toml_key {
        info!("Analysis API key loaded from TOML config");
        return Ok(key);
    }

    Err(Error::Config(format!(
        "Analysis API key not configured. Please configure using one of:\n\
         1. Database: settings key '{}'\n\
         2. Environment: {}=your-key-here\n\
         3. TOML config: [analysis] api_key = \"your-key\"",
        db::settings::API_KEY_SETTING,
        API_KEY_ENV_VAR
    )))
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

fn first_valid(primary: Option<String>, fallback: Option<String>) -> Option<String> {
    primary
        .filter(|v| is_valid_key(v))
        .or_else(|| fallback.filter(|v| is_valid_key(v)))
}
