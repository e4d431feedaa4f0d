//! Configuration loading and config file resolution
//!
//! Bootstrap configuration lives in a single TOML file. Everything has a
//! built-in default, so a missing file is not an error: the services start
//! with defaults and log where they looked.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "CALLSIGHT_CONFIG";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Path to the SQLite database holding documents, metadata and call logs
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub analysis: AnalysisSection,

    #[serde(default)]
    pub pipeline: PipelineSection,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (trace, debug, info, warn, error or an EnvFilter directive)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// `[analysis]` table: external analysis endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSection {
    /// Base URL of the analysis service (`{endpoint}/prediction/{chatflow_id}`)
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub chatflow_id: Option<String>,

    /// Bearer credential (lowest priority source, see credential resolution)
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Hard cap applied when an oversized transcript is retried
    #[serde(default = "default_truncate_chars")]
    pub truncate_chars: usize,

    /// Client-side request quota; None disables rate limiting
    #[serde(default)]
    pub requests_per_minute: Option<u32>,

    #[serde(default)]
    pub system_prompt: Option<String>,

    /// Example result object sent as `overrideConfig.exampleJson`
    #[serde(default)]
    pub example_json: Option<serde_json::Value>,
}

impl Default for AnalysisSection {
    fn default() -> Self {
        Self {
            endpoint: None,
            chatflow_id: None,
            api_key: None,
            timeout_secs: default_timeout_secs(),
            truncate_chars: default_truncate_chars(),
            requests_per_minute: None,
            system_prompt: None,
            example_json: None,
        }
    }
}

/// `[pipeline]` table: batching and concurrency settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSection {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Courtesy pause between batches
    #[serde(default)]
    pub batch_delay_ms: u64,

    /// Rows fetched per store page while selecting work
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Upper bound for retrying writes that hit SQLite lock contention
    #[serde(default = "default_max_lock_wait_ms")]
    pub db_max_lock_wait_ms: u64,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
            batch_delay_ms: 0,
            page_size: default_page_size(),
            db_max_lock_wait_ms: default_max_lock_wait_ms(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_truncate_chars() -> usize {
    1000
}

fn default_batch_size() -> usize {
    50
}

fn default_concurrency() -> usize {
    5
}

fn default_page_size() -> usize {
    500
}

fn default_max_lock_wait_ms() -> u64 {
    5000
}

/// Config file resolution, priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. Platform config directory (`<config_dir>/callsight/config.toml`) if it exists
///
/// Returns None when no candidate applies; callers fall back to defaults.
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    dirs::config_dir()
        .map(|d| d.join("callsight").join("config.toml"))
        .filter(|p| p.exists())
}

/// Load TOML config from `path`
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Load config from the resolved path, or defaults when no file is configured
pub fn load_or_default(cli_arg: Option<&Path>) -> Result<TomlConfig> {
    match resolve_config_path(cli_arg, CONFIG_ENV_VAR) {
        Some(path) => {
            tracing::info!("Loading configuration from {}", path.display());
            load_toml_config(&path)
        }
        None => {
            tracing::info!("No configuration file found, using built-in defaults");
            Ok(TomlConfig::default())
        }
    }
}

/// Write TOML config atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// OS-dependent default database location
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("callsight").join("callsight.db"))
        .unwrap_or_else(|| PathBuf::from("./callsight_data/callsight.db"))
}

impl TomlConfig {
    /// Database path from config, falling back to the OS default
    pub fn database_path_or_default(&self) -> PathBuf {
        self.database_path.clone().unwrap_or_else(default_database_path)
    }
}
