//! Database Test Utilities

use anyhow::Result;
use callsight_ai::db::call_logs::{self, CallLogRow};
use callsight_ai::db::documents::{self, DocumentRow};
use callsight_ai::{AnalysisConfig, PipelineConfig};
use sqlx::SqlitePool;
use std::time::Duration;
use tempfile::TempDir;

/// Create temporary test database with the pipeline schema
///
/// Returns (TempDir, SqlitePool) - TempDir must be kept alive for duration of test
pub async fn create_test_db() -> Result<(TempDir, SqlitePool)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test_callsight.db");
    let pool = callsight_ai::db::init_database_pool(&db_path).await?;
    Ok((temp_dir, pool))
}

/// Seed `count` ingested documents `doc-00`, `doc-01`, ... with recording refs `rec-00`, ...
pub async fn seed_documents(pool: &SqlitePool, count: usize) -> Result<Vec<String>> {
    let mut ids = Vec::with_capacity(count);
    for i in 0..count {
        let id = format!("doc-{:02}", i);
        documents::save_document(
            pool,
            &DocumentRow {
                id: id.clone(),
                source_id: Some(format!("rec-{:02}", i)),
                title: Some(format!("Call rec-{:02}", i)),
                content: Some(format!("Agent: Thanks for calling. Customer: question number {}.", i)),
                status: documents::STATUS_COMPLETED.to_string(),
            },
        )
        .await?;
        ids.push(id);
    }
    Ok(ids)
}

/// Seed `count` call log rows `rec-00`, ... handled by `agent`, with transcripts and no analysis
pub async fn seed_call_logs(pool: &SqlitePool, count: usize, agent: &str) -> Result<Vec<String>> {
    let mut ids = Vec::with_capacity(count);
    for i in 0..count {
        let id = format!("rec-{:02}", i);
        let mut row = CallLogRow::new(id.clone());
        row.transcript = Some(format!("Customer: problem {} with my bill.", i));
        row.agent_name = Some(agent.to_string());
        row.disposition = Some("callback".to_string());
        call_logs::upsert(pool, &row).await?;
        ids.push(id);
    }
    Ok(ids)
}

pub async fn count_rows(pool: &SqlitePool, table: &str) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Pipeline config pointing at `endpoint`, small batches and pages
pub fn test_pipeline_config(endpoint: &str) -> PipelineConfig {
    let mut analysis = AnalysisConfig::new(endpoint, "test-flow", "test-key");
    analysis.timeout = Duration::from_secs(5);

    PipelineConfig {
        analysis,
        batch_size: 5,
        concurrency: 3,
        batch_delay: Duration::ZERO,
        page_size: 4,
        db_max_lock_wait_ms: 5000,
    }
}
