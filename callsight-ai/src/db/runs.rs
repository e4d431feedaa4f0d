//! Analysis run persistence
//!
//! Each orchestrator pass is saved after every batch so an interrupted run
//! can be reported on and resumed from its last completed batch.

use crate::models::{RecordError, RunState, RunSummary};
use crate::utils::retry_on_lock;
use callsight_common::{Error, Result};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Save run summary to database (insert or update)
pub async fn save_run(pool: &SqlitePool, run: &RunSummary, max_wait_ms: u64) -> Result<()> {
    // Prepare all data BEFORE acquiring database connection
    let run_id = run.run_id.to_string();
    let errors = serde_json::to_string(&run.errors)
        .map_err(|e| Error::Internal(format!("Failed to serialize run errors: {}", e)))?;
    let started_at = run.started_at.to_rfc3339();
    let ended_at = run.ended_at.map(|dt| dt.to_rfc3339());

    retry_on_lock("save_run", max_wait_ms, || async {
        sqlx::query(
            r#"
            INSERT INTO analysis_runs (
                run_id, mode, selection, state, start_offset, last_key, processed, succeeded,
                degraded, failed, skipped, errors, started_at, ended_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(run_id) DO UPDATE SET
                state = excluded.state,
                last_key = excluded.last_key,
                processed = excluded.processed,
                succeeded = excluded.succeeded,
                degraded = excluded.degraded,
                failed = excluded.failed,
                skipped = excluded.skipped,
                errors = excluded.errors,
                ended_at = excluded.ended_at
            "#,
        )
        .bind(&run_id)
        .bind(&run.mode)
        .bind(&run.selection)
        .bind(run.state.as_str())
        .bind(run.start_offset as i64)
        .bind(&run.last_key)
        .bind(run.processed as i64)
        .bind(run.succeeded as i64)
        .bind(run.degraded as i64)
        .bind(run.failed as i64)
        .bind(run.skipped as i64)
        .bind(&errors)
        .bind(&started_at)
        .bind(&ended_at)
        .execute(pool)
        .await?;

        Ok(())
    })
    .await
}

/// Load run by id
pub async fn load_run(pool: &SqlitePool, run_id: Uuid) -> Result<Option<RunSummary>> {
    let row = sqlx::query(
        r#"
        SELECT run_id, mode, selection, state, start_offset, last_key, processed, succeeded,
               degraded, failed, skipped, errors, started_at, ended_at
        FROM analysis_runs
        WHERE run_id = ?
        "#,
    )
    .bind(run_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(|row| row_to_run(&row)).transpose()
}

/// Most recently started run for a selection key (see `SelectionMode::selection_key`)
pub async fn load_latest_run(pool: &SqlitePool, selection: &str) -> Result<Option<RunSummary>> {
    let row = sqlx::query(
        r#"
        SELECT run_id, mode, selection, state, start_offset, last_key, processed, succeeded,
               degraded, failed, skipped, errors, started_at, ended_at
        FROM analysis_runs
        WHERE selection = ?
        ORDER BY started_at DESC
        LIMIT 1
        "#,
    )
    .bind(selection)
    .fetch_optional(pool)
    .await?;

    row.map(|row| row_to_run(&row)).transpose()
}

fn row_to_run(row: &sqlx::sqlite::SqliteRow) -> Result<RunSummary> {
    let run_id_str: String = row.get("run_id");
    let run_id = Uuid::parse_str(&run_id_str)
        .map_err(|e| Error::Internal(format!("Invalid run id {}: {}", run_id_str, e)))?;

    let state_str: String = row.get("state");
    let state = RunState::parse(&state_str)
        .ok_or_else(|| Error::Internal(format!("Invalid run state: {}", state_str)))?;

    let errors_json: String = row.get("errors");
    let errors: Vec<RecordError> = serde_json::from_str(&errors_json)
        .map_err(|e| Error::Internal(format!("Failed to deserialize run errors: {}", e)))?;

    let started_at = parse_timestamp(row.get("started_at"))?;
    let ended_at = row
        .get::<Option<String>, _>("ended_at")
        .map(parse_timestamp)
        .transpose()?;

    Ok(RunSummary {
        run_id,
        mode: row.get("mode"),
        selection: row.get("selection"),
        state,
        start_offset: row.get::<i64, _>("start_offset") as usize,
        last_key: row.get("last_key"),
        batches: 0,
        processed: row.get::<i64, _>("processed") as usize,
        succeeded: row.get::<i64, _>("succeeded") as usize,
        degraded: row.get::<i64, _>("degraded") as usize,
        failed: row.get::<i64, _>("failed") as usize,
        skipped: row.get::<i64, _>("skipped") as usize,
        errors,
        started_at,
        ended_at,
    })
}

fn parse_timestamp(value: String) -> Result<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .map_err(|e| Error::Internal(format!("Invalid timestamp {}: {}", value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory database");
        callsight_common::db::create_schema(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_save_and_reload_run() {
        let pool = test_pool().await;
        let mut run = RunSummary::new("normal", 20);
        run.processed = 3;
        run.succeeded = 2;
        run.failed = 1;
        run.last_key = Some("doc-0042".to_string());
        run.errors.push(RecordError {
            record_id: "doc-0041".to_string(),
            message: "Database error: disk I/O error".to_string(),
        });

        save_run(&pool, &run, 1000).await.unwrap();
        run.finish(RunState::Completed);
        save_run(&pool, &run, 1000).await.unwrap();

        let loaded = load_run(&pool, run.run_id).await.unwrap().unwrap();
        assert_eq!(loaded.state, RunState::Completed);
        assert_eq!(loaded.start_offset, 20);
        assert_eq!(loaded.last_key.as_deref(), Some("doc-0042"));
        assert_eq!(loaded.errors, run.errors);
        assert!(loaded.ended_at.is_some());
    }

    #[tokio::test]
    async fn test_latest_run_by_mode() {
        let pool = test_pool().await;
        assert!(load_latest_run(&pool, "normal").await.unwrap().is_none());

        let mut older = RunSummary::new("normal", 0);
        older.started_at = chrono::Utc::now() - chrono::Duration::hours(1);
        save_run(&pool, &older, 1000).await.unwrap();
        let newer = RunSummary::new("normal", 0);
        save_run(&pool, &newer, 1000).await.unwrap();
        save_run(&pool, &RunSummary::new("reanalysis", 0), 1000).await.unwrap();

        let latest = load_latest_run(&pool, "normal").await.unwrap().unwrap();
        assert_eq!(latest.run_id, newer.run_id);
    }

    #[tokio::test]
    async fn test_latest_run_matches_selection_not_just_mode() {
        let pool = test_pool().await;
        let mut empty_tags =
            RunSummary::new("reanalysis", 0).with_selection("reanalysis:empty_tags");
        empty_tags.last_key = Some("rec-40".to_string());
        save_run(&pool, &empty_tags, 1000).await.unwrap();

        assert!(load_latest_run(&pool, "reanalysis:sentiment:lte:3")
            .await
            .unwrap()
            .is_none());
        let loaded = load_latest_run(&pool, "reanalysis:empty_tags").await.unwrap().unwrap();
        assert_eq!(loaded.run_id, empty_tags.run_id);
        assert_eq!(loaded.mode, "reanalysis");
        assert_eq!(loaded.last_key.as_deref(), Some("rec-40"));
    }
}
