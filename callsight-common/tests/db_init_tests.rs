//! Tests for database initialization
//!
//! Covers automatic creation, reopening an existing file, and the table set
//! the analysis pipeline depends on.

use callsight_common::db::init::{create_schema, init_database};
use sqlx::sqlite::SqlitePoolOptions;
use tempfile::TempDir;

async fn table_names(pool: &sqlx::SqlitePool) -> Vec<String> {
    sqlx::query_scalar::<_, String>(
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )
    .fetch_all(pool)
    .await
    .unwrap()
}

#[tokio::test]
async fn test_database_creation_when_missing() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("nested").join("callsight.db");

    let result = init_database(&db_path).await;

    assert!(result.is_ok(), "Database initialization failed: {:?}", result.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_database_opens_existing() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("callsight.db");

    let pool1 = init_database(&db_path).await;
    assert!(pool1.is_ok());

    let pool2 = init_database(&db_path).await;
    assert!(pool2.is_ok(), "Failed to open existing database: {:?}", pool2.err());
}

#[tokio::test]
async fn test_schema_contains_pipeline_tables() {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("callsight.db")).await.unwrap();

    let tables = table_names(&pool).await;
    for expected in [
        "analysis_runs",
        "call_logs",
        "completion_markers",
        "document_metadata",
        "documents",
        "settings",
    ] {
        assert!(tables.contains(&expected.to_string()), "missing table {}", expected);
    }
}

#[tokio::test]
async fn test_create_schema_is_idempotent() {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();

    create_schema(&pool).await.unwrap();
    create_schema(&pool).await.unwrap();

    assert_eq!(table_names(&pool).await.len(), 6);
}

#[tokio::test]
async fn test_run_selection_column_added_to_older_table() {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::query(
        "CREATE TABLE analysis_runs (run_id TEXT PRIMARY KEY, mode TEXT NOT NULL, state TEXT NOT NULL, \
         start_offset INTEGER NOT NULL DEFAULT 0, last_key TEXT, processed INTEGER NOT NULL DEFAULT 0, \
         succeeded INTEGER NOT NULL DEFAULT 0, degraded INTEGER NOT NULL DEFAULT 0, \
         failed INTEGER NOT NULL DEFAULT 0, skipped INTEGER NOT NULL DEFAULT 0, \
         errors TEXT NOT NULL DEFAULT '[]', started_at TEXT NOT NULL, ended_at TEXT)",
    )
    .execute(&pool)
    .await
    .unwrap();

    create_schema(&pool).await.unwrap();
    create_schema(&pool).await.unwrap();

    let columns: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM pragma_table_info('analysis_runs') WHERE name = 'selection'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(columns, 1);
}
