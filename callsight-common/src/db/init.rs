//! Database initialization
//!
//! Opens (or creates) the SQLite database and applies the schema. Every
//! statement is `CREATE ... IF NOT EXISTS`, so startup is idempotent.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    // WAL lets selector reads proceed while reconciler writes
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;

    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create every table and index used by the pipeline
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_settings_table(pool).await?;
    create_documents_table(pool).await?;
    create_document_metadata_table(pool).await?;
    create_completion_markers_table(pool).await?;
    create_call_logs_table(pool).await?;
    create_analysis_runs_table(pool).await?;

    info!("Database schema ready");
    Ok(())
}

/// Key/value runtime settings
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Ingested documents (representation A). Written by the upstream ingester.
pub async fn create_documents_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            source_id TEXT,
            title TEXT,
            content TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_status ON documents(status)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Per-document key/value metadata. Not unique on (document_id, field_name):
/// older writers left duplicates behind, so writers replace by delete-then-insert.
pub async fn create_document_metadata_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS document_metadata (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
            field_name TEXT NOT NULL,
            field_value TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_document_metadata_doc_field \
         ON document_metadata(document_id, field_name)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// One completion marker per document
pub async fn create_completion_markers_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS completion_markers (
            document_id TEXT PRIMARY KEY REFERENCES documents(id) ON DELETE CASCADE,
            value TEXT NOT NULL,
            marked_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Flattened call log rows (representation B), keyed by recording reference
pub async fn create_call_logs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS call_logs (
            recording_id TEXT PRIMARY KEY,
            document_id TEXT,
            transcript TEXT,
            summary TEXT,
            coaching TEXT,
            tags TEXT,
            tags_array TEXT,
            sentiment INTEGER,
            resolution_status TEXT,
            escalated INTEGER,
            call_type TEXT,
            persona TEXT,
            agent_name TEXT,
            customer_name TEXT,
            customer_phone TEXT,
            operator_notes TEXT,
            disposition TEXT,
            analyzed_at TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// One row per orchestrator pass, used for reporting and resume
pub async fn create_analysis_runs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS analysis_runs (
            run_id TEXT PRIMARY KEY,
            mode TEXT NOT NULL,
            selection TEXT NOT NULL DEFAULT '',
            state TEXT NOT NULL,
            start_offset INTEGER NOT NULL DEFAULT 0,
            last_key TEXT,
            processed INTEGER NOT NULL DEFAULT 0,
            succeeded INTEGER NOT NULL DEFAULT 0,
            degraded INTEGER NOT NULL DEFAULT 0,
            failed INTEGER NOT NULL DEFAULT 0,
            skipped INTEGER NOT NULL DEFAULT 0,
            errors TEXT NOT NULL DEFAULT '[]',
            started_at TEXT NOT NULL,
            ended_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    add_run_selection_column(pool).await?;

    Ok(())
}

/// Databases created before runs recorded their selection lack the column
async fn add_run_selection_column(pool: &SqlitePool) -> Result<()> {
    let has_column: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM pragma_table_info('analysis_runs') WHERE name = 'selection'",
    )
    .fetch_one(pool)
    .await?;

    if has_column > 0 {
        return Ok(());
    }

    sqlx::query("ALTER TABLE analysis_runs ADD COLUMN selection TEXT NOT NULL DEFAULT ''")
        .execute(pool)
        .await?;

    info!("Added selection column to analysis_runs");
    Ok(())
}
