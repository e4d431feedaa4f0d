//! Completion markers
//!
//! One row per document. The state reconciler is the only writer.

use callsight_common::Result;
use sqlx::query::Query;
use sqlx::sqlite::SqliteArguments;
use sqlx::{QueryBuilder, Sqlite, SqlitePool, Transaction};
use std::collections::HashSet;

/// Marker value for a record whose analysis succeeded
pub const MARKER_COMPLETED: &str = "completed";
/// Marker value for a record that received the degraded placeholder
pub const MARKER_DEGRADED: &str = "degraded";

/// Set (or update in place) the completion marker for a document
///
/// Single statement, so there is no window between "check" and "write".
pub async fn upsert_marker(pool: &SqlitePool, document_id: &str, value: &str) -> Result<()> {
    upsert_query(document_id, value).execute(pool).await?;
    Ok(())
}

/// [`upsert_marker`] inside a caller-owned transaction
pub async fn upsert_marker_in_tx(
    tx: &mut Transaction<'_, Sqlite>,
    document_id: &str,
    value: &str,
) -> Result<()> {
    upsert_query(document_id, value).execute(&mut **tx).await?;
    Ok(())
}

fn upsert_query<'q>(document_id: &'q str, value: &'q str) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    sqlx::query(
        r#"
        INSERT INTO completion_markers (document_id, value, marked_at)
        VALUES (?, ?, ?)
        ON CONFLICT(document_id) DO UPDATE SET
            value = excluded.value,
            marked_at = excluded.marked_at
        "#,
    )
    .bind(document_id)
    .bind(value)
    .bind(chrono::Utc::now().to_rfc3339())
}

/// Marker value for a document, None when unmarked
pub async fn get_marker(pool: &SqlitePool, document_id: &str) -> Result<Option<String>> {
    let value = sqlx::query_scalar::<_, String>(
        "SELECT value FROM completion_markers WHERE document_id = ?",
    )
    .bind(document_id)
    .fetch_optional(pool)
    .await?;

    Ok(value)
}

/// Subset of `document_ids` that carry a marker
pub async fn load_marked(pool: &SqlitePool, document_ids: &[String]) -> Result<HashSet<String>> {
    if document_ids.is_empty() {
        return Ok(HashSet::new());
    }

    let mut query: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT document_id FROM completion_markers WHERE document_id IN (");
    let mut separated = query.separated(", ");
    for id in document_ids {
        separated.push_bind(id);
    }
    separated.push_unseparated(")");

    let marked = query
        .build_query_scalar::<String>()
        .fetch_all(pool)
        .await?;

    Ok(marked.into_iter().collect())
}

/// Number of marker rows for a document (0 or 1 under the primary key)
pub async fn count_markers(pool: &SqlitePool, document_id: &str) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM completion_markers WHERE document_id = ?")
        .bind(document_id)
        .fetch_one(pool)
        .await?;
    Ok(count)
}
