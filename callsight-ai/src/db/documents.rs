//! Document store reads (representation A)
//!
//! Documents are written by the upstream ingester; the pipeline only pages
//! through the ones whose ingestion has finished.

use callsight_common::Result;
use sqlx::{FromRow, SqlitePool};

/// Status an ingested document carries once its transcript is available
pub const STATUS_COMPLETED: &str = "completed";

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct DocumentRow {
    pub id: String,
    /// External recording reference, when the ingester indexed one
    pub source_id: Option<String>,
    pub title: Option<String>,
    pub content: Option<String>,
    pub status: String,
}

/// Load one keyset page of documents eligible for analysis, ordered by id
pub async fn load_eligible_page(
    pool: &SqlitePool,
    after_id: Option<&str>,
    page_size: usize,
) -> Result<Vec<DocumentRow>> {
    let rows = sqlx::query_as::<_, DocumentRow>(
        r#"
        SELECT id, source_id, title, content, status
        FROM documents
        WHERE status = ?
          AND (? IS NULL OR id > ?)
        ORDER BY id
        LIMIT ?
        "#,
    )
    .bind(STATUS_COMPLETED)
    .bind(after_id)
    .bind(after_id)
    .bind(page_size as i64)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Load a document by id
pub async fn load_document(pool: &SqlitePool, id: &str) -> Result<Option<DocumentRow>> {
    let row = sqlx::query_as::<_, DocumentRow>(
        "SELECT id, source_id, title, content, status FROM documents WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Insert or replace a document (ingestion side; used by tooling and tests)
pub async fn save_document(pool: &SqlitePool, doc: &DocumentRow) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO documents (id, source_id, title, content, status)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            source_id = excluded.source_id,
            title = excluded.title,
            content = excluded.content,
            status = excluded.status
        "#,
    )
    .bind(&doc.id)
    .bind(&doc.source_id)
    .bind(&doc.title)
    .bind(&doc.content)
    .bind(&doc.status)
    .execute(pool)
    .await?;

    Ok(())
}
