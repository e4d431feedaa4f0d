//! Document metadata (key/value entries attached to a document)

use callsight_common::Result;
use sqlx::{QueryBuilder, Sqlite, SqlitePool, Transaction};

/// Replace the named metadata fields of a document
///
/// Delete-then-insert inside one transaction: every prior entry with one of
/// the given names goes away, duplicates included, before the new values land.
pub async fn replace_fields(
    pool: &SqlitePool,
    document_id: &str,
    fields: &[(String, String)],
) -> Result<()> {
    if fields.is_empty() {
        return Ok(());
    }

    let mut tx = pool.begin().await?;
    replace_fields_in_tx(&mut tx, document_id, fields).await?;
    tx.commit().await?;
    Ok(())
}

/// [`replace_fields`] inside a caller-owned transaction
pub async fn replace_fields_in_tx(
    tx: &mut Transaction<'_, Sqlite>,
    document_id: &str,
    fields: &[(String, String)],
) -> Result<()> {
    if fields.is_empty() {
        return Ok(());
    }

    let mut delete: QueryBuilder<Sqlite> =
        QueryBuilder::new("DELETE FROM document_metadata WHERE document_id = ");
    delete.push_bind(document_id);
    delete.push(" AND field_name IN (");
    let mut names = delete.separated(", ");
    for (name, _) in fields {
        names.push_bind(name);
    }
    names.push_unseparated(")");
    delete.build().execute(&mut **tx).await?;

    let mut insert: QueryBuilder<Sqlite> =
        QueryBuilder::new("INSERT INTO document_metadata (document_id, field_name, field_value) ");
    insert.push_values(fields, |mut row, (name, value)| {
        row.push_bind(document_id).push_bind(name).push_bind(value);
    });
    insert.build().execute(&mut **tx).await?;

    Ok(())
}

/// All metadata entries of a document, oldest first
pub async fn load_fields(pool: &SqlitePool, document_id: &str) -> Result<Vec<(String, Option<String>)>> {
    let rows = sqlx::query_as::<_, (String, Option<String>)>(
        "SELECT field_name, field_value FROM document_metadata WHERE document_id = ? ORDER BY id",
    )
    .bind(document_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Append a single entry without replacing (ingestion side; used by tooling and tests)
pub async fn insert_field(pool: &SqlitePool, document_id: &str, name: &str, value: &str) -> Result<()> {
    sqlx::query("INSERT INTO document_metadata (document_id, field_name, field_value) VALUES (?, ?, ?)")
        .bind(document_id)
        .bind(name)
        .bind(value)
        .execute(pool)
        .await?;
    Ok(())
}
