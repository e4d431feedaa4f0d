//! Call log rows (representation B)
//!
//! Flattened, one row per recording. Analysis columns are written by the
//! state reconciler; operator columns (agent, customer, notes, disposition)
//! are written by people and must survive re-analysis.

use crate::models::selection::integer_filter_value;
use crate::models::{FieldFilter, FilterOp, ReanalysisFilter};
use callsight_common::Result;
use sqlx::query::Query;
use sqlx::sqlite::SqliteArguments;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool, Transaction};
use std::collections::HashSet;

const CALL_LOG_COLUMNS: &str = "recording_id, document_id, transcript, summary, coaching, tags, \
     tags_array, sentiment, resolution_status, escalated, call_type, persona, agent_name, \
     customer_name, customer_phone, operator_notes, disposition, analyzed_at";

#[derive(Debug, Clone, Default, PartialEq, FromRow)]
pub struct CallLogRow {
    pub recording_id: String,
    pub document_id: Option<String>,
    pub transcript: Option<String>,
    pub summary: Option<String>,
    pub coaching: Option<String>,
    /// Comma-joined tags; always equals the join of `tags_array`
    pub tags: Option<String>,
    /// JSON array of tags
    pub tags_array: Option<String>,
    pub sentiment: Option<i64>,
    pub resolution_status: Option<String>,
    pub escalated: Option<bool>,
    pub call_type: Option<String>,
    /// JSON object
    pub persona: Option<String>,
    pub agent_name: Option<String>,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub operator_notes: Option<String>,
    pub disposition: Option<String>,
    pub analyzed_at: Option<String>,
}

impl CallLogRow {
    pub fn new(recording_id: impl Into<String>) -> Self {
        Self {
            recording_id: recording_id.into(),
            ..Default::default()
        }
    }

    /// Decoded `tags_array`; unreadable JSON reads as no tags
    pub fn tag_list(&self) -> Vec<String> {
        self.tags_array
            .as_deref()
            .and_then(|json| serde_json::from_str::<Vec<String>>(json).ok())
            .unwrap_or_default()
    }
}

/// Load the row for a recording; None when it does not exist yet
pub async fn load_by_recording(pool: &SqlitePool, recording_id: &str) -> Result<Option<CallLogRow>> {
    let row = sqlx::query_as::<_, CallLogRow>(&format!(
        "SELECT {} FROM call_logs WHERE recording_id = ?",
        CALL_LOG_COLUMNS
    ))
    .bind(recording_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Insert or fully overwrite a row keyed by recording id
///
/// Callers pass an already merged row; see the state reconciler.
pub async fn upsert(pool: &SqlitePool, row: &CallLogRow) -> Result<()> {
    upsert_query(row).execute(pool).await?;
    Ok(())
}

/// [`upsert`] inside a caller-owned transaction
pub async fn upsert_in_tx(tx: &mut Transaction<'_, Sqlite>, row: &CallLogRow) -> Result<()> {
    upsert_query(row).execute(&mut **tx).await?;
    Ok(())
}

fn upsert_query(row: &CallLogRow) -> Query<'_, Sqlite, SqliteArguments<'_>> {
    sqlx::query(
        r#"
        INSERT INTO call_logs (
            recording_id, document_id, transcript, summary, coaching, tags, tags_array,
            sentiment, resolution_status, escalated, call_type, persona, agent_name,
            customer_name, customer_phone, operator_notes, disposition, analyzed_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP)
        ON CONFLICT(recording_id) DO UPDATE SET
            document_id = excluded.document_id,
            transcript = excluded.transcript,
            summary = excluded.summary,
            coaching = excluded.coaching,
            tags = excluded.tags,
            tags_array = excluded.tags_array,
            sentiment = excluded.sentiment,
            resolution_status = excluded.resolution_status,
            escalated = excluded.escalated,
            call_type = excluded.call_type,
            persona = excluded.persona,
            agent_name = excluded.agent_name,
            customer_name = excluded.customer_name,
            customer_phone = excluded.customer_phone,
            operator_notes = excluded.operator_notes,
            disposition = excluded.disposition,
            analyzed_at = excluded.analyzed_at,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(&row.recording_id)
    .bind(&row.document_id)
    .bind(&row.transcript)
    .bind(&row.summary)
    .bind(&row.coaching)
    .bind(&row.tags)
    .bind(&row.tags_array)
    .bind(row.sentiment)
    .bind(&row.resolution_status)
    .bind(row.escalated)
    .bind(&row.call_type)
    .bind(&row.persona)
    .bind(&row.agent_name)
    .bind(&row.customer_name)
    .bind(&row.customer_phone)
    .bind(&row.operator_notes)
    .bind(&row.disposition)
    .bind(&row.analyzed_at)
}

/// Subset of `recording_ids` whose rows already hold an analysis
///
/// A row counts once it has a summary; rows created by operators before
/// analysis ran do not.
pub async fn load_analyzed_refs(pool: &SqlitePool, recording_ids: &[String]) -> Result<HashSet<String>> {
    if recording_ids.is_empty() {
        return Ok(HashSet::new());
    }

    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT recording_id FROM call_logs WHERE summary IS NOT NULL AND recording_id IN (",
    );
    let mut separated = query.separated(", ");
    for id in recording_ids {
        separated.push_bind(id);
    }
    separated.push_unseparated(")");

    let found = query
        .build_query_scalar::<String>()
        .fetch_all(pool)
        .await?;

    Ok(found.into_iter().collect())
}

/// Load one keyset page of rows matching a reanalysis filter, ordered by recording id
pub async fn load_reanalysis_page(
    pool: &SqlitePool,
    filter: &ReanalysisFilter,
    after_id: Option<&str>,
    page_size: usize,
) -> Result<Vec<CallLogRow>> {
    let mut query: QueryBuilder<Sqlite> =
        QueryBuilder::new(format!("SELECT {} FROM call_logs WHERE ", CALL_LOG_COLUMNS));

    match filter {
        ReanalysisFilter::EmptyTags => {
            query.push(
                "(CASE WHEN tags_array IS NULL OR TRIM(tags_array) = '' THEN 1 \
                 WHEN json_valid(tags_array) THEN json_array_length(tags_array) = 0 \
                 ELSE 0 END)",
            );
        }
        ReanalysisFilter::Field(field) => push_field_predicate(&mut query, field),
    }

    if let Some(after) = after_id {
        query.push(" AND recording_id > ");
        query.push_bind(after.to_string());
    }

    query.push(" ORDER BY recording_id LIMIT ");
    query.push_bind(page_size as i64);

    let rows = query.build_query_as::<CallLogRow>().fetch_all(pool).await?;
    Ok(rows)
}

fn push_field_predicate(query: &mut QueryBuilder<'_, Sqlite>, filter: &FieldFilter) {
    let column = filter.column.as_sql();
    let value = filter.value.clone().unwrap_or_default();

    let comparison = match filter.op {
        FilterOp::IsNull => {
            query.push(format!("{} IS NULL", column));
            return;
        }
        FilterOp::NotNull => {
            query.push(format!("{} IS NOT NULL", column));
            return;
        }
        FilterOp::Contains => {
            query.push(
                "(CASE WHEN json_valid(tags_array) THEN EXISTS \
                 (SELECT 1 FROM json_each(call_logs.tags_array) WHERE json_each.value = ",
            );
            query.push_bind(value);
            query.push(") ELSE 0 END)");
            return;
        }
        FilterOp::Overlaps => {
            query.push(
                "(CASE WHEN json_valid(tags_array) THEN EXISTS \
                 (SELECT 1 FROM json_each(call_logs.tags_array) WHERE json_each.value IN (",
            );
            let mut values = query.separated(", ");
            let wanted = filter.overlap_values();
            if wanted.is_empty() {
                values.push("NULL");
            }
            for tag in wanted {
                values.push_bind(tag);
            }
            values.push_unseparated(")) ELSE 0 END)");
            return;
        }
        FilterOp::Eq => "=",
        FilterOp::NotEq => "IS NOT",
        FilterOp::Lt => "<",
        FilterOp::Lte => "<=",
        FilterOp::Gt => ">",
        FilterOp::Gte => ">=",
        FilterOp::Like => "LIKE",
    };

    query.push(format!("{} {} ", column, comparison));
    if filter.column.is_integer() {
        query.push_bind(integer_filter_value(&value));
    } else {
        query.push_bind(value);
    }
}
