//! State reconciliation
//!
//! Writes one normalized result into both representations of a call:
//! the flattened call log row (keyed by recording reference) and the
//! document's metadata entries. Fields the result does not supply keep
//! whatever the row already held, so operator-entered data survives
//! re-analysis.
//!
//! For a document record the call log row, the metadata and the completion
//! marker commit in one transaction. A failure anywhere rolls all three back,
//! so neither selection signal claims the record and the next run picks it up
//! again. This module is the only writer of completion markers.

use crate::db;
use crate::db::call_logs::CallLogRow;
use crate::models::{AnalysisResult, RecordOrigin, SourceRecord};
use crate::services::batch_orchestrator::Reconcile;
use crate::utils::retry_on_lock;
use async_trait::async_trait;
use callsight_common::Result;
use sqlx::SqlitePool;
use tracing::debug;

pub struct StateReconciler {
    db: SqlitePool,
    max_lock_wait_ms: u64,
}

impl StateReconciler {
    pub fn new(db: SqlitePool, max_lock_wait_ms: u64) -> Self {
        Self { db, max_lock_wait_ms }
    }

    /// Merge `result` into the stores for `record`; safe to repeat
    pub async fn reconcile(&self, record: &SourceRecord, result: &AnalysisResult) -> Result<()> {
        let analyzed_at = chrono::Utc::now().to_rfc3339();

        let call_log = match record.recording_ref.as_deref() {
            Some(recording_id) => {
                let existing = db::call_logs::load_by_recording(&self.db, recording_id).await?;
                Some(merge_call_log(existing, recording_id, record, result, &analyzed_at))
            }
            None => None,
        };

        // Pseudo-records from the call log have no document half and no marker
        let document_id = match record.origin {
            RecordOrigin::Document => record.document_id.as_deref(),
            RecordOrigin::Reanalysis => None,
        };
        let Some(document_id) = document_id else {
            if let Some(row) = &call_log {
                retry_on_lock("upsert call log", self.max_lock_wait_ms, || async {
                    db::call_logs::upsert(&self.db, row).await
                })
                .await?;
            }
            debug!(record_id = %record.id, "Reconciled reanalysis record");
            return Ok(());
        };

        let fields = metadata_fields(result, &analyzed_at);
        let marker = if result.degraded {
            db::markers::MARKER_DEGRADED
        } else {
            db::markers::MARKER_COMPLETED
        };

        retry_on_lock("reconcile document", self.max_lock_wait_ms, || async {
            let mut tx = self.db.begin().await?;
            if let Some(row) = &call_log {
                db::call_logs::upsert_in_tx(&mut tx, row).await?;
            }
            db::metadata::replace_fields_in_tx(&mut tx, document_id, &fields).await?;
            db::markers::upsert_marker_in_tx(&mut tx, document_id, marker).await?;
            tx.commit().await?;
            Ok(())
        })
        .await?;

        debug!(record_id = %record.id, marker, "Reconciled document record");
        Ok(())
    }
}

#[async_trait]
impl Reconcile for StateReconciler {
    async fn reconcile(&self, record: &SourceRecord, result: &AnalysisResult) -> Result<()> {
        StateReconciler::reconcile(self, record, result).await
    }
}

/// Existing row overlaid with the supplied parts of `result`
///
/// Both tag columns are set from the same list in one place.
pub fn merge_call_log(
    existing: Option<CallLogRow>,
    recording_id: &str,
    record: &SourceRecord,
    result: &AnalysisResult,
    analyzed_at: &str,
) -> CallLogRow {
    let mut row = existing.unwrap_or_else(|| CallLogRow::new(recording_id));

    if let Some(document_id) = &record.document_id {
        row.document_id = Some(document_id.clone());
    }
    if record.has_transcript() {
        row.transcript = Some(record.transcript.clone());
    }

    overwrite(&mut row.summary, &result.summary);
    overwrite(&mut row.coaching, &result.coaching);
    if !result.tags.is_empty() {
        row.tags = Some(result.tags_joined());
        row.tags_array = Some(result.tags_json());
    }
    if result.sentiment.is_some() {
        row.sentiment = result.sentiment;
    }
    row.resolution_status = Some(result.resolution_status.as_str().to_string());
    if result.escalated.is_some() {
        row.escalated = result.escalated;
    }
    overwrite(&mut row.call_type, &result.call_type);
    if let Some(persona) = &result.persona {
        row.persona = Some(persona.to_string());
    }
    row.analyzed_at = Some(analyzed_at.to_string());

    row
}

fn overwrite(slot: &mut Option<String>, value: &Option<String>) {
    if let Some(value) = value {
        *slot = Some(value.clone());
    }
}

/// Metadata entries for the fields `result` supplies
pub fn metadata_fields(result: &AnalysisResult, analyzed_at: &str) -> Vec<(String, String)> {
    let mut fields: Vec<(String, String)> = Vec::new();
    let mut push = |name: &str, value: String| fields.push((name.to_string(), value));

    if let Some(summary) = &result.summary {
        push("summary", summary.clone());
    }
    if let Some(coaching) = &result.coaching {
        push("coaching", coaching.clone());
    }
    if !result.tags.is_empty() {
        push("tags", result.tags_json());
    }
    if let Some(sentiment) = result.sentiment {
        push("sentiment", sentiment.to_string());
    }
    push("resolution_status", result.resolution_status.as_str().to_string());
    if let Some(escalated) = result.escalated {
        push("escalated", escalated.to_string());
    }
    if let Some(call_type) = &result.call_type {
        push("call_type", call_type.clone());
    }
    if let Some(persona) = &result.persona {
        push("persona", persona.to_string());
    }
    push("analyzed_at", analyzed_at.to_string());

    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::documents::DocumentRow;
    use crate::models::ResolutionStatus;
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

    async fn seed_document(pool: &SqlitePool, id: &str) {
        db::documents::save_document(
            pool,
            &DocumentRow {
                id: id.to_string(),
                source_id: Some(format!("rec-{}", id)),
                title: None,
                content: Some("transcript".to_string()),
                status: "completed".to_string(),
            },
        )
        .await
        .unwrap();
    }

    fn result_with(summary: &str, tags: &[&str]) -> AnalysisResult {
        AnalysisResult {
            summary: Some(summary.to_string()),
            coaching: None,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            sentiment: Some(8),
            resolution_status: ResolutionStatus::Resolved,
            escalated: None,
            call_type: None,
            persona: None,
            degraded: false,
        }
    }

    #[tokio::test]
    async fn test_dual_write_and_marker() {
        let pool = test_pool().await;
        seed_document(&pool, "doc-1").await;
        let record = SourceRecord::from_document("doc-1".into(), Some("rec-doc-1".into()), None, "hi".into());

        let reconciler = StateReconciler::new(pool.clone(), 1000);
        reconciler
            .reconcile(&record, &result_with("first", &["billing", "refund"]))
            .await
            .unwrap();

        let row = db::call_logs::load_by_recording(&pool, "rec-doc-1").await.unwrap().unwrap();
        assert_eq!(row.tags.as_deref(), Some("billing,refund"));
        assert_eq!(row.tag_list(), vec!["billing", "refund"]);
        assert_eq!(row.document_id.as_deref(), Some("doc-1"));
        assert_eq!(row.transcript.as_deref(), Some("hi"));

        let fields = db::metadata::load_fields(&pool, "doc-1").await.unwrap();
        assert!(fields.contains(&("summary".to_string(), Some("first".to_string()))));
        assert_eq!(
            db::markers::get_marker(&pool, "doc-1").await.unwrap().as_deref(),
            Some("completed")
        );
    }

    #[tokio::test]
    async fn test_repeat_is_idempotent() {
        let pool = test_pool().await;
        seed_document(&pool, "doc-1").await;
        let record = SourceRecord::from_document("doc-1".into(), Some("rec-doc-1".into()), None, "hi".into());
        let reconciler = StateReconciler::new(pool.clone(), 1000);

        reconciler.reconcile(&record, &result_with("first", &["a"])).await.unwrap();
        reconciler.reconcile(&record, &result_with("second", &["b"])).await.unwrap();

        let summaries: Vec<_> = db::metadata::load_fields(&pool, "doc-1")
            .await
            .unwrap()
            .into_iter()
            .filter(|(name, _)| name == "summary")
            .collect();
        assert_eq!(summaries, vec![("summary".to_string(), Some("second".to_string()))]);
        assert_eq!(db::markers::count_markers(&pool, "doc-1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_merge_preserves_unsupplied_fields() {
        let pool = test_pool().await;
        let mut existing = CallLogRow::new("rec-9");
        existing.coaching = Some("Slow down".to_string());
        existing.agent_name = Some("Dana".to_string());
        existing.operator_notes = Some("VIP caller".to_string());
        existing.call_type = Some("sales".to_string());
        existing.tags = Some("old".to_string());
        existing.tags_array = Some(r#"["old"]"#.to_string());
        db::call_logs::upsert(&pool, &existing).await.unwrap();

        let record = SourceRecord::for_reanalysis("rec-9".into(), None, "transcript".into());
        StateReconciler::new(pool.clone(), 1000)
            .reconcile(&record, &result_with("new summary", &[]))
            .await
            .unwrap();

        let row = db::call_logs::load_by_recording(&pool, "rec-9").await.unwrap().unwrap();
        assert_eq!(row.summary.as_deref(), Some("new summary"));
        assert_eq!(row.coaching.as_deref(), Some("Slow down"));
        assert_eq!(row.agent_name.as_deref(), Some("Dana"));
        assert_eq!(row.operator_notes.as_deref(), Some("VIP caller"));
        assert_eq!(row.call_type.as_deref(), Some("sales"));
        assert_eq!(row.tag_list(), vec!["old"]);
        assert_eq!(row.sentiment, Some(8));
    }

    #[tokio::test]
    async fn test_degraded_result_marks_degraded() {
        let pool = test_pool().await;
        seed_document(&pool, "doc-2").await;
        let record = SourceRecord::from_document("doc-2".into(), None, None, "hi".into());

        StateReconciler::new(pool.clone(), 1000)
            .reconcile(&record, &AnalysisResult::degraded())
            .await
            .unwrap();

        assert_eq!(
            db::markers::get_marker(&pool, "doc-2").await.unwrap().as_deref(),
            Some("degraded")
        );
        // No recording reference: no call log row was created
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM call_logs")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_metadata_failure_leaves_record_unmarked() {
        let pool = test_pool().await;
        // No documents row: the metadata foreign key rejects the write
        let record = SourceRecord::from_document("ghost".into(), Some("rec-ghost".into()), None, "hi".into());

        let outcome = StateReconciler::new(pool.clone(), 100)
            .reconcile(&record, &result_with("s", &["a"]))
            .await;

        assert!(outcome.is_err());
        assert_eq!(db::markers::get_marker(&pool, "ghost").await.unwrap(), None);
        assert!(db::call_logs::load_by_recording(&pool, "rec-ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_metadata_failure_rolls_back_call_log_and_record_is_reselected() {
        use crate::models::{SelectionMode, SelectionQuery};
        use crate::services::record_selector::RecordSelector;

        let pool = test_pool().await;
        seed_document(&pool, "doc-1").await;
        sqlx::query(
            "CREATE TRIGGER reject_metadata BEFORE INSERT ON document_metadata \
             BEGIN SELECT RAISE(ABORT, 'metadata store unavailable'); END",
        )
        .execute(&pool)
        .await
        .unwrap();

        let record = SourceRecord::from_document("doc-1".into(), Some("rec-doc-1".into()), None, "hi".into());
        let outcome = StateReconciler::new(pool.clone(), 100)
            .reconcile(&record, &result_with("s", &["a"]))
            .await;

        assert!(outcome.is_err());
        assert_eq!(db::markers::get_marker(&pool, "doc-1").await.unwrap(), None);
        assert!(db::call_logs::load_by_recording(&pool, "rec-doc-1").await.unwrap().is_none());

        sqlx::query("DROP TRIGGER reject_metadata").execute(&pool).await.unwrap();
        let reselected = RecordSelector::new(pool.clone(), 10)
            .select_work(SelectionQuery::new(SelectionMode::Normal))
            .await
            .unwrap();
        let ids: Vec<&str> = reselected.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["doc-1"]);
    }

    #[tokio::test]
    async fn test_existing_call_log_survives_failed_reconcile() {
        let pool = test_pool().await;
        seed_document(&pool, "doc-1").await;
        let mut existing = CallLogRow::new("rec-doc-1");
        existing.agent_name = Some("Dana".to_string());
        db::call_logs::upsert(&pool, &existing).await.unwrap();
        sqlx::query(
            "CREATE TRIGGER reject_marker BEFORE INSERT ON completion_markers \
             BEGIN SELECT RAISE(ABORT, 'marker store unavailable'); END",
        )
        .execute(&pool)
        .await
        .unwrap();

        let record = SourceRecord::from_document("doc-1".into(), Some("rec-doc-1".into()), None, "hi".into());
        let outcome = StateReconciler::new(pool.clone(), 100)
            .reconcile(&record, &result_with("s", &["a"]))
            .await;

        assert!(outcome.is_err());
        let row = db::call_logs::load_by_recording(&pool, "rec-doc-1").await.unwrap().unwrap();
        assert_eq!(row.summary, None);
        assert_eq!(row.agent_name.as_deref(), Some("Dana"));
        assert!(db::metadata::load_fields(&pool, "doc-1").await.unwrap().is_empty());
    }

    #[test]
    fn test_metadata_fields_only_supplied() {
        let mut result = result_with("s", &[]);
        result.sentiment = None;
        let names: Vec<String> = metadata_fields(&result, "now").into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["summary", "resolution_status", "analyzed_at"]);
    }
}
