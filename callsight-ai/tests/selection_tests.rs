//! Record selection against a file-backed database

mod helpers;

use callsight_ai::db;
use callsight_ai::db::call_logs::CallLogRow;
use callsight_ai::models::{ReanalysisFilter, SelectionMode, SelectionQuery};
use callsight_ai::services::RecordSelector;
use helpers::{create_test_db, seed_call_logs, seed_documents};
use std::collections::HashSet;

#[tokio::test]
async fn test_offset_pages_have_no_gap_or_overlap() {
    let (_dir, pool) = create_test_db().await.unwrap();
    let all_ids = seed_documents(&pool, 15).await.unwrap();
    let selector = RecordSelector::new(pool.clone(), 4);

    let first = selector
        .select_work(SelectionQuery::new(SelectionMode::Normal).with_limit(10))
        .await
        .unwrap();
    let second = selector
        .select_work(SelectionQuery::new(SelectionMode::Normal).with_limit(10).with_offset(10))
        .await
        .unwrap();

    assert_eq!(first.len(), 10);
    assert_eq!(second.len(), 5);

    let first_ids: HashSet<String> = first.into_iter().map(|r| r.id).collect();
    let second_ids: HashSet<String> = second.into_iter().map(|r| r.id).collect();
    assert!(first_ids.is_disjoint(&second_ids));
    let union: HashSet<String> = first_ids.union(&second_ids).cloned().collect();
    assert_eq!(union, all_ids.into_iter().collect::<HashSet<_>>());
}

#[tokio::test]
async fn test_either_signal_excludes_a_document() {
    let (_dir, pool) = create_test_db().await.unwrap();
    seed_documents(&pool, 4).await.unwrap();

    // doc-00 marked only; doc-01 analyzed in the call log only
    db::markers::upsert_marker(&pool, "doc-00", "completed").await.unwrap();
    let mut analyzed = CallLogRow::new("rec-01");
    analyzed.summary = Some("previous analysis".to_string());
    db::call_logs::upsert(&pool, &analyzed).await.unwrap();

    let records = RecordSelector::new(pool.clone(), 10)
        .select_work(SelectionQuery::new(SelectionMode::Normal))
        .await
        .unwrap();

    let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["doc-02", "doc-03"]);
}

#[tokio::test]
async fn test_tag_containment_and_overlap_filters() {
    let (_dir, pool) = create_test_db().await.unwrap();
    for (id, tags) in [("rec-a", vec!["billing"]), ("rec-b", vec!["refund", "escalation"]), ("rec-c", vec![])] {
        let mut row = CallLogRow::new(id);
        row.transcript = Some("t".to_string());
        row.tags = Some(tags.join(","));
        row.tags_array = Some(serde_json::to_string(&tags).unwrap());
        db::call_logs::upsert(&pool, &row).await.unwrap();
    }
    let selector = RecordSelector::new(pool.clone(), 10);

    let contains = selector
        .select_work(SelectionQuery::new(SelectionMode::Reanalysis(ReanalysisFilter::Field(
            "tags:contains:refund".parse().unwrap(),
        ))))
        .await
        .unwrap();
    assert_eq!(contains.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(), vec!["rec-b"]);

    let overlaps = selector
        .select_work(SelectionQuery::new(SelectionMode::Reanalysis(ReanalysisFilter::Field(
            "tags:overlaps:billing,escalation".parse().unwrap(),
        ))))
        .await
        .unwrap();
    assert_eq!(
        overlaps.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
        vec!["rec-a", "rec-b"]
    );
}

#[tokio::test]
async fn test_reanalysis_limit_with_resume_key() {
    let (_dir, pool) = create_test_db().await.unwrap();
    seed_call_logs(&pool, 6, "Sam").await.unwrap();

    let records = RecordSelector::new(pool.clone(), 2)
        .select_work(
            SelectionQuery::new(SelectionMode::Reanalysis(ReanalysisFilter::Field(
                "agent_name:eq:Sam".parse().unwrap(),
            )))
            .after("rec-01")
            .with_limit(3),
        )
        .await
        .unwrap();

    let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["rec-02", "rec-03", "rec-04"]);
}
