//! Record selection
//!
//! Decides which records still need analysis and yields them lazily, one
//! keyset page of the store at a time.
//!
//! **Normal mode:** documents whose ingestion finished, minus those with a
//! completion marker, minus those whose recording reference already has an
//! analyzed call log row. Both signals are consulted; a record is selected only
//! when neither reports it done.
//!
//! **Reanalysis mode:** call log rows matching a filter, rebuilt as
//! pseudo-records from the stored transcript.

use crate::db;
use crate::models::{SelectionMode, SelectionQuery, SourceRecord};
use crate::services::join_key::{derive_recording_ref, JoinKeyDeriver};
use async_trait::async_trait;
use callsight_common::Result;
use sqlx::SqlitePool;
use std::collections::VecDeque;
use tracing::debug;

/// A lazily drained sequence of work
#[async_trait]
pub trait WorkSource: Send {
    /// Up to `max` records; an empty batch means the source is drained
    async fn next_batch(&mut self, max: usize) -> Result<Vec<SourceRecord>>;
}

/// Builds [`WorkCursor`]s over the stores
#[derive(Clone)]
pub struct RecordSelector {
    db: SqlitePool,
    page_size: usize,
    derive_key: JoinKeyDeriver,
}

impl RecordSelector {
    pub fn new(db: SqlitePool, page_size: usize) -> Self {
        Self {
            db,
            page_size: page_size.max(1),
            derive_key: derive_recording_ref,
        }
    }

    /// Replace the title → recording reference derivation
    pub fn with_join_key_deriver(mut self, derive_key: JoinKeyDeriver) -> Self {
        self.derive_key = derive_key;
        self
    }

    /// Open a cursor for `query`; nothing is read until the first batch is requested
    pub fn select(&self, query: SelectionQuery) -> WorkCursor {
        WorkCursor {
            db: self.db.clone(),
            page_size: self.page_size,
            derive_key: self.derive_key,
            mode: query.mode,
            remaining: query.limit,
            to_skip: query.offset,
            page_after: query.after_key,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    /// Drain a query into one list
    pub async fn select_work(&self, query: SelectionQuery) -> Result<Vec<SourceRecord>> {
        let mut cursor = self.select(query);
        let mut records = Vec::new();
        loop {
            let batch = cursor.next_batch(self.page_size).await?;
            if batch.is_empty() {
                return Ok(records);
            }
            records.extend(batch);
        }
    }
}

/// Position within one selection
pub struct WorkCursor {
    db: SqlitePool,
    page_size: usize,
    derive_key: JoinKeyDeriver,
    mode: SelectionMode,
    /// Records still allowed by the limit; None is unlimited
    remaining: Option<usize>,
    /// Eligible records still to skip for the offset
    to_skip: usize,
    /// Keyset position of the next store page
    page_after: Option<String>,
    buffer: VecDeque<SourceRecord>,
    exhausted: bool,
}

impl WorkCursor {
    /// Read the next store page, keeping only eligible records
    async fn fill(&mut self) -> Result<()> {
        let page = match &self.mode {
            SelectionMode::Normal => self.load_normal_page().await?,
            SelectionMode::Reanalysis(filter) => {
                let rows = db::call_logs::load_reanalysis_page(
                    &self.db,
                    filter,
                    self.page_after.as_deref(),
                    self.page_size,
                )
                .await?;
                self.advance(rows.len(), rows.last().map(|r| r.recording_id.clone()));
                rows.into_iter()
                    .map(|row| {
                        SourceRecord::for_reanalysis(
                            row.recording_id,
                            row.document_id,
                            row.transcript.unwrap_or_default(),
                        )
                    })
                    .collect()
            }
        };

        for record in page {
            if self.to_skip > 0 {
                self.to_skip -= 1;
                continue;
            }
            self.buffer.push_back(record);
        }
        Ok(())
    }

    async fn load_normal_page(&mut self) -> Result<Vec<SourceRecord>> {
        let docs =
            db::documents::load_eligible_page(&self.db, self.page_after.as_deref(), self.page_size).await?;
        self.advance(docs.len(), docs.last().map(|d| d.id.clone()));
        if docs.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = docs.iter().map(|d| d.id.clone()).collect();
        let marked = db::markers::load_marked(&self.db, &ids).await?;

        let candidates: Vec<SourceRecord> = docs
            .into_iter()
            .filter(|doc| !marked.contains(&doc.id))
            .map(|doc| {
                let recording_ref = doc
                    .source_id
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .or_else(|| doc.title.as_deref().and_then(self.derive_key));
                SourceRecord::from_document(doc.id, recording_ref, doc.title, doc.content.unwrap_or_default())
            })
            .collect();

        let refs: Vec<String> = candidates.iter().filter_map(|r| r.recording_ref.clone()).collect();
        let analyzed = db::call_logs::load_analyzed_refs(&self.db, &refs).await?;

        let total = ids.len();
        let selected: Vec<SourceRecord> = candidates
            .into_iter()
            .filter(|r| !r.recording_ref.as_ref().is_some_and(|key| analyzed.contains(key)))
            .collect();

        debug!(
            page = total,
            marked = marked.len(),
            analyzed = analyzed.len(),
            selected = selected.len(),
            "Selector page filtered"
        );
        Ok(selected)
    }

    fn advance(&mut self, fetched: usize, last_key: Option<String>) {
        if fetched < self.page_size {
            self.exhausted = true;
        }
        if last_key.is_some() {
            self.page_after = last_key;
        }
    }
}

#[async_trait]
impl WorkSource for WorkCursor {
    async fn next_batch(&mut self, max: usize) -> Result<Vec<SourceRecord>> {
        let want = match self.remaining {
            Some(remaining) => remaining.min(max),
            None => max,
        };
        if want == 0 {
            return Ok(Vec::new());
        }

        while self.buffer.len() < want && !self.exhausted {
            self.fill().await?;
        }

        let take = want.min(self.buffer.len());
        let batch: Vec<SourceRecord> = self.buffer.drain(..take).collect();
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= batch.len();
        }
        Ok(batch)
    }
}
