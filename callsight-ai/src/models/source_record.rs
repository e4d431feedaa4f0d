//! Source records: the transcripts the pipeline reads

use serde::{Deserialize, Serialize};

/// Where a record was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordOrigin {
    /// Ingested document (has document metadata and can carry a completion marker)
    Document,
    /// Pseudo-record built from an already-stored call log row
    Reanalysis,
}

/// One transcript plus identifying fields
///
/// `id` is the stable key used to correlate results and to order/resume
/// selection: the document id for [`RecordOrigin::Document`], the recording
/// reference for [`RecordOrigin::Reanalysis`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub id: String,
    pub document_id: Option<String>,
    /// External recording reference, the call log key
    pub recording_ref: Option<String>,
    pub title: Option<String>,
    pub transcript: String,
    pub origin: RecordOrigin,
}

impl SourceRecord {
    /// Record backed by an ingested document
    pub fn from_document(
        document_id: String,
        recording_ref: Option<String>,
        title: Option<String>,
        transcript: String,
    ) -> Self {
        Self {
            id: document_id.clone(),
            document_id: Some(document_id),
            recording_ref,
            title,
            transcript,
            origin: RecordOrigin::Document,
        }
    }

    /// Pseudo-record rebuilt from a call log row
    pub fn for_reanalysis(recording_ref: String, document_id: Option<String>, transcript: String) -> Self {
        Self {
            id: recording_ref.clone(),
            document_id,
            recording_ref: Some(recording_ref),
            title: None,
            transcript,
            origin: RecordOrigin::Reanalysis,
        }
    }

    pub fn is_reanalysis(&self) -> bool {
        self.origin == RecordOrigin::Reanalysis
    }

    /// Whitespace-only transcripts count as empty
    pub fn has_transcript(&self) -> bool {
        !self.transcript.trim().is_empty()
    }
}
