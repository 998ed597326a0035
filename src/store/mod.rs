pub mod postgres;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Note metadata as owned by the backend. Read-only here.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Note {
    pub id: String,
    pub title: String,
    pub source_url: Option<String>,
    /// Content type hint when the backend knows it (e.g. a file's mime type).
    pub kind: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TranscriptSegment {
    pub note_id: String,
    pub start_sec: f64,
    pub end_sec: f64,
    pub text: String,
}

/// Read access to the relational store that holds notes and transcripts.
#[async_trait]
pub trait NoteStore: Send + Sync {
    async fn get_note(&self, note_id: &str) -> Result<Option<Note>>;

    /// Segments ordered by start time.
    async fn get_transcripts(&self, note_id: &str) -> Result<Vec<TranscriptSegment>>;
}

/// Stable sort by start time; guards the ordering invariant against stores
/// that return rows unordered.
pub fn order_segments(mut segments: Vec<TranscriptSegment>) -> Vec<TranscriptSegment> {
    segments.sort_by(|a, b| a.start_sec.total_cmp(&b.start_sec));
    segments
}
