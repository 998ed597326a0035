use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::store::{Note, NoteStore};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Pdf,
    Transcript,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResolvedSource {
    Pdf { url: String },
    Transcript,
}

impl ResolvedSource {
    pub fn kind(&self) -> SourceKind {
        match self {
            ResolvedSource::Pdf { .. } => SourceKind::Pdf,
            ResolvedSource::Transcript => SourceKind::Transcript,
        }
    }
}

/// URL heuristic: direct `.pdf` links, storage `download` endpoints, or anything
/// mentioning pdf.
pub fn classify_url(url: &str) -> SourceKind {
    if url.ends_with(".pdf") || url.contains("download") || url.to_lowercase().contains("pdf") {
        SourceKind::Pdf
    } else {
        SourceKind::Transcript
    }
}

pub fn classify_note(note: &Note) -> ResolvedSource {
    let Some(url) = note.source_url.as_deref().map(str::trim).filter(|u| !u.is_empty()) else {
        return ResolvedSource::Transcript;
    };

    let declared_pdf = note
        .kind
        .as_deref()
        .is_some_and(|k| k.to_lowercase().contains("pdf"));

    if declared_pdf || classify_url(url) == SourceKind::Pdf {
        ResolvedSource::Pdf { url: url.to_string() }
    } else {
        ResolvedSource::Transcript
    }
}

pub async fn resolve(store: &dyn NoteStore, note_id: &str) -> Result<ResolvedSource> {
    let note = store
        .get_note(note_id)
        .await?
        .ok_or_else(|| RagError::NotFound(format!("note '{note_id}' does not exist")))?;

    let source = classify_note(&note);
    let kind = source.kind();
    match &source {
        ResolvedSource::Pdf { url } => {
            tracing::info!(note_id, ?kind, %url, "Resolved note source")
        }
        ResolvedSource::Transcript => {
            tracing::info!(note_id, ?kind, "Resolved note source, no PDF attached")
        }
    }
    Ok(source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeStore;

    fn note(url: Option<&str>, kind: Option<&str>) -> Note {
        Note {
            id: "n1".into(),
            title: "Lecture".into(),
            source_url: url.map(str::to_string),
            kind: kind.map(str::to_string),
        }
    }

    #[test]
    fn url_heuristic() {
        assert_eq!(classify_url("https://cdn.example.com/slides.pdf"), SourceKind::Pdf);
        assert_eq!(classify_url("https://api.example.com/files/42/download"), SourceKind::Pdf);
        assert_eq!(classify_url("https://example.com/Week3.PDF"), SourceKind::Pdf);
        assert_eq!(classify_url("https://example.com/doc?type=application%2Fpdf"), SourceKind::Pdf);
        assert_eq!(classify_url("https://example.com/audio/lecture.mp3"), SourceKind::Transcript);
    }

    #[test]
    fn missing_or_blank_url_means_transcript() {
        assert_eq!(classify_note(&note(None, None)), ResolvedSource::Transcript);
        let blank = note(Some("  "), Some("application/pdf"));
        assert_eq!(classify_note(&blank), ResolvedSource::Transcript);
    }

    #[test]
    fn declared_pdf_kind_wins_over_opaque_url() {
        let opaque = "https://s3.example.com/obj/8f3a";
        let source = classify_note(&note(Some(opaque), Some("application/pdf")));
        assert_eq!(source, ResolvedSource::Pdf { url: "https://s3.example.com/obj/8f3a".into() });
        assert_eq!(
            classify_note(&note(Some("https://s3.example.com/obj/8f3a"), None)),
            ResolvedSource::Transcript
        );
    }

    #[tokio::test]
    async fn unknown_note_is_not_found() {
        let store = FakeStore::default();
        let err = resolve(&store, "missing").await.unwrap_err();
        assert!(matches!(err, RagError::NotFound(_)));
    }

    #[tokio::test]
    async fn resolves_pdf_note() {
        let store = FakeStore::default().with_note(note(Some("https://x.test/a.pdf"), None));
        let source = resolve(&store, "n1").await.unwrap();
        assert_eq!(source.kind(), SourceKind::Pdf);
    }
}
