use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};

use super::{order_segments, Note, NoteStore, TranscriptSegment};
use crate::error::{RagError, Result};

/// Reads the backend's Prisma tables directly.
pub struct PgNoteStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct NoteRow {
    id: String,
    title: String,
    source_url: Option<String>,
}

#[derive(sqlx::FromRow)]
struct PdfFileRow {
    url: String,
    file_type: Option<String>,
}

#[derive(sqlx::FromRow)]
struct SegmentRow {
    start_sec: f64,
    end_sec: f64,
    text: String,
}

impl PgNoteStore {
    /// The pool connects on first use so the service can start before the database.
    pub fn connect_lazy(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(database_url)
            .map_err(|e| RagError::Validation(format!("invalid DATABASE_URL: {e}")))?;
        Ok(Self { pool })
    }

    async fn first_pdf_file(&self, note_id: &str) -> Result<Option<PdfFileRow>> {
        let row = sqlx::query_as::<_, PdfFileRow>(
            r#"SELECT url, "fileType" AS file_type FROM "File"
               WHERE "noteId" = $1 AND "fileType" LIKE '%pdf%'
               LIMIT 1"#,
        )
        .bind(note_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}

#[async_trait]
impl NoteStore for PgNoteStore {
    async fn get_note(&self, note_id: &str) -> Result<Option<Note>> {
        let row = sqlx::query_as::<_, NoteRow>(
            r#"SELECT id, title, "sourceFileUrl" AS source_url FROM "LectureNote" WHERE id = $1"#,
        )
        .bind(note_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut note = Note {
            id: row.id,
            title: row.title,
            source_url: row.source_url.filter(|u| !u.trim().is_empty()),
            kind: None,
        };

        if note.source_url.is_none() {
            if let Some(file) = self.first_pdf_file(note_id).await? {
                tracing::debug!(note_id, url = %file.url, "Using attached PDF file as note source");
                note.source_url = Some(file.url);
                note.kind = file.file_type;
            }
        }

        Ok(Some(note))
    }

    async fn get_transcripts(&self, note_id: &str) -> Result<Vec<TranscriptSegment>> {
        let rows = sqlx::query_as::<_, SegmentRow>(
            r#"SELECT "startSec"::float8 AS start_sec, "endSec"::float8 AS end_sec, text
               FROM "TranscriptSegment"
               WHERE "noteId" = $1
               ORDER BY "startSec" ASC"#,
        )
        .bind(note_id)
        .fetch_all(&self.pool)
        .await?;

        let segments = rows
            .into_iter()
            .map(|r| TranscriptSegment {
                note_id: note_id.to_string(),
                start_sec: r.start_sec,
                end_sec: r.end_sec,
                text: r.text,
            })
            .collect();
        Ok(order_segments(segments))
    }
}
