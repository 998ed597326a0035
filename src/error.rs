use thiserror::Error;

/// Failure taxonomy shared by every pipeline stage.
///
/// Callers match on the variant instead of inspecting messages: `NotFound` and
/// `Extraction` are terminal for the given note, `Transient` means an upstream
/// call (download, OCR, embedding, completion) failed or timed out.
#[derive(Debug, Error)]
pub enum RagError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("extraction failed: {0}")]
    Extraction(String),
    #[error("upstream call failed: {0}")]
    Transient(String),
    #[error("validation failed: {0}")]
    Validation(String),
}

impl RagError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, RagError::Transient(_))
    }
}

impl From<reqwest::Error> for RagError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            RagError::Transient(format!("request timed out: {e}"))
        } else {
            RagError::Transient(e.to_string())
        }
    }
}

impl From<sqlx::Error> for RagError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => RagError::NotFound("row not found".to_string()),
            other => RagError::Transient(format!("database error: {other}")),
        }
    }
}

pub type Result<T> = std::result::Result<T, RagError>;
