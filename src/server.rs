use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::error::RagError;
use crate::service::summarize::{MAX_LINES, MIN_LINES};
use crate::service::{AiService, QuizItem, MAX_QUIZ_COUNT, MIN_QUIZ_COUNT};

type AppState = Arc<AiService>;

fn default_true() -> bool {
    true
}

fn default_lines() -> usize {
    3
}

fn default_count() -> usize {
    5
}

#[derive(Deserialize)]
pub struct AskRequest {
    pub note_id: String,
    pub question: String,
    #[serde(default = "default_true")]
    pub use_pdf: bool,
}

#[derive(Deserialize)]
pub struct SummaryRequest {
    pub note_id: String,
    #[serde(default = "default_lines")]
    pub lines: usize,
    #[serde(default = "default_true")]
    pub use_pdf: bool,
}

#[derive(Deserialize)]
pub struct QuizRequest {
    pub note_id: String,
    #[serde(default = "default_count")]
    pub count: usize,
    #[serde(default = "default_true")]
    pub use_pdf: bool,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct AskResponse {
    pub answer: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct SummaryResponse {
    pub summary: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct QuizResponse {
    pub quizzes: Vec<QuizItem>,
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

impl RagError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RagError::NotFound(_) => StatusCode::NOT_FOUND,
            RagError::Extraction(_) => StatusCode::UNPROCESSABLE_ENTITY,
            RagError::Validation(_) => StatusCode::BAD_REQUEST,
            RagError::Transient(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for RagError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if self.is_retryable() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::warn!("Request rejected: {}", self);
        }
        (status, Json(ErrorBody { detail: self.to_string() })).into_response()
    }
}

pub fn router(service: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/ai/ask", post(ask))
        .route("/api/ai/summary", post(summary))
        .route("/api/ai/quiz", post(quiz))
        .layer(CorsLayer::permissive())
        .with_state(service)
}

async fn root() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".into(),
        message: "NoteRag AI service is running".into(),
    })
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".into(),
        message: "OK".into(),
    })
}

async fn ask(
    State(service): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<Json<AskResponse>, RagError> {
    let answer = service.ask(&req.note_id, &req.question, req.use_pdf).await?;
    Ok(Json(AskResponse { answer }))
}

async fn summary(
    State(service): State<AppState>,
    Json(req): Json<SummaryRequest>,
) -> Result<Json<SummaryResponse>, RagError> {
    check_range("lines", req.lines, MIN_LINES, MAX_LINES)?;
    let summary = service.summarize(&req.note_id, req.lines, req.use_pdf).await?;
    Ok(Json(SummaryResponse { summary }))
}

async fn quiz(
    State(service): State<AppState>,
    Json(req): Json<QuizRequest>,
) -> Result<Json<QuizResponse>, RagError> {
    check_range("count", req.count, MIN_QUIZ_COUNT, MAX_QUIZ_COUNT)?;
    let quizzes = service.generate_quiz(&req.note_id, req.count, req.use_pdf).await;
    Ok(Json(QuizResponse { quizzes }))
}

fn check_range(field: &str, value: usize, min: usize, max: usize) -> Result<(), RagError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(RagError::Validation(format!("{field} must be between {min} and {max}, got {value}")))
    }
}
