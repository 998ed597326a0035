//! The three note operations (ask, summarize, quiz) over an explicit service
//! context. Nothing here is global: everything an operation needs is reached
//! through the `AiService` it is called on.

pub mod prompts;
pub mod quiz;
pub mod summarize;

use std::sync::Arc;

use crate::config::Config;
use crate::error::{RagError, Result};
use crate::extract::fetch::{FileFetcher, HttpFetcher};
use crate::extract::ocr::{OcrEngine, PdftoppmRasterizer, Rasterizer, TesseractOcr};
use crate::extract::pdf::{PageReader, PdfExtractReader};
use crate::extract::{self, combine_pages, PdfExtractor};
use crate::llm::{LanguageModel, LlmClient};
use crate::rag::embeddings::OpenAiEmbedder;
use crate::rag::{self, Embedder, IndexCache, RagEngine, SemanticIndex};
use crate::resolver::{self, ResolvedSource};
use crate::store::postgres::PgNoteStore;
use crate::store::NoteStore;

pub use quiz::QuizItem;

pub const MIN_QUIZ_COUNT: usize = 1;
pub const MAX_QUIZ_COUNT: usize = 10;

/// Handles to every external capability the service calls out to.
pub struct Collaborators {
    pub store: Arc<dyn NoteStore>,
    pub fetcher: Arc<dyn FileFetcher>,
    pub reader: Arc<dyn PageReader>,
    pub rasterizer: Arc<dyn Rasterizer>,
    pub ocr: Arc<dyn OcrEngine>,
    pub embedder: Arc<dyn Embedder>,
    pub llm: Arc<dyn LanguageModel>,
}

impl Collaborators {
    /// Production wiring: Postgres, HTTP, pdf-extract, poppler, tesseract and an
    /// OpenAI-compatible endpoint for both chat and embeddings.
    pub fn from_config(config: &Config) -> Result<Self> {
        let database_url = config
            .database_url
            .as_deref()
            .ok_or_else(|| RagError::Validation("DATABASE_URL is not set".into()))?;

        let llm = &config.llm;
        Ok(Self {
            store: Arc::new(PgNoteStore::connect_lazy(database_url)?),
            fetcher: Arc::new(HttpFetcher::new()?),
            reader: Arc::new(PdfExtractReader),
            rasterizer: Arc::new(PdftoppmRasterizer::new(config.extraction.ocr_dpi)),
            ocr: Arc::new(TesseractOcr),
            embedder: Arc::new(OpenAiEmbedder::new(
                llm.embeddings_base_url(),
                llm.embedding_model.clone(),
                llm.api_key.clone(),
                llm.embedding_timeout(),
            )?),
            llm: Arc::new(LlmClient::new(llm)?),
        })
    }
}

pub struct AiService {
    config: Arc<Config>,
    store: Arc<dyn NoteStore>,
    extractor: PdfExtractor,
    rag: RagEngine,
    cache: IndexCache,
    llm: Arc<dyn LanguageModel>,
}

impl AiService {
    pub fn new(config: Config, collaborators: Collaborators) -> Self {
        let Collaborators { store, fetcher, reader, rasterizer, ocr, embedder, llm } =
            collaborators;
        let extractor =
            PdfExtractor::new(fetcher, reader, rasterizer, ocr, config.extraction.clone());
        let rag = RagEngine::new(embedder, llm.clone(), config.retrieval.clone());
        let cache = IndexCache::new(config.cache.capacity, config.cache.ttl());

        Self {
            config: Arc::new(config),
            store,
            extractor,
            rag,
            cache,
            llm,
        }
    }

    pub fn from_config(config: Config) -> Result<Self> {
        let collaborators = Collaborators::from_config(&config)?;
        Ok(Self::new(config, collaborators))
    }

    pub fn cached_indexes(&self) -> usize {
        self.cache.len()
    }

    /// The note's semantic index, built on first use and shared afterwards.
    pub async fn get_index(&self, note_id: &str) -> Result<Arc<SemanticIndex>> {
        self.cache
            .get_or_build(note_id, || self.build_index(note_id))
            .await
    }

    async fn build_index(&self, note_id: &str) -> Result<SemanticIndex> {
        let units = match resolver::resolve(self.store.as_ref(), note_id).await? {
            ResolvedSource::Pdf { url } => {
                let pages = self.extractor.extract(&url).await?;
                rag::units_from_pages(note_id, &pages)
            }
            ResolvedSource::Transcript => {
                let segments = extract::load_transcripts(self.store.as_ref(), note_id).await?;
                rag::units_from_transcripts(note_id, &segments)
            }
        };
        self.rag.build(note_id, units).await
    }

    /// Full text of the note's source, PDF pages with their boundary markers
    /// or transcript segments in time order.
    pub async fn source_text(&self, note_id: &str) -> Result<String> {
        match resolver::resolve(self.store.as_ref(), note_id).await? {
            ResolvedSource::Pdf { url } => {
                let pages = self.extractor.extract(&url).await?;
                Ok(combine_pages(&pages))
            }
            ResolvedSource::Transcript => {
                let segments = extract::load_transcripts(self.store.as_ref(), note_id).await?;
                Ok(extract::transcript_text(&segments))
            }
        }
    }

    pub async fn ask(&self, note_id: &str, question: &str, use_pdf: bool) -> Result<String> {
        tracing::info!(note_id, use_pdf, "Ask: {}", truncate(question, 50));
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::Validation("question must not be empty".into()));
        }

        let index = self.get_index(note_id).await?;
        let prompt = prompts::ask(question, &self.config.llm.answer_language);
        let answer = self.rag.query_focused(&index, question, &prompt).await?;

        tracing::info!(note_id, "Answer generated ({} chars)", answer.chars().count());
        Ok(answer)
    }

    /// Exactly `lines` lines over the whole source text; the index is not used.
    pub async fn summarize(&self, note_id: &str, lines: usize, use_pdf: bool) -> Result<String> {
        tracing::info!(note_id, lines, use_pdf, "Summary requested");
        if !(summarize::MIN_LINES..=summarize::MAX_LINES).contains(&lines) {
            return Err(RagError::Validation(format!(
                "lines must be between {} and {}",
                summarize::MIN_LINES,
                summarize::MAX_LINES
            )));
        }

        let text = self.source_text(note_id).await?;
        let summary = summarize::summarize_text(
            self.llm.as_ref(),
            &self.config.summary,
            &self.config.llm.answer_language,
            &text,
            lines,
        )
        .await?;

        tracing::info!(note_id, "Summary generated ({} chars)", summary.chars().count());
        Ok(summary)
    }

    /// Never fails: any upstream error or unusable reply yields the fallback set.
    pub async fn generate_quiz(&self, note_id: &str, count: usize, use_pdf: bool) -> Vec<QuizItem> {
        let count = count.clamp(MIN_QUIZ_COUNT, MAX_QUIZ_COUNT);
        tracing::info!(note_id, count, use_pdf, "Quiz requested");

        match self.quiz_response(note_id, count).await {
            Ok(raw) => {
                tracing::debug!("Raw quiz response: {}...", truncate(&raw, 200));
                quiz::from_response(&raw, count)
            }
            Err(e) => {
                tracing::error!(note_id, "Quiz generation failed: {}", e);
                quiz::fallback(count)
            }
        }
    }

    async fn quiz_response(&self, note_id: &str, count: usize) -> Result<String> {
        let index = self.get_index(note_id).await?;
        let prompt = prompts::quiz(count, &self.config.llm.answer_language);
        self.rag.query(&index, &prompt).await
    }
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}
