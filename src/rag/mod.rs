pub mod cache;
pub mod embeddings;
pub mod store;

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::RetrievalConfig;
use crate::error::{RagError, Result};
use crate::extract::{ExtractedPage, ExtractionMethod};
use crate::llm::LanguageModel;
use crate::resolver::SourceKind;
use crate::store::TranscriptSegment;

pub use cache::IndexCache;
pub use embeddings::Embedder;
pub use store::SemanticIndex;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum Locator {
    Page(u32),
    TimeRange { start_sec: f64, end_sec: f64 },
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct UnitMetadata {
    pub note_id: String,
    pub source: SourceKind,
    pub locator: Locator,
}

/// Text plus provenance, the common shape of PDF pages and transcript segments.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DocumentUnit {
    pub text: String,
    pub metadata: UnitMetadata,
}

impl DocumentUnit {
    pub fn source_label(&self) -> String {
        match &self.metadata.locator {
            Locator::Page(n) => format!("PDF page {}", n),
            Locator::TimeRange { start_sec, end_sec } => {
                format!("transcript {:.1}s-{:.1}s", start_sec, end_sec)
            }
        }
    }
}

/// One unit per readable page; pages whose OCR failed carry no text and are skipped.
pub fn units_from_pages(note_id: &str, pages: &[ExtractedPage]) -> Vec<DocumentUnit> {
    pages
        .iter()
        .filter(|p| p.method != ExtractionMethod::Failed && !p.text.trim().is_empty())
        .map(|p| DocumentUnit {
            text: p.text.trim().to_string(),
            metadata: UnitMetadata {
                note_id: note_id.to_string(),
                source: SourceKind::Pdf,
                locator: Locator::Page(p.number),
            },
        })
        .collect()
}

/// One unit per spoken segment; blank segments are skipped since embedding
/// endpoints reject empty input.
pub fn units_from_transcripts(note_id: &str, segments: &[TranscriptSegment]) -> Vec<DocumentUnit> {
    segments
        .iter()
        .filter(|s| !s.text.trim().is_empty())
        .map(|s| DocumentUnit {
            text: s.text.trim().to_string(),
            metadata: UnitMetadata {
                note_id: note_id.to_string(),
                source: SourceKind::Transcript,
                locator: Locator::TimeRange {
                    start_sec: s.start_sec,
                    end_sec: s.end_sec,
                },
            },
        })
        .collect()
}

/// Builds semantic indexes and answers retrieval-augmented prompts against them.
pub struct RagEngine {
    embedder: Arc<dyn Embedder>,
    llm: Arc<dyn LanguageModel>,
    retrieval: RetrievalConfig,
}

impl RagEngine {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn LanguageModel>,
        retrieval: RetrievalConfig,
    ) -> Self {
        Self { embedder, llm, retrieval }
    }

    pub async fn build(&self, note_id: &str, units: Vec<DocumentUnit>) -> Result<SemanticIndex> {
        if units.is_empty() {
            return Err(RagError::Extraction(format!("note '{note_id}' has no content to index")));
        }

        let texts: Vec<String> = units.iter().map(|u| u.text.clone()).collect();
        let embeddings = embeddings::embed_texts(self.embedder.as_ref(), &texts).await?;
        tracing::info!(note_id, units = units.len(), "Embedded document units");

        SemanticIndex::new(note_id, self.embedder.model_name(), units, embeddings)
    }

    /// Retrieve with the prompt itself and answer it.
    pub async fn query(&self, index: &SemanticIndex, prompt: &str) -> Result<String> {
        self.query_focused(index, prompt, prompt).await
    }

    /// Retrieve with `focus` (e.g. the bare user question) but send the full `prompt`.
    pub async fn query_focused(
        &self,
        index: &SemanticIndex,
        focus: &str,
        prompt: &str,
    ) -> Result<String> {
        let query_embedding = self
            .embedder
            .embed_batch(&[focus.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::Transient("embedder returned no query vector".to_string()))?;

        let hits = index.search(&query_embedding, self.retrieval.top_k);
        if !hits.is_empty() {
            let scores: Vec<f32> = hits.iter().map(|(_, s)| *s).collect();
            tracing::debug!(
                note_id = index.note_id(),
                "Retrieved {} units, scores: {:?}",
                hits.len(),
                scores
            );
        }

        let query_words: Vec<String> = focus
            .to_lowercase()
            .split_whitespace()
            .map(str::to_string)
            .collect();
        let context = hits
            .iter()
            .enumerate()
            .map(|(i, (unit, _))| {
                let max_chars = self.retrieval.snippet_chars;
                let snippet = extract_relevant_snippet(&unit.text, &query_words, max_chars);
                format!("[{}] (source: {})\n{}", i + 1, unit.source_label(), snippet)
            })
            .collect::<Vec<_>>()
            .join("\n\n---\n\n");

        let full_prompt = format!("{prompt}\n\nRetrieved lecture material:\n\n{context}");
        self.llm.complete(&full_prompt).await
    }
}

/// Most query-relevant window of `content`, at most `max_chars` characters.
///
/// The densest 50-word window is located first; the snippet then starts a few
/// words before the first query term inside it, so short snippets still carry
/// the match.
fn extract_relevant_snippet(content: &str, query_words: &[String], max_chars: usize) -> String {
    if content.chars().count() <= max_chars {
        return content.to_string();
    }

    let words: Vec<&str> = content.split_whitespace().collect();
    let window_size = 50;
    let is_match = |word: &str| {
        let word = word.to_lowercase();
        query_words.iter().any(|qw| word.contains(qw.as_str()))
    };

    let mut best_start = 0;
    let mut best_score = 0;
    for i in 0..=words.len().saturating_sub(window_size) {
        let end = (i + window_size).min(words.len());
        let window = words[i..end].join(" ").to_lowercase();
        let score = query_words.iter().filter(|qw| window.contains(qw.as_str())).count();
        if score > best_score {
            best_score = score;
            best_start = i;
        }
    }

    let anchor = if best_score == 0 {
        0
    } else {
        let end = (best_start + window_size).min(words.len());
        (best_start..end).find(|&i| is_match(words[i])).unwrap_or(best_start)
    };

    // a little leading context before the first match
    let start = anchor.saturating_sub(10);
    let mut snippet = String::new();
    let mut end = start;
    for word in &words[start..] {
        if snippet.chars().count() + word.chars().count() + 1 > max_chars {
            break;
        }
        if !snippet.is_empty() {
            snippet.push(' ');
        }
        snippet.push_str(word);
        end += 1;
    }

    if start > 0 {
        snippet = format!("...{}", snippet);
    }
    if end < words.len() {
        snippet.push_str("...");
    }
    snippet
}
