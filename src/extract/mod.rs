//! Source text extraction.
//!
//! PDFs are downloaded, read page by page from their text layer, and pages
//! whose text layer is too thin are rasterized and sent through OCR. Each page
//! carries its own outcome so that one unreadable page never sinks the rest.

pub mod fetch;
pub mod ocr;
pub mod pdf;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::config::ExtractionConfig;
use crate::error::{RagError, Result};
use crate::store::{NoteStore, TranscriptSegment};

use self::fetch::FileFetcher;
use self::ocr::{OcrEngine, PageImage, Rasterizer};
use self::pdf::{normalize_text, PageReader};

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMethod {
    Native,
    Ocr,
    Failed,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ExtractedPage {
    /// 1-based.
    pub number: u32,
    pub text: String,
    pub method: ExtractionMethod,
}

impl ExtractedPage {
    fn failed(number: u32, reason: &str) -> Self {
        tracing::warn!("OCR failed for page {}: {}", number, reason);
        Self {
            number,
            text: format!("[OCR failed for page {number}]"),
            method: ExtractionMethod::Failed,
        }
    }

    pub fn header(&self) -> String {
        match self.method {
            ExtractionMethod::Native => format!("--- Page {} ---", self.number),
            ExtractionMethod::Ocr => format!("--- Page {} (OCR) ---", self.number),
            ExtractionMethod::Failed => format!("--- Page {} (OCR failed) ---", self.number),
        }
    }
}

/// Intermediate per-page state between the text layer pass and OCR.
#[derive(Debug)]
enum PageOutcome {
    Native(ExtractedPage),
    NeedsOcr { number: u32, native: String },
}

/// Concatenate pages in order with `--- Page N ---` boundaries.
pub fn combine_pages(pages: &[ExtractedPage]) -> String {
    let mut combined = String::new();
    for page in pages {
        combined.push_str("\n\n");
        combined.push_str(&page.header());
        combined.push_str("\n\n");
        combined.push_str(&page.text);
    }
    combined.trim().to_string()
}

/// Characters of real page text, ignoring failure sentinels.
fn content_chars(pages: &[ExtractedPage]) -> usize {
    pages
        .iter()
        .filter(|p| p.method != ExtractionMethod::Failed)
        .map(|p| p.text.trim().chars().count())
        .sum()
}

pub struct PdfExtractor {
    fetcher: Arc<dyn FileFetcher>,
    reader: Arc<dyn PageReader>,
    rasterizer: Arc<dyn Rasterizer>,
    ocr: Arc<dyn OcrEngine>,
    config: ExtractionConfig,
}

impl PdfExtractor {
    pub fn new(
        fetcher: Arc<dyn FileFetcher>,
        reader: Arc<dyn PageReader>,
        rasterizer: Arc<dyn Rasterizer>,
        ocr: Arc<dyn OcrEngine>,
        config: ExtractionConfig,
    ) -> Self {
        Self { fetcher, reader, rasterizer, ocr, config }
    }

    /// HTTP download, pdf-extract, poppler and tesseract.
    pub fn with_system_tools(config: ExtractionConfig) -> Result<Self> {
        Ok(Self::new(
            Arc::new(fetch::HttpFetcher::new()?),
            Arc::new(pdf::PdfExtractReader),
            Arc::new(ocr::PdftoppmRasterizer::new(config.ocr_dpi)),
            Arc::new(ocr::TesseractOcr),
            config,
        ))
    }

    pub async fn extract(&self, url: &str) -> Result<Vec<ExtractedPage>> {
        let bytes = self
            .fetcher
            .download(url, self.config.download_timeout())
            .await?;
        self.extract_bytes(&bytes).await
    }

    pub async fn extract_local(&self, path: &Path) -> Result<Vec<ExtractedPage>> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| RagError::Extraction(format!("failed to read {}: {e}", path.display())))?;
        self.extract_bytes(&bytes).await
    }

    pub async fn extract_bytes(&self, pdf: &[u8]) -> Result<Vec<ExtractedPage>> {
        let native = self.reader.read_pages(pdf).await?;
        let outcomes: Vec<PageOutcome> = native
            .iter()
            .enumerate()
            .map(|(i, text)| self.classify_page(i as u32 + 1, text))
            .collect();

        let needs_ocr = outcomes
            .iter()
            .filter(|o| matches!(o, PageOutcome::NeedsOcr { .. }))
            .count();
        tracing::info!(
            "PDF has {} pages, {} with a usable text layer, {} needing OCR",
            outcomes.len(),
            outcomes.len() - needs_ocr,
            needs_ocr
        );

        let pages = if needs_ocr > 0 && self.config.ocr_enabled {
            self.run_ocr(pdf, outcomes).await
        } else {
            outcomes
                .into_iter()
                .map(|o| match o {
                    PageOutcome::Native(page) => page,
                    PageOutcome::NeedsOcr { number, native } => ExtractedPage {
                        number,
                        text: native,
                        method: ExtractionMethod::Native,
                    },
                })
                .collect()
        };

        let chars = content_chars(&pages);
        if chars < self.config.min_text_chars {
            let reason = if needs_ocr > 0 && !self.config.ocr_enabled {
                "the text layer is too thin and OCR is disabled".to_string()
            } else {
                format!(
                    "only {chars} characters could be read; \
                     the PDF is likely image-only or unreadable"
                )
            };
            return Err(RagError::Extraction(reason));
        }

        tracing::info!("Extracted {} characters from {} pages", chars, pages.len());
        Ok(pages)
    }

    fn classify_page(&self, number: u32, raw: &str) -> PageOutcome {
        let text = normalize_text(raw);
        if text.chars().count() < self.config.ocr_threshold {
            PageOutcome::NeedsOcr { number, native: text }
        } else {
            PageOutcome::Native(ExtractedPage { number, text, method: ExtractionMethod::Native })
        }
    }

    async fn run_ocr(&self, pdf: &[u8], outcomes: Vec<PageOutcome>) -> Vec<ExtractedPage> {
        let flagged: Vec<u32> = outcomes
            .iter()
            .filter_map(|o| match o {
                PageOutcome::NeedsOcr { number, .. } => Some(*number),
                PageOutcome::Native(_) => None,
            })
            .collect();

        let timeout = self.config.rasterize_timeout();
        let rendered =
            tokio::time::timeout(timeout, self.rasterizer.rasterize(pdf, &flagged)).await;
        let mut recognized = match rendered {
            Ok(Ok(images)) => self.recognize_all(images).await,
            Ok(Err(e)) => {
                tracing::error!(
                    "Rasterization failed, marking {} pages as failed: {}",
                    flagged.len(),
                    e
                );
                HashMap::new()
            }
            Err(_) => {
                tracing::error!(
                    "Rasterization timed out after {}s, marking {} pages as failed",
                    timeout.as_secs(),
                    flagged.len()
                );
                HashMap::new()
            }
        };

        outcomes
            .into_iter()
            .map(|o| match o {
                PageOutcome::Native(page) => page,
                PageOutcome::NeedsOcr { number, .. } => match recognized.remove(&number) {
                    Some(Ok(text)) => ExtractedPage { number, text, method: ExtractionMethod::Ocr },
                    Some(Err(reason)) => ExtractedPage::failed(number, &reason),
                    None => ExtractedPage::failed(number, "page was not rasterized"),
                },
            })
            .collect()
    }

    /// OCR every image independently; a failure is recorded against its page only.
    async fn recognize_all(
        &self,
        images: Vec<PageImage>,
    ) -> HashMap<u32, std::result::Result<String, String>> {
        let languages = &self.config.ocr_languages;
        let timeout = self.config.ocr_timeout();

        stream::iter(images)
            .map(|image| async move {
                let recognized =
                    tokio::time::timeout(timeout, self.ocr.recognize(&image, languages)).await;
                let result = match recognized {
                    Ok(Ok(raw)) => {
                        let text = normalize_text(&raw);
                        if text.is_empty() {
                            Err("OCR produced no text".to_string())
                        } else {
                            Ok(text)
                        }
                    }
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(_) => Err(format!("OCR timed out after {}s", timeout.as_secs())),
                };
                (image.page, result)
            })
            .buffer_unordered(self.config.ocr_concurrency.max(1))
            .collect()
            .await
    }
}

/// Transcript segments of a note, failing when nothing has been recorded.
pub async fn load_transcripts(
    store: &dyn NoteStore,
    note_id: &str,
) -> Result<Vec<TranscriptSegment>> {
    let segments = store.get_transcripts(note_id).await?;
    if segments.is_empty() {
        return Err(RagError::NotFound(format!(
            "note '{note_id}' has no transcript; upload a PDF or record audio first"
        )));
    }
    tracing::info!("Loaded {} transcript segments for {}", segments.len(), note_id);
    Ok(segments)
}

pub fn transcript_text(segments: &[TranscriptSegment]) -> String {
    segments
        .iter()
        .map(|s| s.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
