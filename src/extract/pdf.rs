use async_trait::async_trait;

use crate::error::{RagError, Result};

/// Native text layer of a PDF, one entry per page in page order.
#[async_trait]
pub trait PageReader: Send + Sync {
    async fn read_pages(&self, pdf: &[u8]) -> Result<Vec<String>>;
}

/// `pdf-extract` backed reader.
pub struct PdfExtractReader;

#[async_trait]
impl PageReader for PdfExtractReader {
    async fn read_pages(&self, pdf: &[u8]) -> Result<Vec<String>> {
        let bytes = pdf.to_vec();
        // pdf-extract is CPU bound and panics on some malformed inputs
        let result = tokio::task::spawn_blocking(move || {
            std::panic::catch_unwind(move || {
                pdf_extract::extract_text_from_mem_by_pages(&bytes).map_err(|e| e.to_string())
            })
        })
        .await
        .map_err(|e| RagError::Extraction(format!("PDF reader task failed: {e}")))?;

        match result {
            Ok(Ok(pages)) => {
                tracing::debug!("Read native text layer of {} pages", pages.len());
                Ok(pages)
            }
            Ok(Err(e)) => Err(RagError::Extraction(format!("PDF text extraction failed: {e}"))),
            Err(_) => Err(RagError::Extraction("PDF text extraction panicked".to_string())),
        }
    }
}

const REPLACEMENTS: &[(char, &str)] = &[
    ('\u{FB00}', "ff"),
    ('\u{FB01}', "fi"),
    ('\u{FB02}', "fl"),
    ('\u{FB03}', "ffi"),
    ('\u{FB04}', "ffl"),
    ('\u{FB05}', "st"),
    ('\u{FB06}', "st"),
    ('\u{2018}', "'"),
    ('\u{2019}', "'"),
    ('\u{201C}', "\""),
    ('\u{201D}', "\""),
    ('\u{2013}', "-"),
    ('\u{2014}', "-"),
    ('\u{2026}', "..."),
    ('\u{00A0}', " "),
];

/// Fix ligatures and typographic punctuation from PDF text layers, then
/// collapse runs of whitespace.
pub fn normalize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match REPLACEMENTS.iter().find(|(from, _)| *from == c) {
            Some((_, to)) => out.push_str(to),
            None => out.push(c),
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}
