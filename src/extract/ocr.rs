use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::{RagError, Result};

/// A rendered page, PNG encoded.
#[derive(Clone, Debug)]
pub struct PageImage {
    pub page: u32,
    pub png: Vec<u8>,
}

/// Renders selected pages of a PDF to images.
#[async_trait]
pub trait Rasterizer: Send + Sync {
    async fn rasterize(&self, pdf: &[u8], pages: &[u32]) -> Result<Vec<PageImage>>;
}

#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn recognize(&self, image: &PageImage, languages: &[String]) -> Result<String>;
}

/// Poppler's `pdftoppm`.
pub struct PdftoppmRasterizer {
    dpi: u32,
}

impl PdftoppmRasterizer {
    pub fn new(dpi: u32) -> Self {
        Self { dpi }
    }
}

/// Sorted, deduplicated pages grouped into inclusive `(first, last)` ranges.
fn contiguous_runs(pages: &[u32]) -> Vec<(u32, u32)> {
    let mut sorted = pages.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut runs: Vec<(u32, u32)> = Vec::new();
    for page in sorted {
        match runs.last_mut() {
            Some((_, last)) if *last + 1 == page => *last = page,
            _ => runs.push((page, page)),
        }
    }
    runs
}

/// `page-07.png` -> 7. pdftoppm zero-pads to the width of the last page number.
fn page_number_from_file_name(name: &str) -> Option<u32> {
    name.strip_prefix("page-")?.strip_suffix(".png")?.parse().ok()
}

#[async_trait]
impl Rasterizer for PdftoppmRasterizer {
    async fn rasterize(&self, pdf: &[u8], pages: &[u32]) -> Result<Vec<PageImage>> {
        let runs = contiguous_runs(pages);
        if runs.is_empty() {
            return Ok(Vec::new());
        }

        // Removed when dropped, whichever way this function returns.
        let workdir = tempfile::Builder::new()
            .prefix("noterag-ocr-")
            .tempdir()
            .map_err(|e| RagError::Extraction(format!("failed to create temp dir: {e}")))?;
        let input = workdir.path().join("input.pdf");
        tokio::fs::write(&input, pdf)
            .await
            .map_err(|e| RagError::Extraction(format!("failed to stage PDF: {e}")))?;

        for (first, last) in &runs {
            let output = Command::new("pdftoppm")
                .arg("-r")
                .arg(self.dpi.to_string())
                .arg("-png")
                .arg("-f")
                .arg(first.to_string())
                .arg("-l")
                .arg(last.to_string())
                .arg(&input)
                .arg(workdir.path().join("page"))
                .kill_on_drop(true)
                .output()
                .await
                .map_err(|e| RagError::Extraction(format!("failed to run pdftoppm: {e}")))?;

            if !output.status.success() {
                return Err(RagError::Extraction(format!(
                    "pdftoppm exited with {} on pages {}-{}: {}",
                    output.status,
                    first,
                    last,
                    String::from_utf8_lossy(&output.stderr).trim()
                )));
            }
        }

        let mut images = Vec::new();
        let mut entries = tokio::fs::read_dir(workdir.path())
            .await
            .map_err(|e| RagError::Extraction(format!("failed to list rendered pages: {e}")))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| RagError::Extraction(format!("failed to list rendered pages: {e}")))?
        {
            let name = entry.file_name().to_string_lossy().to_string();
            let Some(page) = page_number_from_file_name(&name) else { continue };
            if !pages.contains(&page) {
                continue;
            }
            let png = tokio::fs::read(entry.path())
                .await
                .map_err(|e| RagError::Extraction(format!("failed to read {name}: {e}")))?;
            images.push(PageImage { page, png });
        }
        images.sort_by_key(|i| i.page);

        tracing::debug!(
            "Rasterized {} of {} requested pages in {} runs",
            images.len(),
            pages.len(),
            runs.len()
        );
        Ok(images)
    }
}

/// Tesseract CLI, fed through stdin so no image file is written.
pub struct TesseractOcr;

#[async_trait]
impl OcrEngine for TesseractOcr {
    async fn recognize(&self, image: &PageImage, languages: &[String]) -> Result<String> {
        let mut child = Command::new("tesseract")
            .arg("stdin")
            .arg("stdout")
            .arg("-l")
            .arg(languages.join("+"))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RagError::Transient(format!("failed to start tesseract: {e}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&image.png)
                .await
                .map_err(|e| RagError::Transient(format!("failed to feed tesseract: {e}")))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| RagError::Transient(format!("tesseract failed: {e}")))?;

        if !output.status.success() {
            return Err(RagError::Transient(format!(
                "tesseract exited with {} on page {}: {}",
                output.status,
                image.page,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pdftoppm_output_names() {
        assert_eq!(page_number_from_file_name("page-7.png"), Some(7));
        assert_eq!(page_number_from_file_name("page-007.png"), Some(7));
        assert_eq!(page_number_from_file_name("page-12.png"), Some(12));
        assert_eq!(page_number_from_file_name("input.pdf"), None);
        assert_eq!(page_number_from_file_name("page-x.png"), None);
    }

    #[test]
    fn flagged_pages_group_into_runs() {
        assert_eq!(contiguous_runs(&[1, 300]), vec![(1, 1), (300, 300)]);
        assert_eq!(contiguous_runs(&[4, 2, 3, 3, 9, 10]), vec![(2, 4), (9, 10)]);
        assert!(contiguous_runs(&[]).is_empty());
    }

    #[tokio::test]
    async fn nothing_to_rasterize() {
        let images = PdftoppmRasterizer::new(150).rasterize(b"%PDF-1.4", &[]).await.unwrap();
        assert!(images.is_empty());
    }
}
