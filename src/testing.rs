//! In-process stand-ins for every external collaborator. Each one counts its
//! calls so tests can assert on how often the pipeline reached outward.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{RagError, Result};
use crate::extract::fetch::FileFetcher;
use crate::extract::ocr::{OcrEngine, PageImage, Rasterizer};
use crate::extract::pdf::PageReader;
use crate::llm::LanguageModel;
use crate::rag::Embedder;
use crate::store::{Note, NoteStore, TranscriptSegment};

#[derive(Default)]
pub struct FakeStore {
    notes: HashMap<String, Note>,
    transcripts: HashMap<String, Vec<TranscriptSegment>>,
    transcript_loads: AtomicUsize,
}

impl FakeStore {
    pub fn with_note(mut self, note: Note) -> Self {
        self.notes.insert(note.id.clone(), note);
        self
    }

    pub fn with_transcripts(mut self, note_id: &str, segments: Vec<TranscriptSegment>) -> Self {
        self.transcripts.insert(note_id.to_string(), segments);
        self
    }

    pub fn transcript_loads(&self) -> usize {
        self.transcript_loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NoteStore for FakeStore {
    async fn get_note(&self, note_id: &str) -> Result<Option<Note>> {
        Ok(self.notes.get(note_id).cloned())
    }

    async fn get_transcripts(&self, note_id: &str) -> Result<Vec<TranscriptSegment>> {
        self.transcript_loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.transcripts.get(note_id).cloned().unwrap_or_default())
    }
}

pub struct FakeFetcher {
    body: Option<Vec<u8>>,
    calls: AtomicUsize,
}

impl FakeFetcher {
    pub fn ok(body: &[u8]) -> Self {
        Self { body: Some(body.to_vec()), calls: AtomicUsize::new(0) }
    }

    pub fn failing() -> Self {
        Self { body: None, calls: AtomicUsize::new(0) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FileFetcher for FakeFetcher {
    async fn download(&self, url: &str, timeout: Duration) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.body
            .clone()
            .ok_or_else(|| {
                let secs = timeout.as_secs();
                RagError::Transient(format!("download of {url} timed out after {secs}s"))
            })
    }
}

/// Returns fixed native text per page regardless of the bytes given.
pub struct FakeReader {
    pages: Vec<String>,
}

impl FakeReader {
    pub fn pages(pages: Vec<String>) -> Self {
        Self { pages }
    }
}

#[async_trait]
impl PageReader for FakeReader {
    async fn read_pages(&self, _pdf: &[u8]) -> Result<Vec<String>> {
        Ok(self.pages.clone())
    }
}

#[derive(Default)]
pub struct FakeRasterizer {
    fail: bool,
    hang: bool,
    calls: AtomicUsize,
    requested: Mutex<Vec<u32>>,
}

impl FakeRasterizer {
    pub fn failing() -> Self {
        Self { fail: true, ..Self::default() }
    }

    /// Never finishes, like pdftoppm stuck on a malformed file.
    pub fn hanging() -> Self {
        Self { hang: true, ..Self::default() }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requested(&self) -> Vec<u32> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl Rasterizer for FakeRasterizer {
    async fn rasterize(&self, _pdf: &[u8], pages: &[u32]) -> Result<Vec<PageImage>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().unwrap().extend_from_slice(pages);
        if self.hang {
            std::future::pending::<()>().await;
        }
        if self.fail {
            return Err(RagError::Extraction("pdftoppm exited with status 1".into()));
        }
        Ok(pages.iter().map(|&page| PageImage { page, png: Vec::new() }).collect())
    }
}

#[derive(Default)]
pub struct FakeOcr {
    failing_pages: Vec<u32>,
    seen: Mutex<Vec<u32>>,
}

impl FakeOcr {
    pub fn failing_on(pages: &[u32]) -> Self {
        Self { failing_pages: pages.to_vec(), ..Self::default() }
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn pages_seen(&self) -> Vec<u32> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl OcrEngine for FakeOcr {
    async fn recognize(&self, image: &PageImage, languages: &[String]) -> Result<String> {
        self.seen.lock().unwrap().push(image.page);
        if self.failing_pages.contains(&image.page) {
            return Err(RagError::Transient(format!("tesseract crashed on page {}", image.page)));
        }
        Ok(format!("recognized {} text of page {}", languages.join("+"), image.page))
    }
}

/// Letter-frequency vectors plus one constant dimension, so no vector is zero.
#[derive(Default)]
pub struct FakeEmbedder {
    calls: AtomicUsize,
    inputs: AtomicUsize,
}

impl FakeEmbedder {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn inputs_seen(&self) -> usize {
        self.inputs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inputs.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|text| {
                let mut v = vec![0.0f32; 27];
                for c in text.to_lowercase().chars().filter(char::is_ascii_lowercase) {
                    v[(c as u8 - b'a') as usize] += 1.0;
                }
                v[26] = 1.0;
                v
            })
            .collect())
    }

    fn model_name(&self) -> String {
        "fake-embedding".to_string()
    }
}

type Responder = Box<dyn Fn(&str) -> Result<String> + Send + Sync>;
type Delay = Box<dyn Fn(&str) -> Duration + Send + Sync>;

pub struct FakeLlm {
    respond: Responder,
    delay: Option<Delay>,
    prompts: Mutex<Vec<String>>,
}

impl FakeLlm {
    pub fn new(respond: impl Fn(&str) -> Result<String> + Send + Sync + 'static) -> Self {
        Self { respond: Box::new(respond), delay: None, prompts: Mutex::new(Vec::new()) }
    }

    /// Replies with the prompt it was given.
    pub fn echo() -> Self {
        Self::new(|prompt| Ok(prompt.to_string()))
    }

    pub fn replying(reply: &str) -> Self {
        let reply = reply.to_string();
        Self::new(move |_| Ok(reply.clone()))
    }

    pub fn failing() -> Self {
        Self::new(|_| Err(RagError::Transient("completion timed out".into())))
    }

    pub fn with_delay(mut self, delay: impl Fn(&str) -> Duration + Send + Sync + 'static) -> Self {
        self.delay = Some(Box::new(delay));
        self
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for FakeLlm {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if let Some(delay) = &self.delay {
            tokio::time::sleep(delay(prompt)).await;
        }
        (self.respond)(prompt)
    }
}
