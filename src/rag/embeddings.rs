use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use text_splitter::TextSplitter;

use crate::error::{RagError, Result};

// Approximate characters per token ratio
const CHARS_PER_TOKEN: usize = 2;
const MAX_TOKENS: usize = 4096;
const MAX_CHUNK_CHARS: usize = MAX_TOKENS * CHARS_PER_TOKEN;
const BATCH_SIZE: usize = 64;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// One vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn model_name(&self) -> String;
}

/// OpenAI-compatible `/embeddings` endpoint (OpenAI, OpenRouter, LM Studio).
pub struct OpenAiEmbedder {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

impl OpenAiEmbedder {
    pub fn new(
        base_url: String,
        model: String,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            api_key,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/embeddings", self.base_url);
        let mut builder = self.client.post(&url).json(&EmbeddingRequest {
            model: &self.model,
            input: texts,
        });
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let resp = builder.send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let err_text = resp.text().await.unwrap_or_default();
            return Err(RagError::Transient(format!(
                "embedding request failed ({status}): {err_text}"
            )));
        }

        let mut body: EmbeddingResponse = resp.json().await?;
        if body.data.len() != texts.len() {
            return Err(RagError::Transient(format!(
                "embedding endpoint returned {} vectors for {} inputs",
                body.data.len(),
                texts.len()
            )));
        }
        body.data.sort_by_key(|d| d.index);
        Ok(body.data.into_iter().map(|d| d.embedding).collect())
    }

    fn model_name(&self) -> String {
        self.model.clone()
    }
}

/// Embed texts of any length.
///
/// Texts longer than the embedding window are split, their pieces embedded
/// separately, and the piece vectors averaged and L2-normalized.
pub async fn embed_texts(embedder: &dyn Embedder, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    let splitter = TextSplitter::new(MAX_CHUNK_CHARS);

    // (owner index, piece)
    let mut pieces: Vec<(usize, String)> = Vec::new();
    for (owner, text) in texts.iter().enumerate() {
        let text = text.replace('\n', " ");
        if text.chars().count() <= MAX_CHUNK_CHARS {
            pieces.push((owner, text));
        } else {
            let before = pieces.len();
            pieces.extend(splitter.chunks(&text).map(|c| (owner, c.to_string())));
            tracing::debug!("Split text {} into {} embedding pieces", owner, pieces.len() - before);
        }
    }

    let mut piece_vectors = Vec::with_capacity(pieces.len());
    for batch in pieces.chunks(BATCH_SIZE) {
        let inputs: Vec<String> = batch.iter().map(|(_, p)| p.clone()).collect();
        piece_vectors.extend(embedder.embed_batch(&inputs).await?);
    }
    if piece_vectors.len() != pieces.len() {
        return Err(RagError::Transient("embedder returned too few vectors".to_string()));
    }

    let mut sums: Vec<Option<(Vec<f32>, usize)>> = vec![None; texts.len()];
    for ((owner, _), vector) in pieces.iter().zip(piece_vectors) {
        if let Some((sum, n)) = sums[*owner].as_mut() {
            for (acc, v) in sum.iter_mut().zip(&vector) {
                *acc += v;
            }
            *n += 1;
        } else {
            sums[*owner] = Some((vector, 1));
        }
    }

    sums.into_iter()
        .enumerate()
        .map(|(owner, entry)| {
            let (mut vector, n) = entry
                .ok_or_else(|| {
                    RagError::Transient(format!("no embedding produced for text {owner}"))
                })?;
            if n > 1 {
                for val in &mut vector {
                    *val /= n as f32;
                }
                let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm > 0.0 {
                    for val in &mut vector {
                        *val /= norm;
                    }
                }
            }
            Ok(vector)
        })
        .collect()
}
