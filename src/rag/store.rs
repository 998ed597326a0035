use super::DocumentUnit;
use crate::error::{RagError, Result};

#[derive(Debug)]
struct IndexedUnit {
    unit: DocumentUnit,
    embedding: Vec<f32>,
}

/// Linear-scan vector store over the units of one note.
///
/// Built once and never mutated, so any number of queries can read it
/// concurrently through an `Arc`.
#[derive(Debug)]
pub struct SemanticIndex {
    note_id: String,
    embedding_model: String,
    entries: Vec<IndexedUnit>,
}

impl SemanticIndex {
    pub fn new(
        note_id: &str,
        embedding_model: String,
        units: Vec<DocumentUnit>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<Self> {
        if units.len() != embeddings.len() {
            return Err(RagError::Transient(format!(
                "embedder returned {} vectors for {} units",
                embeddings.len(),
                units.len()
            )));
        }

        let entries = units
            .into_iter()
            .zip(embeddings)
            .map(|(unit, embedding)| IndexedUnit { unit, embedding })
            .collect();

        Ok(Self {
            note_id: note_id.to_string(),
            embedding_model,
            entries,
        })
    }

    pub fn note_id(&self) -> &str {
        &self.note_id
    }

    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Best `top_k` units by cosine similarity, highest first.
    pub fn search(&self, query_embedding: &[f32], top_k: usize) -> Vec<(&DocumentUnit, f32)> {
        let mut scores: Vec<(&DocumentUnit, f32)> = self
            .entries
            .iter()
            .map(|e| (&e.unit, cosine_similarity(query_embedding, &e.embedding)))
            .collect();

        scores.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scores.truncate(top_k);
        scores
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot_product: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}
