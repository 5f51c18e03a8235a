//! Vector similarity utilities and an in-memory evidence index.
//!
//! The in-memory index is a brute-force cosine scan. It suits corpora of a
//! few thousand chunks and test fixtures; larger deployments use pgvector.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tidemark_core::error::RetrievalError;
use tidemark_core::evidence::{EvidenceChunk, VectorQuery, VectorStore, rank_order};
use tracing::info;

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns 0.0 if either vector is zero-length or empty.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// One corpus record: a chunk plus its stored embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusRecord {
    #[serde(flatten)]
    pub chunk: EvidenceChunk,
    pub embedding: Vec<f32>,
}

/// An evidence index held entirely in memory.
pub struct InMemoryVectorStore {
    records: Vec<CorpusRecord>,
}

impl InMemoryVectorStore {
    pub fn new(records: Vec<CorpusRecord>) -> Self {
        Self { records }
    }

    /// Load a JSON array of [`CorpusRecord`]s.
    pub fn from_json_file(path: &Path) -> Result<Self, RetrievalError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RetrievalError::Unavailable(format!("Failed to read corpus {}: {e}", path.display()))
        })?;
        let records: Vec<CorpusRecord> = serde_json::from_str(&content).map_err(|e| {
            RetrievalError::Unavailable(format!("Invalid corpus {}: {e}", path.display()))
        })?;
        info!(chunks = records.len(), "Loaded evidence corpus from {}", path.display());
        Ok(Self::new(records))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn search(&self, query: &VectorQuery) -> Result<Vec<EvidenceChunk>, RetrievalError> {
        let mut hits: Vec<EvidenceChunk> = self
            .records
            .iter()
            .filter(|r| r.chunk.matches(query))
            .map(|r| {
                let mut chunk = r.chunk.clone();
                chunk.similarity = cosine_similarity(&r.embedding, &query.embedding);
                chunk
            })
            .collect();

        hits.sort_by(rank_order);
        hits.truncate(query.top_k);
        Ok(hits)
    }
}
