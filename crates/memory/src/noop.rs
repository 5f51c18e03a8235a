//! No-op evidence store - disables retrieval entirely.

use async_trait::async_trait;
use tidemark_core::error::RetrievalError;
use tidemark_core::evidence::{EvidenceChunk, VectorQuery, VectorStore};

/// A vector store that never finds anything.
pub struct NoopVectorStore;

#[async_trait]
impl VectorStore for NoopVectorStore {
    fn name(&self) -> &str {
        "none"
    }

    async fn search(&self, _query: &VectorQuery) -> Result<Vec<EvidenceChunk>, RetrievalError> {
        Ok(Vec::new())
    }
}
