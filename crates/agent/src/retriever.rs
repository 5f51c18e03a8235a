//! Evidence retrieval with layer and confidence filtering.
//!
//! Retrieval never fails: an unreachable embedder or store degrades to an
//! empty evidence list and the pipeline carries on.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use tidemark_core::error::RetrievalError;
use tidemark_core::evidence::{
    ConfidenceTier, Embedder, EvidenceChunk, VectorQuery, VectorStore, rank_order,
};
use tidemark_core::provider::{EmbeddingRequest, Provider};
use tidemark_core::HazardLayer;
use tracing::{debug, warn};

/// Adapts a [`Provider`]'s embedding endpoint to the [`Embedder`] trait.
pub struct ProviderEmbedder {
    provider: Arc<dyn Provider>,
    model: String,
}

impl ProviderEmbedder {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Embedder for ProviderEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        let response = self
            .provider
            .embed(EmbeddingRequest {
                model: self.model.clone(),
                inputs: vec![text.to_string()],
            })
            .await?;

        response
            .embeddings
            .into_iter()
            .next()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| RetrievalError::EmbeddingFailed("empty embedding response".into()))
    }
}

/// Ranked evidence lookup over an [`Embedder`] and a [`VectorStore`].
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }

    /// Top `top_k` chunks for `query`, best first.
    ///
    /// `layers`, when given, keeps chunks sharing at least one layer with it.
    /// `min_confidence` keeps chunks whose tier it admits.
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        layers: Option<&BTreeSet<HazardLayer>>,
        min_confidence: ConfidenceTier,
    ) -> Vec<EvidenceChunk> {
        match self.try_retrieve(query, top_k, layers, min_confidence).await {
            Ok(chunks) => {
                debug!(
                    store = self.store.name(),
                    count = chunks.len(),
                    min_confidence = %min_confidence,
                    "Retrieved evidence"
                );
                chunks
            }
            Err(e) => {
                warn!(store = self.store.name(), error = %e, "Retrieval failed, continuing without evidence");
                Vec::new()
            }
        }
    }

    async fn try_retrieve(
        &self,
        query: &str,
        top_k: usize,
        layers: Option<&BTreeSet<HazardLayer>>,
        min_confidence: ConfidenceTier,
    ) -> Result<Vec<EvidenceChunk>, RetrievalError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let embedding = self.embedder.embed(query).await?;
        let vector_query = VectorQuery {
            embedding,
            top_k,
            layers: layers.cloned(),
            confidences: Some(min_confidence.allowed().to_vec()),
        };

        let mut chunks = self.store.search(&vector_query).await?;

        // The store's filtering and ordering are re-applied so every backend
        // returns the same shape.
        chunks.retain(|c| c.matches(&vector_query));
        chunks.sort_by(rank_order);
        chunks.truncate(top_k);
        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{FixedEmbedder, RecordingVectorStore, chunk};

    fn pool() -> Vec<EvidenceChunk> {
        vec![
            chunk("c-high", ConfidenceTier::High, &[HazardLayer::GroundwaterInundation], 0.91),
            chunk("c-med", ConfidenceTier::Medium, &[HazardLayer::GroundwaterInundation], 0.88),
            chunk("c-low", ConfidenceTier::Low, &[HazardLayer::GroundwaterInundation], 0.95),
            chunk("c-wave", ConfidenceTier::High, &[HazardLayer::AnnualHighWaveFlooding], 0.99),
        ]
    }

    fn retriever(store: Arc<RecordingVectorStore>) -> Retriever {
        Retriever::new(Arc::new(FixedEmbedder::new(vec![0.5, 0.5])), store)
    }

    #[tokio::test]
    async fn forwards_filters_to_store() {
        let store = Arc::new(RecordingVectorStore::new(pool()));
        let layers = BTreeSet::from([HazardLayer::GroundwaterInundation]);

        retriever(store.clone())
            .retrieve("groundwater", 5, Some(&layers), ConfidenceTier::Medium)
            .await;

        let queries = store.queries();
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].layers.as_ref(), Some(&layers));
        assert_eq!(
            queries[0].confidences.as_deref(),
            Some(&[ConfidenceTier::High, ConfidenceTier::Medium][..])
        );
        assert_eq!(queries[0].embedding, vec![0.5, 0.5]);
    }

    #[tokio::test]
    async fn results_ordered_and_filtered() {
        let store = Arc::new(RecordingVectorStore::new(pool()));
        let layers = BTreeSet::from([HazardLayer::GroundwaterInundation]);

        let chunks = retriever(store)
            .retrieve("groundwater", 10, Some(&layers), ConfidenceTier::Medium)
            .await;
        let ids: Vec<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c-high", "c-med"]);
    }

    #[tokio::test]
    async fn medium_results_superset_of_high() {
        let r = retriever(Arc::new(RecordingVectorStore::new(pool())));

        let high = r.retrieve("q", 10, None, ConfidenceTier::High).await;
        let medium = r.retrieve("q", 10, None, ConfidenceTier::Medium).await;
        let low = r.retrieve("q", 10, None, ConfidenceTier::Low).await;

        let ids = |v: &[EvidenceChunk]| v.iter().map(|c| c.id.clone()).collect::<BTreeSet<_>>();
        assert!(ids(&high).is_subset(&ids(&medium)));
        assert!(ids(&medium).is_subset(&ids(&low)));
        assert_eq!(low.len(), 4);
    }

    #[tokio::test]
    async fn store_failure_yields_empty() {
        let store = Arc::new(RecordingVectorStore::failing());
        let chunks = retriever(store.clone())
            .retrieve("groundwater", 10, None, ConfidenceTier::Low)
            .await;
        assert!(chunks.is_empty());
        assert_eq!(store.queries().len(), 1);
    }

    #[tokio::test]
    async fn embedding_failure_yields_empty_without_search() {
        let store = Arc::new(RecordingVectorStore::new(pool()));
        let r = Retriever::new(Arc::new(FixedEmbedder::failing()), store.clone());
        let chunks = r.retrieve("groundwater", 10, None, ConfidenceTier::Low).await;
        assert!(chunks.is_empty());
        assert!(store.queries().is_empty());
    }

    #[tokio::test]
    async fn ties_broken_by_id() {
        let store = Arc::new(RecordingVectorStore::new(vec![
            chunk("b", ConfidenceTier::High, &[HazardLayer::DrainageBackflow], 0.8),
            chunk("a", ConfidenceTier::High, &[HazardLayer::DrainageBackflow], 0.8),
        ]));
        let chunks = retriever(store).retrieve("q", 10, None, ConfidenceTier::High).await;
        assert_eq!(chunks[0].id, "a");
        assert_eq!(chunks[1].id, "b");
    }

    #[tokio::test]
    async fn nan_scores_rank_last() {
        let mut pool: Vec<EvidenceChunk> = (0..50)
            .map(|i| {
                let similarity = if i % 7 == 0 { f32::NAN } else { i as f32 / 50.0 };
                chunk(&format!("c{i:02}"), ConfidenceTier::High, &[HazardLayer::CompoundFlooding], similarity)
            })
            .collect();
        pool.reverse();

        let chunks = retriever(Arc::new(RecordingVectorStore::new(pool)))
            .retrieve("q", 3, None, ConfidenceTier::High)
            .await;
        let ids: Vec<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c48", "c47", "c46"]);
    }

    #[tokio::test]
    async fn top_k_truncates() {
        let r = retriever(Arc::new(RecordingVectorStore::new(pool())));
        let chunks = r.retrieve("q", 2, None, ConfidenceTier::Low).await;
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].id, "c-wave");
    }
}
