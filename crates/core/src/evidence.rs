//! Evidence retrieval types: curated source chunks, confidence tiers, and the
//! embedding / vector-search collaborator traits.

use crate::error::RetrievalError;
use crate::layer::HazardLayer;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::str::FromStr;

/// Curator-assigned reliability of a chunk.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConfidenceTier {
    High,
    #[default]
    Medium,
    Low,
}

impl ConfidenceTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceTier::High => "HIGH",
            ConfidenceTier::Medium => "MEDIUM",
            ConfidenceTier::Low => "LOW",
        }
    }

    /// Tiers accepted when this tier is the minimum.
    ///
    /// Expansion is monotonic: `HIGH ⊆ MEDIUM ⊆ LOW`.
    pub fn allowed(&self) -> &'static [ConfidenceTier] {
        match self {
            ConfidenceTier::High => &[ConfidenceTier::High],
            ConfidenceTier::Medium => &[ConfidenceTier::High, ConfidenceTier::Medium],
            ConfidenceTier::Low => &[
                ConfidenceTier::High,
                ConfidenceTier::Medium,
                ConfidenceTier::Low,
            ],
        }
    }

    /// Whether `tier` passes a `self` minimum.
    pub fn admits(&self, tier: ConfidenceTier) -> bool {
        self.allowed().contains(&tier)
    }
}

impl std::fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfidenceTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "HIGH" => Ok(ConfidenceTier::High),
            "MEDIUM" => Ok(ConfidenceTier::Medium),
            "LOW" => Ok(ConfidenceTier::Low),
            other => Err(format!("unknown confidence tier: {other}")),
        }
    }
}

/// A retrievable unit of source text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceChunk {
    pub id: String,
    pub text: String,
    pub confidence: ConfidenceTier,

    /// Similarity to the query, higher is closer. Zero in a stored corpus.
    #[serde(default)]
    pub similarity: f32,

    #[serde(default)]
    pub layer_tags: Vec<HazardLayer>,
    #[serde(default)]
    pub location_tags: Vec<String>,
    #[serde(default)]
    pub measurement_tags: Vec<String>,
    #[serde(default)]
    pub timeframe_tags: Vec<String>,

    /// Source document name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_findings: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slr_projections: Option<String>,
}

impl EvidenceChunk {
    pub fn new(
        id: impl Into<String>,
        text: impl Into<String>,
        confidence: ConfidenceTier,
    ) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            confidence,
            similarity: 0.0,
            layer_tags: Vec::new(),
            location_tags: Vec::new(),
            measurement_tags: Vec::new(),
            timeframe_tags: Vec::new(),
            filename: None,
            key_findings: None,
            slr_projections: None,
        }
    }

    pub fn with_layers(mut self, layers: impl IntoIterator<Item = HazardLayer>) -> Self {
        self.layer_tags = layers.into_iter().collect();
        self
    }

    pub fn with_similarity(mut self, similarity: f32) -> Self {
        self.similarity = similarity;
        self
    }

    /// Non-empty intersection with `filter`.
    pub fn overlaps(&self, filter: &BTreeSet<HazardLayer>) -> bool {
        self.layer_tags.iter().any(|l| filter.contains(l))
    }

    /// Whether this chunk passes the query's layer and confidence filters.
    pub fn matches(&self, query: &VectorQuery) -> bool {
        let layer_ok = query.layers.as_ref().is_none_or(|f| self.overlaps(f));
        let tier_ok = query
            .confidences
            .as_ref()
            .is_none_or(|tiers| tiers.contains(&self.confidence));
        layer_ok && tier_ok
    }
}

/// Retrieval order: descending similarity, ties broken by ascending id.
///
/// A NaN similarity ranks below every real score.
pub fn rank_order(a: &EvidenceChunk, b: &EvidenceChunk) -> Ordering {
    rank_score(b.similarity)
        .total_cmp(&rank_score(a.similarity))
        .then_with(|| a.id.cmp(&b.id))
}

fn rank_score(similarity: f32) -> f32 {
    if similarity.is_nan() {
        f32::NEG_INFINITY
    } else {
        similarity
    }
}

/// A similarity search request against a [`VectorStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct VectorQuery {
    pub embedding: Vec<f32>,
    pub top_k: usize,
    /// When present, chunks must share at least one layer with this set.
    pub layers: Option<BTreeSet<HazardLayer>>,
    /// When present, chunks must carry one of these tiers.
    pub confidences: Option<Vec<ConfidenceTier>>,
}

/// Turns text into a fixed-length vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, RetrievalError>;
}

/// A similarity index over evidence chunks.
///
/// Results come back ordered by descending similarity.
#[async_trait]
pub trait VectorStore: Send + Sync {
    fn name(&self) -> &str;

    async fn search(
        &self,
        query: &VectorQuery,
    ) -> std::result::Result<Vec<EvidenceChunk>, RetrievalError>;

    async fn health_check(&self) -> std::result::Result<bool, RetrievalError> {
        Ok(true)
    }
}
