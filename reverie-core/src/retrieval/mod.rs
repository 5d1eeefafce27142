//! Focal-point retrieval over an agent's events and thoughts.
//!
//! For each focal point the engine ranks every non-idle event and thought
//! by recency, relevance and importance, returns the top N, and stamps the
//! winners' `last_accessed` with the current time. Retrieval is therefore
//! not read-only: it is how recency evolves.

pub mod scoring;

use std::collections::BTreeMap;

use tracing::debug;

use crate::config::RetrievalConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::Result;
use crate::memory::{MemoryStore, NodeId};
use crate::types::{RetrievalScore, SimTime};

pub use scoring::{FactorMultipliers, RetrievalWeights};

/// One ranked node.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalResult {
    /// The node.
    pub node: NodeId,
    /// Combined score.
    pub score: RetrievalScore,
    /// Normalized factors before weighting.
    pub breakdown: ScoreBreakdown,
}

/// Normalized per-factor values of one node.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScoreBreakdown {
    /// Recency in `[0, 1]`.
    pub recency: f64,
    /// Relevance in `[0, 1]`.
    pub relevance: f64,
    /// Importance in `[0, 1]`.
    pub importance: f64,
}

/// Ranks memory nodes for focal points.
#[derive(Debug, Clone)]
pub struct RetrievalEngine {
    config: RetrievalConfig,
}

impl RetrievalEngine {
    /// Create an engine.
    #[must_use]
    pub fn new(config: RetrievalConfig) -> Self {
        Self { config }
    }

    /// Default result count per focal point.
    #[must_use]
    pub fn top_n(&self) -> usize {
        self.config.top_n
    }

    fn multipliers(&self) -> FactorMultipliers {
        FactorMultipliers {
            recency: self.config.recency_factor,
            relevance: self.config.relevance_factor,
            importance: self.config.importance_factor,
        }
    }

    /// Rank nodes for every focal point independently.
    ///
    /// Selected nodes get `last_accessed = now` right after their focal
    /// point is scored, so later focal points in the same call already see
    /// the updated recency.
    ///
    /// # Errors
    /// Propagates embedding failures.
    pub fn retrieve(
        &self,
        memory: &mut MemoryStore,
        embedder: &dyn EmbeddingProvider,
        weights: RetrievalWeights,
        focal_points: &[String],
        top_n: usize,
        now: SimTime,
    ) -> Result<BTreeMap<String, Vec<RetrievalResult>>> {
        let mut out = BTreeMap::new();
        for focal in focal_points {
            let ranked = self.rank(memory, embedder, weights, focal, top_n)?;
            let ids: Vec<NodeId> = ranked.iter().map(|r| r.node).collect();
            memory.touch(&ids, now);
            debug!(focal = %focal, selected = ids.len(), "Focal point retrieved");
            out.insert(focal.clone(), ranked);
        }
        Ok(out)
    }

    /// Score one focal point without touching `last_accessed`.
    ///
    /// # Errors
    /// Propagates embedding failures.
    pub fn rank(
        &self,
        memory: &MemoryStore,
        embedder: &dyn EmbeddingProvider,
        weights: RetrievalWeights,
        focal: &str,
        top_n: usize,
    ) -> Result<Vec<RetrievalResult>> {
        let mut candidates: Vec<_> = memory
            .events()
            .chain(memory.thoughts())
            .filter(|n| !n.embedding_key.contains("idle"))
            .collect();
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        // Oldest access first; equal access times fall back to creation order.
        candidates.sort_by_key(|n| (n.last_accessed, n.id));

        let focal_embedding = embedder.embed(focal)?;

        let recency = scoring::normalize(&scoring::recency_scores(candidates.len(), weights.decay));
        let importance = scoring::normalize(
            &candidates
                .iter()
                .map(|n| f64::from(n.poignancy))
                .collect::<Vec<_>>(),
        );
        let relevance = scoring::normalize(
            &candidates
                .iter()
                .map(|n| {
                    memory
                        .embedding(&n.embedding_key)
                        .map_or(0.0, |e| f64::from(e.cosine_similarity(&focal_embedding)))
                })
                .collect::<Vec<_>>(),
        );

        let scores = scoring::combine(&recency, &relevance, &importance, weights, self.multipliers());

        Ok(scoring::top_indices(&scores, top_n)
            .into_iter()
            .map(|i| RetrievalResult {
                node: candidates[i].id,
                score: scores[i],
                breakdown: ScoreBreakdown {
                    recency: recency[i],
                    relevance: relevance[i],
                    importance: importance[i],
                },
            })
            .collect())
    }
}

impl Default for RetrievalEngine {
    fn default() -> Self {
        Self::new(RetrievalConfig::default())
    }
}
