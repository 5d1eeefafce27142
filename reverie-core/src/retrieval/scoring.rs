//! Per-factor scoring for focal-point retrieval.
//!
//! score = w_rec·recency·0.5 + w_rel·relevance·2 + w_imp·importance·3
//!
//! Each factor is min-max normalized over the candidate set first:
//!   recency    = decay^rank, rank 1 for the most recently accessed node
//!   relevance  = cosine(node embedding, focal embedding)
//!   importance = poignancy

use crate::types::RetrievalScore;

/// Agent-level weights on the three factors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalWeights {
    /// Weight on recency.
    pub recency: f64,
    /// Weight on relevance.
    pub relevance: f64,
    /// Weight on importance.
    pub importance: f64,
    /// Per-rank decay base.
    pub decay: f64,
}

impl Default for RetrievalWeights {
    fn default() -> Self {
        Self {
            recency: 1.0,
            relevance: 1.0,
            importance: 1.0,
            decay: 0.99,
        }
    }
}

/// Fixed multipliers applied after the weights.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FactorMultipliers {
    /// On recency.
    pub recency: f64,
    /// On relevance.
    pub relevance: f64,
    /// On importance.
    pub importance: f64,
}

/// Raw recency scores for `n` candidates ordered oldest → newest.
///
/// The last (newest) candidate gets rank 1 and thus `decay^1`.
#[must_use]
pub fn recency_scores(n: usize, decay: f64) -> Vec<f64> {
    (0..n)
        .map(|i| {
            let rank = i32::try_from(n - i).unwrap_or(i32::MAX);
            decay.powi(rank)
        })
        .collect()
}

/// Min-max normalize into `[0, 1]`.
///
/// A constant input maps every value to `0.5`.
#[must_use]
pub fn normalize(values: &[f64]) -> Vec<f64> {
    let Some(min) = values.iter().copied().reduce(f64::min) else {
        return Vec::new();
    };
    let max = values.iter().copied().fold(min, f64::max);
    let range = max - min;
    if range <= 0.0 {
        return vec![0.5; values.len()];
    }
    values.iter().map(|v| (v - min) / range).collect()
}

/// Combine the three normalized factors into one score per candidate.
#[must_use]
pub fn combine(
    recency: &[f64],
    relevance: &[f64],
    importance: &[f64],
    weights: RetrievalWeights,
    multipliers: FactorMultipliers,
) -> Vec<RetrievalScore> {
    recency
        .iter()
        .zip(relevance)
        .zip(importance)
        .map(|((rec, rel), imp)| {
            RetrievalScore::new(
                weights.recency * rec * multipliers.recency
                    + weights.relevance * rel * multipliers.relevance
                    + weights.importance * imp * multipliers.importance,
            )
        })
        .collect()
}

/// Indices of the `n` highest scores.
///
/// Equal scores keep their input order.
#[must_use]
pub fn top_indices(scores: &[RetrievalScore], n: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].cmp(&scores[a]));
    order.truncate(n);
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newest_candidate_has_highest_recency() {
        let r = recency_scores(3, 0.99);
        assert!(r[2] > r[1] && r[1] > r[0]);
        assert!((r[2] - 0.99).abs() < 1e-12);
    }

    #[test]
    fn normalization_bounds() {
        let n = normalize(&[3.0, 1.0, 2.0]);
        assert_eq!(n, vec![1.0, 0.0, 0.5]);
    }

    #[test]
    fn degenerate_normalization_is_half() {
        assert_eq!(normalize(&[4.0, 4.0, 4.0]), vec![0.5; 3]);
        assert!(normalize(&[]).is_empty());
    }

    #[test]
    fn top_indices_is_stable_on_ties() {
        let scores: Vec<_> = [1.0, 2.0, 1.0, 2.0].into_iter().map(RetrievalScore::new).collect();
        assert_eq!(top_indices(&scores, 3), vec![1, 3, 0]);
    }

    #[test]
    fn combine_applies_weights_and_multipliers() {
        let m = FactorMultipliers {
            recency: 0.5,
            relevance: 2.0,
            importance: 3.0,
        };
        let s = combine(&[1.0], &[1.0], &[1.0], RetrievalWeights::default(), m);
        assert!((s[0].value() - 5.5).abs() < 1e-12);
    }
}
