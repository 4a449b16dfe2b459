//! Monotone (isotonic) regression for Kruskal disparities.
//!
//! Pool-adjacent-violators over values already arranged in dissimilarity
//! order. Tied dissimilarities are handled with Kruskal's primary approach
//! (tied pairs may be reordered freely) or the secondary approach (tied pairs
//! must receive equal disparities).

use std::ops::Range;

use serde::{Deserialize, Serialize};

/// Treatment of tied input dissimilarities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieHandling {
    /// Within a tie block, order pairs by their current distance.
    #[default]
    Primary,
    /// A tie block is fitted as a single pooled value.
    Secondary,
}

/// Weighted least-squares non-decreasing fit of `values`.
///
/// Returns one fitted value per input. `weights` must be positive and the
/// same length as `values`.
pub fn pava(values: &[f64], weights: &[f64]) -> Vec<f64> {
    debug_assert_eq!(values.len(), weights.len());

    // Each pool: (weighted mean, total weight, number of members).
    let mut pools: Vec<(f64, f64, usize)> = Vec::with_capacity(values.len());
    for (&v, &w) in values.iter().zip(weights) {
        pools.push((v, w, 1));
        while pools.len() > 1 {
            let (m2, w2, c2) = pools[pools.len() - 1];
            let (m1, w1, c1) = pools[pools.len() - 2];
            if m1 <= m2 {
                break;
            }
            pools.truncate(pools.len() - 2);
            let w = w1 + w2;
            pools.push(((m1 * w1 + m2 * w2) / w, w, c1 + c2));
        }
    }

    let mut fitted = Vec::with_capacity(values.len());
    for (m, _, c) in pools {
        fitted.extend(std::iter::repeat(m).take(c));
    }
    fitted
}

/// Disparities for every pair.
///
/// * `order` — pair indices sorted by ascending dissimilarity.
/// * `blocks` — ranges into `order` whose dissimilarities are tied.
/// * `distances` — current configuration distance of each pair.
///
/// The result is indexed by pair, like `distances`.
pub fn disparities(order: &[usize], blocks: &[Range<usize>], distances: &[f64], ties: TieHandling) -> Vec<f64> {
    let mut dhat = vec![0.0; distances.len()];
    match ties {
        TieHandling::Primary => {
            let mut seq: Vec<usize> = Vec::with_capacity(order.len());
            for block in blocks {
                let start = seq.len();
                seq.extend_from_slice(&order[block.clone()]);
                seq[start..].sort_by(|&a, &b| distances[a].total_cmp(&distances[b]).then(a.cmp(&b)));
            }
            let values: Vec<f64> = seq.iter().map(|&p| distances[p]).collect();
            let fitted = pava(&values, &vec![1.0; values.len()]);
            for (&p, f) in seq.iter().zip(fitted) {
                dhat[p] = f;
            }
        }
        TieHandling::Secondary => {
            let means: Vec<f64> = blocks
                .iter()
                .map(|b| order[b.clone()].iter().map(|&p| distances[p]).sum::<f64>() / b.len() as f64)
                .collect();
            let weights: Vec<f64> = blocks.iter().map(|b| b.len() as f64).collect();
            let fitted = pava(&means, &weights);
            for (block, f) in blocks.iter().zip(fitted) {
                for &p in &order[block.clone()] {
                    dhat[p] = f;
                }
            }
        }
    }
    dhat
}
