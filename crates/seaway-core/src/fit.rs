//! Log-log fit of embedded distance against least-cost distance.
//!
//! A slope near 1 with high R² means the embedding preserves the scale of the
//! cost distances, not only their order. Pairs with a zero distance on either
//! side have no logarithm and are left out.

use serde::{Deserialize, Serialize};

use crate::distance::DistanceMatrix;
use crate::mds::Embedding;

/// OLS summary of `ln(embedded) = slope · ln(cost) + intercept`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitSummary {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
    /// Pairs that entered the regression.
    pub n_pairs: usize,
    /// Stress of the embedding the fit was taken from.
    pub stress: f64,
}

/// Fit over all pairs i < j with both distances strictly positive.
/// Returns `None` when fewer than two pairs qualify or the embedding does not
/// match the matrix.
pub fn fit_log_log(matrix: &DistanceMatrix, embedding: &Embedding, stress: f64) -> Option<FitSummary> {
    if matrix.n() != embedding.n() {
        return None;
    }

    let (xs, ys): (Vec<f64>, Vec<f64>) = matrix
        .upper_triangle()
        .filter_map(|(i, j, cost)| {
            let e = embedding.distance(i, j);
            (cost > 0.0 && e > 0.0 && cost.is_finite()).then(|| (cost.ln(), e.ln()))
        })
        .unzip();
    if xs.len() < 2 {
        return None;
    }

    let n = xs.len() as f64;
    let sum_x: f64 = xs.iter().sum();
    let sum_y: f64 = ys.iter().sum();
    let sum_xx: f64 = xs.iter().map(|x| x * x).sum();
    let sum_xy: f64 = xs.iter().zip(ys.iter()).map(|(x, y)| x * y).sum();

    let denom = n * sum_xx - sum_x * sum_x;
    let slope = if denom.abs() < 1e-12 { 0.0 } else { (n * sum_xy - sum_x * sum_y) / denom };
    let intercept = (sum_y - slope * sum_x) / n;

    // R² = 1 − SS_res / SS_tot
    let y_mean = sum_y / n;
    let ss_tot: f64 = ys.iter().map(|y| (y - y_mean).powi(2)).sum();
    let ss_res: f64 = xs
        .iter()
        .zip(ys.iter())
        .map(|(x, y)| (y - (slope * x + intercept)).powi(2))
        .sum();
    let r_squared = if ss_tot < 1e-12 { 0.0 } else { 1.0 - ss_res / ss_tot };

    Some(FitSummary { slope, intercept, r_squared, n_pairs: xs.len(), stress })
}
