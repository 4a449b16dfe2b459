//! Nonmetric multidimensional scaling (Kruskal / Shepard).
//!
//! Embeds a distance matrix into k Euclidean dimensions so that the rank
//! order of embedded distances follows the rank order of the input
//! distances. Each iteration:
//!   1. Euclidean distances of the current configuration.
//!   2. Disparities by monotone regression against input rank order.
//!   3. Kruskal stress-1: √(Σ(d̂ − d)² / Σd²).
//!   4. Guttman transform (SMACOF majorization step) towards the
//!      disparities, normalised so Σd̂² equals the number of pairs.
//!
//! The solver is deterministic: the classical-scaling start has no random
//! component, and any random fill uses `StdRng` seeded from the config.
mod classical;
pub mod isotonic;

use std::ops::Range;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::distance::DistanceMatrix;
use crate::error::{Error, Result};
use crate::parallel::*;
use classical::classical_scaling;
pub use isotonic::TieHandling;
use isotonic::disparities;

/// Conventional boundary between an acceptable embedding and one that
/// should be reviewed.
pub const STRESS_ADVISORY_THRESHOLD: f64 = 0.05;

/// Relative tolerance under which two input distances count as tied.
const TIE_TOL: f64 = 1e-12;

/// Eigenvalues below this fraction of the largest are treated as absent
/// dimensions in the classical start.
const EIGEN_FLOOR: f64 = 1e-10;

// ── Configuration ─────────────────────────────────────────────────────────────

/// Starting configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MdsInit {
    /// Torgerson classical scaling; empty dimensions are filled from the seed.
    #[default]
    Classical,
    /// Uniform random coordinates from the seed.
    Random,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MdsConfig {
    /// Target dimensionality k.
    pub dimensions: usize,
    pub max_iterations: u32,
    /// Stop when stress improves by less than this between iterations.
    pub tolerance: f64,
    /// Stop as soon as stress falls to or below this value.
    pub min_stress: f64,
    pub seed: u64,
    pub init: MdsInit,
    pub ties: TieHandling,
    /// Optional wall-clock cap for the iteration loop, milliseconds.
    pub time_limit_ms: Option<u64>,
}

impl Default for MdsConfig {
    fn default() -> Self {
        Self {
            dimensions: 2,
            max_iterations: 500,
            tolerance: 1e-7,
            min_stress: 1e-9,
            seed: 42,
            init: MdsInit::Classical,
            ties: TieHandling::Primary,
            time_limit_ms: None,
        }
    }
}

// ── Embedding ─────────────────────────────────────────────────────────────────

/// N×k row-major coordinates, one row per site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    n: usize,
    k: usize,
    coords: Vec<f64>,
}

impl Embedding {
    pub fn from_coords(n: usize, k: usize, coords: Vec<f64>) -> Result<Self> {
        if coords.len() != n * k {
            return Err(Error::InvalidInput(format!(
                "embedding needs {} coordinates for {n}×{k}, got {}",
                n * k,
                coords.len()
            )));
        }
        Ok(Self { n, k, coords })
    }

    #[inline]
    pub fn n(&self) -> usize {
        self.n
    }

    #[inline]
    pub fn dims(&self) -> usize {
        self.k
    }

    #[inline]
    pub fn point(&self, i: usize) -> &[f64] {
        &self.coords[i * self.k..(i + 1) * self.k]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.coords
    }

    #[inline]
    pub fn distance(&self, i: usize, j: usize) -> f64 {
        euclidean(self.point(i), self.point(j))
    }

    /// Euclidean distances between all embedded points.
    pub fn distances(&self) -> DistanceMatrix {
        let rows: Vec<Vec<f64>> = (0..self.n.saturating_sub(1))
            .into_par_iter()
            .map(|i| ((i + 1)..self.n).map(|j| self.distance(i, j)).collect())
            .collect();
        DistanceMatrix::from_upper(self.n, &rows)
    }
}

#[inline]
fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum::<f64>().sqrt()
}

/// Outcome of one embedding run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MdsResult {
    pub embedding: Embedding,
    /// Kruskal stress-1 of `embedding`.
    pub stress: f64,
    /// Majorization steps taken.
    pub iterations: u32,
    /// False when the iteration cap or time limit ended the run.
    pub converged: bool,
}

impl MdsResult {
    pub fn exceeds_advisory_threshold(&self) -> bool {
        self.stress > STRESS_ADVISORY_THRESHOLD
    }
}

// ── Pair bookkeeping ──────────────────────────────────────────────────────────

/// Upper-triangle pairs ordered by dissimilarity, with tie blocks.
struct PairOrder {
    n: usize,
    /// Pair index → (i, j), row-major over i < j.
    pairs: Vec<(usize, usize)>,
    /// Pair indices sorted by ascending input distance.
    order: Vec<usize>,
    /// Ranges of `order` with tied input distances.
    blocks: Vec<Range<usize>>,
}

impl PairOrder {
    fn new(matrix: &DistanceMatrix) -> Self {
        let n = matrix.n();
        let pairs: Vec<(usize, usize)> = matrix.upper_triangle().map(|(i, j, _)| (i, j)).collect();
        let delta: Vec<f64> = matrix.upper_triangle().map(|(_, _, d)| d).collect();

        let mut order: Vec<usize> = (0..pairs.len()).collect();
        order.sort_by(|&a, &b| delta[a].total_cmp(&delta[b]).then(a.cmp(&b)));

        let mut blocks = Vec::new();
        let mut start = 0;
        for pos in 1..=order.len() {
            let split = pos == order.len() || {
                let (a, b) = (delta[order[pos - 1]], delta[order[pos]]);
                b - a > TIE_TOL * b.abs().max(1.0)
            };
            if split {
                blocks.push(start..pos);
                start = pos;
            }
        }
        Self { n, pairs, order, blocks }
    }

    fn pair_distances(&self, x: &[f64], k: usize) -> Vec<f64> {
        self.pairs
            .iter()
            .map(|&(i, j)| euclidean(&x[i * k..(i + 1) * k], &x[j * k..(j + 1) * k]))
            .collect()
    }

    /// Dense symmetric matrix from per-pair values.
    fn dense(&self, values: &[f64]) -> Vec<f64> {
        let mut m = vec![0.0; self.n * self.n];
        for (p, &(i, j)) in self.pairs.iter().enumerate() {
            m[i * self.n + j] = values[p];
            m[j * self.n + i] = values[p];
        }
        m
    }
}

fn kruskal_stress(dhat: &[f64], d: &[f64]) -> f64 {
    let num: f64 = dhat.iter().zip(d).map(|(a, b)| (a - b) * (a - b)).sum();
    let den: f64 = d.iter().map(|b| b * b).sum();
    if den <= 0.0 { 1.0 } else { (num / den).sqrt() }
}

/// Kruskal stress-1 of an arbitrary configuration against `matrix`.
pub fn stress_of(matrix: &DistanceMatrix, embedding: &Embedding, ties: TieHandling) -> Result<f64> {
    if matrix.n() != embedding.n() {
        return Err(Error::InvalidInput(format!(
            "matrix has {} sites but embedding has {}",
            matrix.n(),
            embedding.n()
        )));
    }
    let po = PairOrder::new(matrix);
    let d = po.pair_distances(embedding.as_slice(), embedding.dims());
    let dhat = disparities(&po.order, &po.blocks, &d, ties);
    Ok(kruskal_stress(&dhat, &d))
}

// ── Solver ────────────────────────────────────────────────────────────────────

/// Structural checks that make an embedding impossible or meaningless.
fn check_embeddable(matrix: &DistanceMatrix, k: usize) -> Result<()> {
    if k == 0 {
        return Err(Error::InvalidInput("embedding dimensionality must be at least 1".into()));
    }
    matrix.validate()?;
    let n = matrix.n();
    if n < k + 1 {
        return Err(Error::DegenerateEmbedding(format!(
            "{n} sites cannot define a {k}-dimensional embedding (need at least {})",
            k + 1
        )));
    }
    let mut it = matrix.upper_triangle().map(|(_, _, d)| d);
    if let Some(first) = it.next() {
        if it.all(|d| (d - first).abs() <= TIE_TOL * first.abs().max(1.0)) {
            return Err(Error::DegenerateEmbedding(format!(
                "all pairwise distances are equal ({first}); rank order is undefined"
            )));
        }
    }
    Ok(())
}

fn random_coords(rng: &mut StdRng, len: usize, scale: f64) -> Vec<f64> {
    (0..len).map(|_| rng.gen_range(-1.0..1.0) * scale).collect()
}

fn initial_configuration(matrix: &DistanceMatrix, cfg: &MdsConfig) -> Vec<f64> {
    let n = matrix.n();
    let k = cfg.dimensions;
    let mut rng = StdRng::seed_from_u64(cfg.seed);
    let pairs = (n * (n - 1) / 2).max(1) as f64;
    let mean_delta = matrix.upper_triangle().map(|(_, _, d)| d).sum::<f64>() / pairs;

    if cfg.init == MdsInit::Random {
        return random_coords(&mut rng, n * k, mean_delta.max(1.0));
    }

    let (mut coords, lambdas) = classical_scaling(matrix, k);
    let top = lambdas.first().copied().unwrap_or(0.0);
    if top <= 0.0 {
        debug!("classical start is empty; using seeded random start");
        return random_coords(&mut rng, n * k, mean_delta.max(1.0));
    }
    // Fill dimensions classical scaling cannot resolve with small seeded noise
    // so the majorization can still use them.
    let noise = 1e-2 * top.sqrt();
    for (dim, &lambda) in lambdas.iter().enumerate() {
        if lambda <= EIGEN_FLOOR * top {
            for i in 0..n {
                coords[i * k + dim] = rng.gen_range(-1.0..1.0) * noise;
            }
        }
    }
    coords
}

/// One Guttman transform: x'_i = (1/n) Σ_{j≠i} (d̂_ij / d_ij)(x_i − x_j).
fn guttman(x: &[f64], n: usize, k: usize, d: &[f64], dhat: &[f64]) -> Vec<f64> {
    let rows: Vec<Vec<f64>> = (0..n)
        .into_par_iter()
        .map(|i| {
            let xi = &x[i * k..(i + 1) * k];
            let mut out = vec![0.0; k];
            for j in 0..n {
                let dij = d[i * n + j];
                if j == i || dij <= 0.0 {
                    continue;
                }
                let r = dhat[i * n + j] / dij;
                for (a, o) in out.iter_mut().enumerate() {
                    *o += r * (xi[a] - x[j * k + a]);
                }
            }
            out.iter_mut().for_each(|o| *o /= n as f64);
            out
        })
        .collect();
    rows.into_iter().flatten().collect()
}

/// Embed `matrix` into `cfg.dimensions` Euclidean dimensions.
///
/// Fails with [`Error::DegenerateEmbedding`] when there are fewer than k + 1
/// sites or all distances are equal, and with [`Error::InvalidInput`] for a
/// matrix that is not a valid distance matrix. Non-convergence is not an
/// error: the best configuration found is returned with its stress.
pub fn embed(matrix: &DistanceMatrix, cfg: &MdsConfig) -> Result<MdsResult> {
    let k = cfg.dimensions;
    check_embeddable(matrix, k)?;
    if !cfg.tolerance.is_finite() || cfg.tolerance < 0.0 {
        return Err(Error::InvalidInput(format!("tolerance must be finite and ≥ 0, got {}", cfg.tolerance)));
    }

    let n = matrix.n();
    let po = PairOrder::new(matrix);
    let n_pairs = po.pairs.len() as f64;
    let deadline = cfg.time_limit_ms.map(|ms| Instant::now() + Duration::from_millis(ms));

    let mut x = initial_configuration(matrix, cfg);
    let mut best = (f64::INFINITY, x.clone());
    let mut prev = f64::INFINITY;
    let mut converged = false;
    let mut iterations = 0u32;

    loop {
        let d = po.pair_distances(&x, k);
        let dhat = disparities(&po.order, &po.blocks, &d, cfg.ties);
        let stress = kruskal_stress(&dhat, &d);
        if stress < best.0 {
            best = (stress, x.clone());
        }

        if stress <= cfg.min_stress || prev - stress < cfg.tolerance {
            converged = true;
            break;
        }
        if iterations >= cfg.max_iterations {
            break;
        }
        if deadline.is_some_and(|t| Instant::now() >= t) {
            debug!(iterations, "embedding time limit reached");
            break;
        }

        let ss: f64 = dhat.iter().map(|v| v * v).sum();
        let scale = if ss > 0.0 { (n_pairs / ss).sqrt() } else { 1.0 };
        let dhat: Vec<f64> = dhat.iter().map(|v| v * scale).collect();
        x = guttman(&x, n, k, &po.dense(&d), &po.dense(&dhat));

        prev = stress;
        iterations += 1;
    }

    let (stress, coords) = best;
    debug!(n, k, iterations, stress, converged, "nonmetric MDS finished");
    Ok(MdsResult {
        embedding: Embedding { n, k, coords },
        stress,
        iterations,
        converged,
    })
}
