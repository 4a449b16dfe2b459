//! Pairwise least-cost distance matrix.
//!
//! Site placement is validated against the barrier before any transition
//! model is built or any search is started. Searches run from each site to
//! the sites after it; the upper triangle is mirrored, so the medium is
//! treated as bidirectionally symmetric even under an asymmetric transform.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::conductance::{ConductanceTransform, TransitionModel};
use crate::error::{Error, Result};
use crate::grid::{BarrierPredicate, CellIndex, GridGraph, StepMetric};
use crate::raster::{RasterGrid, Site};
use crate::router::{snap_sites, LeastCostRouter};

/// Relative tolerance for the symmetry check on externally supplied matrices.
const SYMMETRY_TOL: f64 = 1e-9;

// ── Distance matrix ───────────────────────────────────────────────────────────

/// Symmetric, zero-diagonal N×N matrix, row-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistanceMatrix {
    n: usize,
    data: Vec<f64>,
}

impl DistanceMatrix {
    /// Mirror upper-triangle rows (as returned by
    /// [`LeastCostRouter::upper_triangle`]) into a full matrix.
    pub fn from_upper(n: usize, upper: &[Vec<f64>]) -> Self {
        let mut data = vec![0.0; n * n];
        for (i, row) in upper.iter().enumerate() {
            for (k, &d) in row.iter().enumerate() {
                let j = i + 1 + k;
                data[i * n + j] = d;
                data[j * n + i] = d;
            }
        }
        Self { n, data }
    }

    /// Build from full rows and check the matrix invariants.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        let n = rows.len();
        if let Some(bad) = rows.iter().position(|r| r.len() != n) {
            return Err(Error::InvalidInput(format!(
                "distance matrix row {bad} has {} entries, expected {n}",
                rows[bad].len()
            )));
        }
        let m = Self { n, data: rows.into_iter().flatten().collect() };
        m.validate()?;
        Ok(m)
    }

    #[inline]
    pub fn n(&self) -> usize {
        self.n
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.n + j]
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.n..(i + 1) * self.n]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// `(i, j, d)` for every pair `i < j`, in row-major order.
    pub fn upper_triangle(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        (0..self.n).flat_map(move |i| ((i + 1)..self.n).map(move |j| (i, j, self.get(i, j))))
    }

    /// Largest off-diagonal entry (0 for N < 2).
    pub fn max(&self) -> f64 {
        self.upper_triangle().map(|(_, _, d)| d).fold(0.0, f64::max)
    }

    /// Finite, non-negative, zero diagonal, symmetric.
    pub fn validate(&self) -> Result<()> {
        for i in 0..self.n {
            if self.get(i, i) != 0.0 {
                return Err(Error::InvalidInput(format!(
                    "distance matrix diagonal ({i}, {i}) is {}",
                    self.get(i, i)
                )));
            }
            for j in (i + 1)..self.n {
                let (a, b) = (self.get(i, j), self.get(j, i));
                if !a.is_finite() || !b.is_finite() || a < 0.0 || b < 0.0 {
                    return Err(Error::InvalidInput(format!(
                        "distance ({i}, {j}) must be finite and non-negative, got {a} / {b}"
                    )));
                }
                if (a - b).abs() > SYMMETRY_TOL * a.abs().max(b.abs()).max(1.0) {
                    return Err(Error::InvalidInput(format!(
                        "distance matrix is not symmetric at ({i}, {j}): {a} vs {b}"
                    )));
                }
            }
        }
        Ok(())
    }
}

// ── Builder ───────────────────────────────────────────────────────────────────

/// Output of a distance build: the matrix plus the transition model, which
/// the caller may pass back for later builds over the same grid.
#[derive(Debug, Clone)]
pub struct DistanceOutput {
    pub matrix: DistanceMatrix,
    pub transition: Arc<TransitionModel>,
    /// Snapped cell of each site, in site order.
    pub cells: Vec<CellIndex>,
    /// Single-source searches run for this build.
    pub searches: usize,
}

/// Assembles the pairwise least-cost distance matrix for a site list.
#[derive(Debug, Clone, Default)]
pub struct DistanceMatrixBuilder {
    pub barrier: BarrierPredicate,
    pub metric: StepMetric,
    pub transform: ConductanceTransform,
}

impl DistanceMatrixBuilder {
    pub fn new(barrier: BarrierPredicate, metric: StepMetric, transform: ConductanceTransform) -> Self {
        Self { barrier, metric, transform }
    }

    /// Validate, build (or reuse) the transition model, and route all pairs.
    pub fn build(
        &self,
        raster: &RasterGrid,
        sites: &[Site],
        previous: Option<Arc<TransitionModel>>,
    ) -> Result<DistanceOutput> {
        raster.validate()?;
        let cells = self.validate_sites(raster, sites)?;

        let t0 = Instant::now();
        let graph = GridGraph::new(raster, self.barrier, self.metric);
        let transition = TransitionModel::build_or_reuse(&graph, &self.transform, previous)?;
        debug!(elapsed_ms = t0.elapsed().as_millis() as u64, "transition model ready");

        let router = LeastCostRouter::new(transition.clone());
        let matrix = route_cells(&router, sites, &cells)?;
        Ok(DistanceOutput {
            matrix,
            transition,
            cells,
            searches: router.searches_run(),
        })
    }

    /// Route all pairs with an existing router.
    ///
    /// The raster and site placement are checked first; on
    /// [`Error::InvalidGrid`] or [`Error::SiteOnBarrier`] no search has been
    /// started.
    pub fn route(
        &self,
        router: &LeastCostRouter,
        raster: &RasterGrid,
        sites: &[Site],
    ) -> Result<(DistanceMatrix, Vec<CellIndex>)> {
        raster.validate()?;
        let cells = self.validate_sites(raster, sites)?;
        let graph = GridGraph::new(raster, self.barrier, self.metric);
        router.model().check_compatible(&graph, &self.transform)?;
        let matrix = route_cells(router, sites, &cells)?;
        Ok((matrix, cells))
    }

    /// Snap sites and check them against the barrier. Fails with
    /// [`Error::SiteOnBarrier`] listing every blocked site.
    pub fn validate_sites(&self, raster: &RasterGrid, sites: &[Site]) -> Result<Vec<CellIndex>> {
        if sites.is_empty() {
            return Err(Error::InvalidInput("no sites given".into()));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = sites.iter().find(|s| !seen.insert(s.id.as_str())) {
            return Err(Error::InvalidInput(format!("duplicate site identifier {:?}", dup.id)));
        }

        let cells = snap_sites(raster, sites)?;
        let blocked: Vec<String> = sites
            .iter()
            .zip(&cells)
            .filter(|&(_, &cell)| !self.barrier.is_navigable(raster.data[cell]))
            .map(|(s, _)| s.id.clone())
            .collect();
        if !blocked.is_empty() {
            return Err(Error::SiteOnBarrier { sites: blocked });
        }
        Ok(cells)
    }
}

/// Upper-triangle searches between validated `cells`, mirrored into a full
/// matrix. Fails with [`Error::UnreachablePair`] naming every pair with no
/// water path.
fn route_cells(router: &LeastCostRouter, sites: &[Site], cells: &[CellIndex]) -> Result<DistanceMatrix> {
    let t0 = Instant::now();
    let upper = router.upper_triangle(cells);
    let matrix = DistanceMatrix::from_upper(sites.len(), &upper);

    let pairs: Vec<(String, String)> = matrix
        .upper_triangle()
        .filter(|(_, _, d)| !d.is_finite())
        .map(|(i, j, _)| (sites[i].id.clone(), sites[j].id.clone()))
        .collect();
    if !pairs.is_empty() {
        return Err(Error::UnreachablePair { pairs });
    }

    info!(
        sites = sites.len(),
        searches = upper.len(),
        workers = crate::parallel::worker_count(),
        max_distance = matrix.max(),
        elapsed_ms = t0.elapsed().as_millis() as u64,
        "least-cost distance matrix complete"
    );
    Ok(matrix)
}
