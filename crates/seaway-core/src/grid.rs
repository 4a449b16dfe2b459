//! Navigable grid graph over a [`RasterGrid`].
//!
//! Every cell is a node; edges connect a cell to its 8 neighbours
//! (4 orthogonal + 4 diagonal). A [`BarrierPredicate`] marks cells outside the
//! allowed elevation band as blocked, and blocked cells have no edges at all,
//! so barriers are absolute rather than merely expensive.
//!
//! Diagonal moves between two navigable cells are allowed even when both
//! orthogonal cells they pass between are blocked.

use serde::{Deserialize, Serialize};

use crate::coords::LatLon;
use crate::raster::{RasterGrid, Site};

/// Flat row-major cell index, `row * width + col`.
pub type CellIndex = usize;

/// 8-connected neighbour offsets `(d_row, d_col, step in cell units)`.
/// Direction `i` and direction `7 - i` are opposites.
pub const NEIGHBORS: [(isize, isize, f64); 8] = [
    (-1, -1, std::f64::consts::SQRT_2),
    (-1,  0, 1.0),
    (-1,  1, std::f64::consts::SQRT_2),
    ( 0, -1, 1.0),
    ( 0,  1, 1.0),
    ( 1, -1, std::f64::consts::SQRT_2),
    ( 1,  0, 1.0),
    ( 1,  1, std::f64::consts::SQRT_2),
];

/// Index of the direction pointing back along `dir`.
#[inline]
pub const fn opposite(dir: usize) -> usize {
    7 - dir
}

// ── Barrier predicate ─────────────────────────────────────────────────────────

/// Elevation band that counts as navigable medium.
///
/// A cell is navigable iff its elevation `e` is finite and
/// `min_elevation ≤ e < max_elevation`. The upper bound is the "land" side and
/// is exclusive: with the default `max_elevation = 0.0`, sea level itself is
/// coastline, not water.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BarrierPredicate {
    /// Deepest allowed elevation (metres, negative below sea level).
    pub min_elevation: f32,
    /// Exclusive upper bound (metres).
    pub max_elevation: f32,
}

impl Default for BarrierPredicate {
    fn default() -> Self {
        Self {
            min_elevation: f32::NEG_INFINITY,
            max_elevation: 0.0,
        }
    }
}

impl BarrierPredicate {
    pub fn new(min_elevation: f32, max_elevation: f32) -> Self {
        Self { min_elevation, max_elevation }
    }

    /// Navigable band for vessels or organisms that stay between `max_depth`
    /// and `min_depth` metres below the surface (both positive).
    pub fn depth_band(min_depth: f32, max_depth: f32) -> Self {
        Self {
            min_elevation: -max_depth,
            max_elevation: -min_depth,
        }
    }

    #[inline]
    pub fn is_navigable(&self, elevation: f32) -> bool {
        elevation.is_finite() && elevation >= self.min_elevation && elevation < self.max_elevation
    }
}

// ── Step metric ───────────────────────────────────────────────────────────────

/// How the geometric length of one grid step is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepMetric {
    /// 1 for orthogonal steps, √2 for diagonal steps.
    Cells,
    /// Great-circle kilometres between the two cell centres.
    #[default]
    Geodesic,
}

// ── Grid graph ────────────────────────────────────────────────────────────────

/// Raster plus navigability mask.
pub struct GridGraph<'a> {
    raster: &'a RasterGrid,
    barrier: BarrierPredicate,
    metric: StepMetric,
    navigable: Vec<bool>,
}

impl<'a> GridGraph<'a> {
    /// Precompute the navigability mask. The raster is assumed validated.
    pub fn new(raster: &'a RasterGrid, barrier: BarrierPredicate, metric: StepMetric) -> Self {
        let navigable = raster.data.iter().map(|&e| barrier.is_navigable(e)).collect();
        Self { raster, barrier, metric, navigable }
    }

    #[inline]
    pub fn raster(&self) -> &RasterGrid {
        self.raster
    }

    #[inline]
    pub fn barrier(&self) -> BarrierPredicate {
        self.barrier
    }

    #[inline]
    pub fn metric(&self) -> StepMetric {
        self.metric
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.raster.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.raster.height
    }

    #[inline]
    pub fn cell(&self, row: usize, col: usize) -> CellIndex {
        row * self.raster.width + col
    }

    #[inline]
    pub fn is_navigable(&self, cell: CellIndex) -> bool {
        self.navigable[cell]
    }

    /// Number of navigable cells.
    pub fn navigable_count(&self) -> usize {
        self.navigable.iter().filter(|&&n| n).count()
    }

    /// Cell reached by moving one step in direction `dir` from `cell`,
    /// or None at the raster edge.
    #[inline]
    pub fn step(&self, cell: CellIndex, dir: usize) -> Option<CellIndex> {
        let w = self.raster.width as isize;
        let h = self.raster.height as isize;
        let (dr, dc, _) = NEIGHBORS[dir];
        let r = (cell / self.raster.width) as isize + dr;
        let c = (cell % self.raster.width) as isize + dc;
        if r < 0 || c < 0 || r >= h || c >= w {
            return None;
        }
        Some((r * w + c) as usize)
    }

    /// Navigable neighbours of a navigable cell as `(direction, neighbour)`.
    /// A blocked cell has no neighbours.
    pub fn neighbors(&self, cell: CellIndex) -> impl Iterator<Item = (usize, CellIndex)> + '_ {
        let open = self.navigable[cell];
        (0..NEIGHBORS.len()).filter_map(move |dir| {
            if !open {
                return None;
            }
            self.step(cell, dir)
                .filter(|&n| self.navigable[n])
                .map(|n| (dir, n))
        })
    }

    /// Geometric length of a step in direction `dir` starting on `row`.
    ///
    /// Longitude spacing is uniform, so the length only depends on the row
    /// and the direction.
    pub fn step_length(&self, row: usize, dir: usize) -> f64 {
        let (dr, dc, cells) = NEIGHBORS[dir];
        match self.metric {
            StepMetric::Cells => cells,
            StepMetric::Geodesic => {
                let from = self.raster.cell_center(row, 0);
                let to_row = (row as isize + dr).clamp(0, self.raster.height as isize - 1) as usize;
                let lat_to = self.raster.cell_center(to_row, 0).lat;
                let dlon = if self.raster.width > 1 {
                    (self.raster.max_lon - self.raster.min_lon) / (self.raster.width - 1) as f64
                } else {
                    0.0
                };
                from.haversine_km(LatLon::new(lat_to, from.lon + dc as f64 * dlon))
            }
        }
    }
}

// ── Site classification ───────────────────────────────────────────────────────

/// Where a site lands on the grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Placement {
    Navigable { row: usize, col: usize },
    Blocked { row: usize, col: usize, elevation: f32 },
    OutOfBounds,
}

/// Per-site navigability report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteClass {
    pub id: String,
    pub lon: f64,
    pub lat: f64,
    pub placement: Placement,
}

impl SiteClass {
    pub fn is_navigable(&self) -> bool {
        matches!(self.placement, Placement::Navigable { .. })
    }
}

/// Snap every site to its nearest cell and classify it against the barrier.
/// Output order matches `sites`.
pub fn classify_sites(raster: &RasterGrid, barrier: &BarrierPredicate, sites: &[Site]) -> Vec<SiteClass> {
    sites
        .iter()
        .map(|s| {
            let placement = match raster.nearest_cell(s.lon, s.lat) {
                None => Placement::OutOfBounds,
                Some((row, col)) => {
                    let elevation = raster.get(row, col);
                    if barrier.is_navigable(elevation) {
                        Placement::Navigable { row, col }
                    } else {
                        Placement::Blocked { row, col, elevation }
                    }
                }
            };
            SiteClass { id: s.id.clone(), lon: s.lon, lat: s.lat, placement }
        })
        .collect()
}
