//! Least-cost routing over a [`TransitionModel`].
//!
//! Uses Dijkstra's algorithm on the 8-connected grid. The cost of an edge is
//! its step length divided by its conductance. Each search stops as soon as
//! every requested target has been settled, so searches from sites that sit
//! close together never explore the whole raster.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

use crate::conductance::TransitionModel;
use crate::error::{Error, Result};
use crate::grid::CellIndex;
use crate::parallel::*;
use crate::raster::{RasterGrid, Site};

/// State in the priority queue (min-heap via reversed ordering).
#[derive(Debug, Clone, Copy, PartialEq)]
struct State {
    cost: f64,
    cell: CellIndex,
}

impl Eq for State {}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap; ties broken on cell index so pops are
        // reproducible.
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.cell.cmp(&self.cell))
    }
}

/// Nearest raster cell to `site`.
pub fn snap(raster: &RasterGrid, site: &Site) -> Result<CellIndex> {
    raster
        .nearest_cell(site.lon, site.lat)
        .map(|(r, c)| r * raster.width + c)
        .ok_or_else(|| Error::InvalidInput(format!("site {} lies outside the raster bounds", site.id)))
}

/// Snap each site to its nearest raster cell, preserving order.
/// Fails with [`Error::InvalidInput`] naming every site outside the raster.
pub fn snap_sites(raster: &RasterGrid, sites: &[Site]) -> Result<Vec<CellIndex>> {
    let mut cells = Vec::with_capacity(sites.len());
    let mut outside = Vec::new();
    for s in sites {
        match snap(raster, s) {
            Ok(cell) => cells.push(cell),
            Err(_) => outside.push(s.id.as_str()),
        }
    }
    if !outside.is_empty() {
        return Err(Error::InvalidInput(format!(
            "sites outside raster bounds: {}",
            outside.join(", ")
        )));
    }
    Ok(cells)
}

/// Shortest-path engine sharing one read-only transition model across
/// worker threads.
pub struct LeastCostRouter {
    model: Arc<TransitionModel>,
    searches: AtomicUsize,
}

impl LeastCostRouter {
    pub fn new(model: Arc<TransitionModel>) -> Self {
        Self { model, searches: AtomicUsize::new(0) }
    }

    pub fn model(&self) -> &Arc<TransitionModel> {
        &self.model
    }

    /// Number of single-source searches started so far.
    pub fn searches_run(&self) -> usize {
        self.searches.load(AtomicOrdering::Relaxed)
    }

    /// Least cost from `source` to each of `targets`, in target order.
    /// Unreachable targets are `f64::INFINITY`.
    pub fn search(&self, source: CellIndex, targets: &[CellIndex]) -> Vec<f64> {
        self.searches.fetch_add(1, AtomicOrdering::Relaxed);

        let model = &*self.model;
        let mut dist = vec![f64::INFINITY; model.len()];
        let mut pending = vec![false; model.len()];
        let mut remaining = 0usize;
        for &t in targets {
            if !pending[t] {
                pending[t] = true;
                remaining += 1;
            }
        }

        let mut heap = BinaryHeap::new();
        dist[source] = 0.0;
        heap.push(State { cost: 0.0, cell: source });

        while let Some(State { cost, cell }) = heap.pop() {
            // Skip if we already found a better path
            if cost > dist[cell] {
                continue;
            }
            if pending[cell] {
                pending[cell] = false;
                remaining -= 1;
                if remaining == 0 {
                    break;
                }
            }
            for (nb, edge_cost) in model.edges(cell) {
                let next = cost + edge_cost;
                if next < dist[nb] {
                    dist[nb] = next;
                    heap.push(State { cost: next, cell: nb });
                }
            }
        }

        targets.iter().map(|&t| dist[t]).collect()
    }

    /// Accumulated least cost from `source` to every cell of the raster.
    /// Unreachable and blocked cells are `f64::INFINITY`.
    pub fn cost_surface(&self, source: CellIndex) -> Vec<f64> {
        let all: Vec<CellIndex> = (0..self.model.len()).collect();
        self.search(source, &all)
    }

    /// Upper-triangle costs between `cells`: row `i` holds the costs from
    /// `cells[i]` to `cells[i + 1..]`.
    ///
    /// Rows are independent searches spread over the worker pool; each worker
    /// owns the row it returns.
    pub fn upper_triangle(&self, cells: &[CellIndex]) -> Vec<Vec<f64>> {
        let n = cells.len();
        (0..n.saturating_sub(1))
            .into_par_iter()
            .map(|i| self.search(cells[i], &cells[i + 1..]))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conductance::ConductanceTransform;
    use crate::grid::{BarrierPredicate, GridGraph, StepMetric};
    use approx::assert_relative_eq;

    fn router_for(raster: &RasterGrid, transform: &ConductanceTransform) -> LeastCostRouter {
        let graph = GridGraph::new(raster, BarrierPredicate::default(), StepMetric::Cells);
        LeastCostRouter::new(Arc::new(TransitionModel::build(&graph, transform)))
    }

    fn open_water(n: usize) -> RasterGrid {
        RasterGrid::new(n, n, 0.0, (n - 1) as f64, 0.0, (n - 1) as f64, -50.0)
    }

    #[test]
    fn open_grid_costs_are_octile_distances() {
        let g = open_water(10);
        let router = router_for(&g, &ConductanceTransform::Uniform);
        let costs = router.search(0, &[1, 10, 11, 9, 99, 35]);
        let s2 = std::f64::consts::SQRT_2;
        assert_relative_eq!(costs[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(costs[1], 1.0, epsilon = 1e-12);
        assert_relative_eq!(costs[2], s2, epsilon = 1e-12);
        assert_relative_eq!(costs[3], 9.0, epsilon = 1e-12);
        assert_relative_eq!(costs[4], 9.0 * s2, epsilon = 1e-12);
        // (3, 5): 3 diagonal + 2 orthogonal steps.
        assert_relative_eq!(costs[5], 3.0 * s2 + 2.0, epsilon = 1e-12);
    }

    #[test]
    fn conductance_scales_costs() {
        let g = open_water(6);
        let half = router_for(&g, &ConductanceTransform::custom(|_, _| 0.5));
        let unit = router_for(&g, &ConductanceTransform::Uniform);
        let a = half.search(0, &[5, 35]);
        let b = unit.search(0, &[5, 35]);
        assert_relative_eq!(a[0], 2.0 * b[0], epsilon = 1e-12);
        assert_relative_eq!(a[1], 2.0 * b[1], epsilon = 1e-12);
    }

    #[test]
    fn path_detours_around_land() {
        // 7×7 water with a land wall in column 3, open only at the top row.
        let g = RasterGrid::from_fn(7, 7, 0.0, 6.0, 0.0, 6.0, |r, c| {
            if c == 3 && r < 6 { 10.0 } else { -10.0 }
        });
        let router = router_for(&g, &ConductanceTransform::Uniform);
        let direct = router.search(0, &[6]);
        assert!(direct[0] > 6.0, "wall must force a detour, got {}", direct[0]);
        // Every path crosses column 3 at the gap cell (6, 3).
        let s2 = std::f64::consts::SQRT_2;
        assert_relative_eq!(direct[0], 2.0 * (3.0 * s2 + 3.0), epsilon = 1e-9);
    }

    #[test]
    fn unreachable_target_is_infinite() {
        let g = RasterGrid::from_fn(5, 5, 0.0, 4.0, 0.0, 4.0, |_, c| if c == 2 { 1.0 } else { -1.0 });
        let router = router_for(&g, &ConductanceTransform::Uniform);
        let costs = router.search(0, &[1, 4]);
        assert!(costs[0].is_finite());
        assert!(costs[1].is_infinite());
    }

    #[test]
    fn source_as_target_costs_zero_and_duplicates_are_fine() {
        let g = open_water(5);
        let router = router_for(&g, &ConductanceTransform::Uniform);
        let costs = router.search(12, &[12, 14, 14]);
        assert_eq!(costs[0], 0.0);
        assert_eq!(costs[1], costs[2]);
        assert_relative_eq!(costs[1], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn early_exit_matches_full_surface() {
        let g = RasterGrid::from_fn(12, 12, 0.0, 11.0, 0.0, 11.0, |r, c| -(((r * 7 + c * 3) % 11) as f32) - 1.0);
        let router = router_for(&g, &ConductanceTransform::InverseDifference { scale: 3.0 });
        let surface = router.cost_surface(5);
        let targets = [17, 40, 77, 143];
        let early = router.search(5, &targets);
        for (k, &t) in targets.iter().enumerate() {
            assert_eq!(early[k], surface[t], "target {t}");
        }
    }

    #[test]
    fn upper_triangle_counts_searches() {
        let g = open_water(8);
        let router = router_for(&g, &ConductanceTransform::Uniform);
        let rows = router.upper_triangle(&[0, 7, 63, 56]);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows.iter().map(Vec::len).collect::<Vec<_>>(), vec![3, 2, 1]);
        assert_eq!(router.searches_run(), 3);
        assert!(router.upper_triangle(&[9]).is_empty());
    }

    #[test]
    fn snap_sites_reports_sites_outside_bounds() {
        let g = open_water(5);
        let sites = vec![Site::new("in", 1.2, 3.9), Site::new("out", 9.0, 1.0), Site::new("south", 1.0, -1.0)];
        let err = snap_sites(&g, &sites).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("out") && msg.contains("south") && !msg.contains("in,"), "got {msg}");
        assert_eq!(snap_sites(&g, &sites[..1]).unwrap(), vec![4 * 5 + 1]);
        assert_eq!(snap(&g, &sites[0]).unwrap(), 21);
        assert!(matches!(snap(&g, &sites[1]), Err(Error::InvalidInput(_))));
    }
}
