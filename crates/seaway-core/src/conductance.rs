//! Edge conductance model and the reusable transition structure.
//!
//! Conductance is the inverse of resistance: the cost of traversing an edge
//! is `step_length / conductance`. An edge with zero conductance does not
//! exist. Building the [`TransitionModel`] touches every cell of the grid and
//! dominates setup time, so it is built once, shared behind an `Arc`, and
//! may be persisted as JSON for later runs over the same grid.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::grid::{opposite, CellIndex, GridGraph, StepMetric, NEIGHBORS};
use crate::parallel::*;
use crate::raster::Fnv1a;

/// User-supplied conductance function of `(from, to)` elevations.
pub type ConductanceFn = Arc<dyn Fn(f32, f32) -> f64 + Send + Sync>;

/// How conductance between two navigable cells is derived from their
/// elevations.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConductanceTransform {
    /// Every edge between navigable cells has conductance 1.
    #[default]
    Uniform,
    /// `1 / (1 + |e_from − e_to| / scale)`: steep seabed is slower to cross.
    InverseDifference { scale: f64 },
    /// Arbitrary, possibly asymmetric, function. Results that are not finite
    /// and strictly positive remove the edge.
    #[serde(skip)]
    Custom(ConductanceFn),
}

impl fmt::Debug for ConductanceTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uniform => write!(f, "Uniform"),
            Self::InverseDifference { scale } => {
                f.debug_struct("InverseDifference").field("scale", scale).finish()
            }
            Self::Custom(_) => write!(f, "Custom(<fn>)"),
        }
    }
}

impl ConductanceTransform {
    pub fn custom(f: impl Fn(f32, f32) -> f64 + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(f))
    }

    /// Conductance of the directed edge `from → to`; 0 means no edge.
    pub fn conductance(&self, from: f32, to: f32) -> f64 {
        let g = match self {
            Self::Uniform => 1.0,
            Self::InverseDifference { scale } => {
                1.0 / (1.0 + (from as f64 - to as f64).abs() / scale.max(f64::MIN_POSITIVE))
            }
            Self::Custom(f) => f(from, to),
        };
        if g.is_finite() && g > 0.0 { g } else { 0.0 }
    }

    /// Symmetric transforms give reciprocal conductances in both directions.
    pub fn is_symmetric(&self) -> bool {
        !matches!(self, Self::Custom(_))
    }

    /// Stable identity of the transform, mixed into the model fingerprint.
    /// A custom function has none, so models built from one are never reused.
    pub fn key(&self) -> Option<u64> {
        match self {
            Self::Uniform => Some(1),
            Self::InverseDifference { scale } => {
                let mut h = Fnv1a::new();
                h.write_u64(2);
                h.write_u64(scale.to_bits());
                Some(h.finish())
            }
            Self::Custom(_) => None,
        }
    }
}

// ── Transition model ──────────────────────────────────────────────────────────

/// Directed conductance of every edge of a [`GridGraph`].
///
/// `conductance[cell][dir]` is zero for edges leaving the raster and for any
/// edge touching a blocked cell. Step lengths depend only on the row and the
/// direction, so they are stored per row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionModel {
    pub width: usize,
    pub height: usize,
    fingerprint: u64,
    /// False when built from a transform without a [`ConductanceTransform::key`].
    #[serde(default)]
    keyed: bool,
    conductance: Vec<[f64; 8]>,
    row_steps: Vec<[f64; 8]>,
}

impl TransitionModel {
    /// Build the transition structure for `graph` under `transform`.
    pub fn build(graph: &GridGraph<'_>, transform: &ConductanceTransform) -> Self {
        let raster = graph.raster();
        let n = raster.len();

        let conductance: Vec<[f64; 8]> = (0..n)
            .into_par_iter()
            .map(|cell| {
                let mut row = [0.0f64; 8];
                let from = raster.data[cell];
                for (dir, nb) in graph.neighbors(cell) {
                    row[dir] = transform.conductance(from, raster.data[nb]);
                }
                row
            })
            .collect();

        let row_steps: Vec<[f64; 8]> = (0..raster.height)
            .map(|r| std::array::from_fn(|dir| graph.step_length(r, dir)))
            .collect();

        let model = Self {
            width: raster.width,
            height: raster.height,
            fingerprint: model_fingerprint(graph, transform),
            keyed: transform.key().is_some(),
            conductance,
            row_steps,
        };
        debug!(
            width = model.width,
            height = model.height,
            navigable = graph.navigable_count(),
            edges = model.edge_count(),
            "built transition model"
        );
        model
    }

    /// Build a fresh model, or check and return a previously built one.
    pub fn build_or_reuse(
        graph: &GridGraph<'_>,
        transform: &ConductanceTransform,
        previous: Option<Arc<TransitionModel>>,
    ) -> Result<Arc<TransitionModel>> {
        match previous {
            Some(model) => {
                model.check_compatible(graph, transform)?;
                debug!(fingerprint = model.fingerprint, "reusing transition model");
                Ok(model)
            }
            None => Ok(Arc::new(Self::build(graph, transform))),
        }
    }

    /// Fails with [`Error::ModelMismatch`] unless this model was built from
    /// the same raster, barrier and step metric as `graph` and under the same
    /// `transform`. Models involving a custom transform never match.
    pub fn check_compatible(&self, graph: &GridGraph<'_>, transform: &ConductanceTransform) -> Result<()> {
        let expected = model_fingerprint(graph, transform);
        if !self.keyed || transform.key().is_none() {
            return Err(Error::ModelMismatch { expected, found: self.fingerprint });
        }
        if expected != self.fingerprint
            || self.width != graph.width()
            || self.height != graph.height()
            || self.conductance.len() != self.width * self.height
            || self.row_steps.len() != self.height
        {
            return Err(Error::ModelMismatch { expected, found: self.fingerprint });
        }
        Ok(())
    }

    #[inline]
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.conductance.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.conductance.is_empty()
    }

    #[inline]
    pub fn conductance(&self, cell: CellIndex, dir: usize) -> f64 {
        self.conductance[cell][dir]
    }

    /// Neighbour cell and traversal cost for every existing edge out of `cell`.
    #[inline]
    pub fn edges(&self, cell: CellIndex) -> impl Iterator<Item = (CellIndex, f64)> + '_ {
        let row = cell / self.width;
        let col = cell % self.width;
        let steps = &self.row_steps[row];
        self.conductance[cell]
            .iter()
            .enumerate()
            .filter(|&(_, &g)| g > 0.0)
            .map(move |(dir, &g)| {
                let (dr, dc, _) = NEIGHBORS[dir];
                // g > 0 only for in-bounds neighbours.
                let nr = (row as isize + dr) as usize;
                let nc = (col as isize + dc) as usize;
                (nr * self.width + nc, steps[dir] / g)
            })
    }

    /// Number of directed edges with non-zero conductance.
    pub fn edge_count(&self) -> usize {
        self.conductance.iter().flatten().filter(|&&g| g > 0.0).count()
    }

    /// True when every edge has a reverse edge of equal conductance.
    pub fn is_reciprocal(&self) -> bool {
        (0..self.conductance.len()).all(|cell| {
            let row = cell / self.width;
            let col = cell % self.width;
            (0..8).all(|dir| {
                let g = self.conductance[cell][dir];
                if g == 0.0 {
                    return true;
                }
                let (dr, dc, _) = NEIGHBORS[dir];
                let nb = (row as isize + dr) as usize * self.width + (col as isize + dc) as usize;
                self.conductance[nb][opposite(dir)] == g
            })
        })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

fn graph_fingerprint(graph: &GridGraph<'_>) -> u64 {
    let mut h = Fnv1a::new();
    h.write_u64(graph.raster().fingerprint());
    let barrier = graph.barrier();
    h.write_u64(barrier.min_elevation.to_bits() as u64);
    h.write_u64(barrier.max_elevation.to_bits() as u64);
    h.write_u64(match graph.metric() {
        StepMetric::Cells => 1,
        StepMetric::Geodesic => 2,
    });
    h.finish()
}

fn model_fingerprint(graph: &GridGraph<'_>, transform: &ConductanceTransform) -> u64 {
    let mut h = Fnv1a::new();
    h.write_u64(graph_fingerprint(graph));
    h.write_u64(transform.key().unwrap_or(0));
    h.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::BarrierPredicate;
    use crate::raster::RasterGrid;
    use approx::assert_relative_eq;

    fn shelf(n: usize) -> RasterGrid {
        // Depth increases eastward; the last column is land.
        RasterGrid::from_fn(n, n, 0.0, 1.0, 0.0, 1.0, |_, c| {
            if c == n - 1 { 5.0 } else { -10.0 * (c + 1) as f32 }
        })
    }

    #[test]
    fn no_edge_touches_a_blocked_cell() {
        let g = shelf(6);
        let graph = GridGraph::new(&g, BarrierPredicate::default(), StepMetric::Cells);
        let model = TransitionModel::build(&graph, &ConductanceTransform::Uniform);
        for cell in 0..g.len() {
            for (nb, cost) in model.edges(cell) {
                assert!(graph.is_navigable(cell) && graph.is_navigable(nb));
                assert!(cost > 0.0 && cost.is_finite());
            }
        }
        let land = graph.cell(2, 5);
        assert!((0..8).all(|d| model.conductance(land, d) == 0.0));
    }

    #[test]
    fn uniform_edge_count_on_open_grid() {
        // 4×4 open water: 2·(3·4)·2 orthogonal + 2·(3·3)·2 diagonal = 84 directed edges.
        let g = RasterGrid::new(4, 4, 0.0, 1.0, 0.0, 1.0, -20.0);
        let graph = GridGraph::new(&g, BarrierPredicate::default(), StepMetric::Cells);
        let model = TransitionModel::build(&graph, &ConductanceTransform::Uniform);
        assert_eq!(model.edge_count(), 84);
    }

    #[test]
    fn inverse_difference_is_reciprocal() {
        let g = shelf(6);
        let graph = GridGraph::new(&g, BarrierPredicate::default(), StepMetric::Cells);
        let t = ConductanceTransform::InverseDifference { scale: 10.0 };
        let model = TransitionModel::build(&graph, &t);
        assert!(model.is_reciprocal());
        // Columns 0 and 1 differ by 10 m → conductance 1/2, cost 2 for an east step.
        let cell = graph.cell(2, 0);
        assert_relative_eq!(model.conductance(cell, 4), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn custom_transform_may_be_asymmetric() {
        let g = shelf(6);
        let graph = GridGraph::new(&g, BarrierPredicate::default(), StepMetric::Cells);
        // Going deeper is twice as easy as coming back up.
        let t = ConductanceTransform::custom(|from, to| if to < from { 2.0 } else { 1.0 });
        assert!(!t.is_symmetric());
        let model = TransitionModel::build(&graph, &t);
        assert!(!model.is_reciprocal());
        let cell = graph.cell(1, 1);
        assert_eq!(model.conductance(cell, 4), 2.0, "east = deeper");
        assert_eq!(model.conductance(cell, 3), 1.0, "west = shallower");
    }

    #[test]
    fn custom_non_positive_conductance_drops_edge() {
        let t = ConductanceTransform::custom(|_, _| -1.0);
        assert_eq!(t.conductance(-5.0, -6.0), 0.0);
        let t = ConductanceTransform::custom(|_, _| f64::NAN);
        assert_eq!(t.conductance(-5.0, -6.0), 0.0);
    }

    #[test]
    fn reuse_rejects_model_from_another_grid() {
        let a = shelf(6);
        let mut b = a.clone();
        b.set(0, 0, -99.0);
        let ga = GridGraph::new(&a, BarrierPredicate::default(), StepMetric::Cells);
        let gb = GridGraph::new(&b, BarrierPredicate::default(), StepMetric::Cells);
        let model = Arc::new(TransitionModel::build(&ga, &ConductanceTransform::Uniform));

        assert!(TransitionModel::build_or_reuse(&ga, &ConductanceTransform::Uniform, Some(model.clone())).is_ok());
        let err = TransitionModel::build_or_reuse(&gb, &ConductanceTransform::Uniform, Some(model)).unwrap_err();
        assert!(matches!(err, Error::ModelMismatch { .. }));
    }

    #[test]
    fn reuse_rejects_model_with_other_barrier() {
        let g = shelf(6);
        let shallow = GridGraph::new(&g, BarrierPredicate::default(), StepMetric::Cells);
        let deep = GridGraph::new(&g, BarrierPredicate::new(-40.0, 0.0), StepMetric::Cells);
        let model = TransitionModel::build(&shallow, &ConductanceTransform::Uniform);
        assert!(model.check_compatible(&deep, &ConductanceTransform::Uniform).is_err());
    }

    #[test]
    fn json_persisted_model_stays_compatible() {
        let g = shelf(5);
        let graph = GridGraph::new(&g, BarrierPredicate::default(), StepMetric::Geodesic);
        let model = TransitionModel::build(&graph, &ConductanceTransform::Uniform);
        let restored = TransitionModel::from_json(&model.to_json().unwrap()).unwrap();
        assert!(restored.check_compatible(&graph, &ConductanceTransform::Uniform).is_ok());
        assert_eq!(restored.edge_count(), model.edge_count());
    }

    #[test]
    fn reuse_rejects_model_built_under_another_transform() {
        let g = shelf(6);
        let graph = GridGraph::new(&g, BarrierPredicate::default(), StepMetric::Cells);
        let uniform = Arc::new(TransitionModel::build(&graph, &ConductanceTransform::Uniform));
        let steep = ConductanceTransform::InverseDifference { scale: 10.0 };

        let err = TransitionModel::build_or_reuse(&graph, &steep, Some(uniform.clone())).unwrap_err();
        assert!(matches!(err, Error::ModelMismatch { .. }), "got {err}");

        let scaled = Arc::new(TransitionModel::build(&graph, &steep));
        let other_scale = ConductanceTransform::InverseDifference { scale: 20.0 };
        assert!(scaled.check_compatible(&graph, &other_scale).is_err());
        assert!(scaled.check_compatible(&graph, &steep).is_ok());
        assert_ne!(uniform.fingerprint(), scaled.fingerprint());
    }

    #[test]
    fn custom_transform_models_are_never_reused() {
        let g = shelf(6);
        let graph = GridGraph::new(&g, BarrierPredicate::default(), StepMetric::Cells);
        let halve = ConductanceTransform::custom(|_, _| 0.5);
        let custom = Arc::new(TransitionModel::build(&graph, &halve));

        let err = TransitionModel::build_or_reuse(&graph, &halve, Some(custom.clone())).unwrap_err();
        assert!(matches!(err, Error::ModelMismatch { .. }));
        assert!(custom.check_compatible(&graph, &ConductanceTransform::Uniform).is_err());

        let uniform = TransitionModel::build(&graph, &ConductanceTransform::Uniform);
        assert!(uniform.check_compatible(&graph, &halve).is_err());
        assert!(TransitionModel::build_or_reuse(&graph, &halve, None).is_ok());
    }

    #[test]
    fn transform_keys_distinguish_scales() {
        let a = ConductanceTransform::InverseDifference { scale: 10.0 };
        let b = ConductanceTransform::InverseDifference { scale: 10.5 };
        assert_eq!(ConductanceTransform::Uniform.key(), Some(1));
        assert!(a.key().is_some());
        assert_ne!(a.key(), b.key());
        assert_eq!(ConductanceTransform::custom(|_, _| 1.0).key(), None);
    }

    #[test]
    fn transform_config_parses_from_json() {
        let t: ConductanceTransform =
            serde_json::from_str(r#"{"kind":"inverse_difference","scale":25.0}"#).unwrap();
        assert!(matches!(t, ConductanceTransform::InverseDifference { scale } if scale == 25.0));
        let t: ConductanceTransform = serde_json::from_str(r#"{"kind":"uniform"}"#).unwrap();
        assert!(matches!(t, ConductanceTransform::Uniform));
    }
}
