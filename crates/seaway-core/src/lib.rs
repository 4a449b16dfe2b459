//! Least-cost distances through a navigable medium and their nonmetric
//! embedding.
//!
//! A [`RasterGrid`] of elevations is turned into an 8-connected graph of
//! navigable cells. Pairwise least-cost distances between sites are computed
//! over that graph and embedded into k dimensions by Kruskal nonmetric MDS,
//! with a stress value and an optional log-log fit as quality diagnostics.
//!
//! ```no_run
//! use seaway_core::{run_pipeline, PipelineConfig, RasterGrid, Site};
//!
//! let raster = RasterGrid::new(64, 32, -10.0, 10.0, 40.0, 50.0, -100.0);
//! let sites = vec![
//!     Site::new("a", -8.0, 41.0),
//!     Site::new("b", 6.0, 44.0),
//!     Site::new("c", 0.0, 49.0),
//! ];
//! let result = run_pipeline(&raster, &sites, &PipelineConfig::default(), None)?;
//! println!("stress = {:.4}", result.stress);
//! # Ok::<(), seaway_core::Error>(())
//! ```

pub mod conductance;
pub mod coords;
pub mod distance;
pub mod error;
pub mod fit;
pub mod grid;
pub mod mds;
pub mod parallel;
pub mod pipeline;
pub mod raster;
pub mod router;

pub use conductance::{ConductanceTransform, TransitionModel};
pub use distance::{DistanceMatrix, DistanceMatrixBuilder, DistanceOutput};
pub use error::{Error, Result};
pub use fit::{fit_log_log, FitSummary};
pub use grid::{classify_sites, BarrierPredicate, GridGraph, Placement, SiteClass, StepMetric};
pub use mds::{embed, Embedding, MdsConfig, MdsInit, MdsResult, TieHandling, STRESS_ADVISORY_THRESHOLD};
pub use pipeline::{run_pipeline, EmbeddedSite, PipelineConfig, PipelineResult, Warning};
pub use raster::{RasterGrid, Site};
pub use router::LeastCostRouter;
