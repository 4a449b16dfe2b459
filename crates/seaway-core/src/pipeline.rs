//! Pipeline orchestrator: least-cost distances, embedding, fit report.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::conductance::{ConductanceTransform, TransitionModel};
use crate::distance::{DistanceMatrix, DistanceMatrixBuilder};
use crate::error::Result;
use crate::fit::{fit_log_log, FitSummary};
use crate::grid::{classify_sites, BarrierPredicate, SiteClass, StepMetric};
use crate::mds::{embed, Embedding, MdsConfig, STRESS_ADVISORY_THRESHOLD};
use crate::raster::{RasterGrid, Site};

// ── Public structs ────────────────────────────────────────────────────────────

/// Everything a run needs besides the raster and the sites.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub barrier: BarrierPredicate,
    pub conductance: ConductanceTransform,
    pub step_metric: StepMetric,
    pub mds: MdsConfig,
    /// Compute the log-log fit diagnostic.
    pub fit: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            barrier: BarrierPredicate::default(),
            conductance: ConductanceTransform::default(),
            step_metric: StepMetric::default(),
            mds: MdsConfig::default(),
            fit: true,
        }
    }
}

impl PipelineConfig {
    pub fn distance_builder(&self) -> DistanceMatrixBuilder {
        DistanceMatrixBuilder::new(self.barrier, self.step_metric, self.conductance.clone())
    }
}

/// Non-fatal findings about a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// Stress above the advisory threshold; the embedding is returned anyway.
    HighStress { stress: f64, threshold: f64 },
}

/// A site with its embedded coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedSite {
    pub id: String,
    pub lon: f64,
    pub lat: f64,
    pub coords: Vec<f64>,
}

/// Full output of one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    /// Input sites in input order, each with its k coordinates.
    pub sites: Vec<EmbeddedSite>,
    pub distances: DistanceMatrix,
    pub embedding: Embedding,
    pub stress: f64,
    pub iterations: u32,
    pub converged: bool,
    /// Transition model used for routing; pass it back to later runs over
    /// the same grid to skip rebuilding it.
    pub transition: Arc<TransitionModel>,
    pub fit: Option<FitSummary>,
    pub warnings: Vec<Warning>,
    pub classification: Vec<SiteClass>,
    pub elapsed_ms: u64,
}

// ── Orchestrator ──────────────────────────────────────────────────────────────

/// Run the full pipeline.
///
/// Stages:
///   1. Site validation and transition model (built, or `previous` reused)
///   2. Pairwise least-cost distances
///   3. Nonmetric MDS embedding
///   4. Stress advisory and optional log-log fit
pub fn run_pipeline(
    raster: &RasterGrid,
    sites: &[Site],
    config: &PipelineConfig,
    previous: Option<Arc<TransitionModel>>,
) -> Result<PipelineResult> {
    let t0 = Instant::now();

    // ── 1–2. Distances ──────────────────────────────────────────────────────
    let out = config.distance_builder().build(raster, sites, previous)?;

    // ── 3. Embedding ────────────────────────────────────────────────────────
    let mds = embed(&out.matrix, &config.mds)?;

    // ── 4. Diagnostics ──────────────────────────────────────────────────────
    let mut warnings = Vec::new();
    if mds.exceeds_advisory_threshold() {
        warn!(
            stress = mds.stress,
            threshold = STRESS_ADVISORY_THRESHOLD,
            "embedding stress above advisory threshold; interpret with caution"
        );
        warnings.push(Warning::HighStress { stress: mds.stress, threshold: STRESS_ADVISORY_THRESHOLD });
    }
    let fit = if config.fit { fit_log_log(&out.matrix, &mds.embedding, mds.stress) } else { None };

    let embedded: Vec<EmbeddedSite> = sites
        .iter()
        .enumerate()
        .map(|(i, s)| EmbeddedSite {
            id: s.id.clone(),
            lon: s.lon,
            lat: s.lat,
            coords: mds.embedding.point(i).to_vec(),
        })
        .collect();

    let elapsed_ms = t0.elapsed().as_millis() as u64;
    info!(
        sites = sites.len(),
        dimensions = mds.embedding.dims(),
        stress = mds.stress,
        iterations = mds.iterations,
        converged = mds.converged,
        elapsed_ms,
        "pipeline complete"
    );

    Ok(PipelineResult {
        sites: embedded,
        distances: out.matrix,
        stress: mds.stress,
        iterations: mds.iterations,
        converged: mds.converged,
        embedding: mds.embedding,
        transition: out.transition,
        fit,
        warnings,
        classification: classify_sites(raster, &config.barrier, sites),
        elapsed_ms,
    })
}
