/// Command-line front end: least-cost distance matrix, nonmetric MDS
/// embedding and fit report for a set of sites on an elevation raster.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use seaway_cli::io;
use seaway_core::{
    classify_sites, run_pipeline, BarrierPredicate, FitSummary, MdsInit, PipelineConfig, Placement, SiteClass,
    StepMetric, TieHandling, TransitionModel, Warning,
};

// ── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "seaway",
    version = env!("CARGO_PKG_VERSION"),
    about = "Least-cost distances through water and their nonmetric MDS embedding"
)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compute distances, embed the sites and write the results
    Run(RunArgs),
    /// Report whether each site lands on navigable water
    Check(CheckArgs),
}

#[derive(Args, Debug)]
struct InputArgs {
    /// Raster JSON (data, width, height, min_lon, max_lon, min_lat, max_lat)
    #[arg(long)]
    raster: PathBuf,

    /// Sites CSV with header id,lon,lat
    #[arg(long)]
    sites: PathBuf,

    /// Pipeline configuration JSON; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Lowest navigable elevation in metres
    #[arg(long, allow_hyphen_values = true)]
    min_elevation: Option<f32>,

    /// Exclusive upper navigable elevation in metres
    #[arg(long, allow_hyphen_values = true)]
    max_elevation: Option<f32>,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    input: InputArgs,

    /// Output directory (created if absent)
    #[arg(short, long, default_value = "out")]
    output: PathBuf,

    /// Embedding dimensionality
    #[arg(short = 'k', long)]
    dimensions: Option<usize>,

    #[arg(long)]
    seed: Option<u64>,

    #[arg(long)]
    max_iterations: Option<u32>,

    /// Wall-clock cap on the embedding loop, milliseconds
    #[arg(long)]
    time_limit_ms: Option<u64>,

    #[arg(long, value_enum)]
    metric: Option<MetricArg>,

    #[arg(long, value_enum)]
    init: Option<InitArg>,

    #[arg(long, value_enum)]
    ties: Option<TiesArg>,

    /// Skip the log-log fit diagnostic
    #[arg(long)]
    no_fit: bool,

    /// Transition model JSON from an earlier run over the same raster
    #[arg(long)]
    reuse_transition: Option<PathBuf>,

    /// Write the transition model JSON here for later reuse
    #[arg(long)]
    save_transition: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct CheckArgs {
    #[command(flatten)]
    input: InputArgs,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum MetricArg {
    Cells,
    Geodesic,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum InitArg {
    Classical,
    Random,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum TiesArg {
    Primary,
    Secondary,
}

// ── Output schema ────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct Summary<'a> {
    sites: usize,
    dimensions: usize,
    stress: f64,
    iterations: u32,
    converged: bool,
    fit: Option<FitSummary>,
    warnings: &'a [Warning],
    transition_fingerprint: String,
    elapsed_ms: u64,
}

// ── Commands ─────────────────────────────────────────────────────────────────

fn load_config(input: &InputArgs) -> Result<PipelineConfig> {
    let mut cfg: PipelineConfig = match &input.config {
        Some(path) => io::read_json(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(v) = input.min_elevation {
        cfg.barrier = BarrierPredicate::new(v, cfg.barrier.max_elevation);
    }
    if let Some(v) = input.max_elevation {
        cfg.barrier = BarrierPredicate::new(cfg.barrier.min_elevation, v);
    }
    Ok(cfg)
}

fn run(args: RunArgs) -> Result<()> {
    let mut cfg = load_config(&args.input)?;
    if let Some(k) = args.dimensions {
        cfg.mds.dimensions = k;
    }
    if let Some(seed) = args.seed {
        cfg.mds.seed = seed;
    }
    if let Some(n) = args.max_iterations {
        cfg.mds.max_iterations = n;
    }
    if args.time_limit_ms.is_some() {
        cfg.mds.time_limit_ms = args.time_limit_ms;
    }
    if let Some(m) = args.metric {
        cfg.step_metric = match m {
            MetricArg::Cells => StepMetric::Cells,
            MetricArg::Geodesic => StepMetric::Geodesic,
        };
    }
    if let Some(i) = args.init {
        cfg.mds.init = match i {
            InitArg::Classical => MdsInit::Classical,
            InitArg::Random => MdsInit::Random,
        };
    }
    if let Some(t) = args.ties {
        cfg.mds.ties = match t {
            TiesArg::Primary => TieHandling::Primary,
            TiesArg::Secondary => TieHandling::Secondary,
        };
    }
    if args.no_fit {
        cfg.fit = false;
    }

    let raster = io::read_raster(&args.input.raster)?;
    let sites = io::read_sites(&args.input.sites)?;
    info!(
        width = raster.width,
        height = raster.height,
        sites = sites.len(),
        "inputs loaded"
    );

    let previous = match &args.reuse_transition {
        Some(path) => {
            let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            let model = TransitionModel::from_json(&text).with_context(|| format!("parsing {}", path.display()))?;
            Some(Arc::new(model))
        }
        None => None,
    };

    let result = run_pipeline(&raster, &sites, &cfg, previous).context("pipeline failed")?;

    fs::create_dir_all(&args.output).with_context(|| format!("creating {}", args.output.display()))?;
    let ids: Vec<&str> = sites.iter().map(|s| s.id.as_str()).collect();
    io::write_embedding(&args.output.join("sites_embedded.csv"), &result.sites)?;
    io::write_distances(&args.output.join("distances.csv"), &ids, &result.distances)?;
    io::write_json(
        &args.output.join("summary.json"),
        &Summary {
            sites: result.sites.len(),
            dimensions: result.embedding.dims(),
            stress: result.stress,
            iterations: result.iterations,
            converged: result.converged,
            fit: result.fit,
            warnings: &result.warnings,
            transition_fingerprint: format!("{:016x}", result.transition.fingerprint()),
            elapsed_ms: result.elapsed_ms,
        },
    )?;

    if let Some(path) = &args.save_transition {
        let json = result.transition.to_json()?;
        fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), "transition model saved");
    }

    if let Some(fit) = &result.fit {
        info!(slope = fit.slope, r_squared = fit.r_squared, n_pairs = fit.n_pairs, "log-log fit");
    }
    eprintln!(
        "stress {:.5} after {} iterations{}; results in {}",
        result.stress,
        result.iterations,
        if result.converged { "" } else { " (not converged)" },
        args.output.display()
    );
    Ok(())
}

fn check(args: CheckArgs) -> Result<()> {
    let cfg = load_config(&args.input)?;
    let raster = io::read_raster(&args.input.raster)?;
    let sites = io::read_sites(&args.input.sites)?;

    let classes = classify_sites(&raster, &cfg.barrier, &sites);
    println!("{}", serde_json::to_string_pretty(&classes)?);

    let bad: Vec<&SiteClass> = classes.iter().filter(|c| !c.is_navigable()).collect();
    for c in &bad {
        match c.placement {
            Placement::Blocked { row, col, elevation } => {
                warn!(site = %c.id, row, col, elevation, "site is on a barrier cell")
            }
            _ => warn!(site = %c.id, lon = c.lon, lat = c.lat, "site is outside the raster"),
        }
    }
    if !bad.is_empty() {
        bail!("{} of {} sites are not on navigable water", bad.len(), classes.len());
    }
    info!(sites = classes.len(), "all sites navigable");
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Command::Run(args) => run(args),
        Command::Check(args) => check(args),
    }
}
