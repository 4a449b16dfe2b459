//! Diagnostic visualizer: renders the navigable mask of a raster as a PNG,
//! with each site marked green (navigable) or red (blocked).
//! North is up; raster row 0 is the southern edge.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use seaway_cli::io::{read_raster, read_sites};
use seaway_core::{classify_sites, BarrierPredicate, Placement};

const MARKER_RADIUS: i64 = 2;

// ── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "visualize", about = "Render the navigable mask and site placements as a PNG")]
struct Args {
    /// Raster JSON
    #[arg(long)]
    raster: PathBuf,

    /// Sites CSV with header id,lon,lat
    #[arg(long)]
    sites: Option<PathBuf>,

    /// Lowest navigable elevation in metres
    #[arg(long, allow_hyphen_values = true)]
    min_elevation: Option<f32>,

    /// Exclusive upper navigable elevation in metres
    #[arg(long, allow_hyphen_values = true, default_value = "0")]
    max_elevation: f32,

    /// Pixels per raster cell
    #[arg(long, default_value = "1")]
    scale: u32,

    #[arg(short, long, default_value = "navigable.png")]
    output: PathBuf,
}

// ── Colour helpers ────────────────────────────────────────────────────────────

/// Depth below the navigable ceiling → blue ramp: shallow = light, deep = dark.
fn water_color(elevation: f32, ceiling: f32, deepest: f32) -> [u8; 3] {
    let span = (ceiling - deepest).max(1.0);
    let t = ((ceiling - elevation) / span).clamp(0.0, 1.0);
    let r = (170.0 * (1.0 - t)) as u8;
    let g = (210.0 - 120.0 * t) as u8;
    let b = (255.0 - 75.0 * t) as u8;
    [r, g, b]
}

const LAND: [u8; 3] = [210, 180, 140]; // tan
const NAVIGABLE_SITE: [u8; 3] = [30, 200, 60];
const BLOCKED_SITE: [u8; 3] = [220, 30, 30];

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let args = Args::parse();

    let raster = read_raster(&args.raster)?;

    let barrier = BarrierPredicate::new(args.min_elevation.unwrap_or(f32::NEG_INFINITY), args.max_elevation);
    let (w, h) = (raster.width, raster.height);
    let scale = args.scale.max(1);

    let deepest = raster
        .data
        .iter()
        .copied()
        .filter(|&e| barrier.is_navigable(e))
        .fold(f32::INFINITY, f32::min);
    let ceiling = barrier.max_elevation.min(raster.max_elevation());

    let mut img = image::RgbImage::new(w as u32 * scale, h as u32 * scale);
    let mut navigable = 0usize;
    for r in 0..h {
        for c in 0..w {
            let e = raster.get(r, c);
            let px = if barrier.is_navigable(e) {
                navigable += 1;
                water_color(e, ceiling, deepest)
            } else {
                LAND
            };
            let y0 = (h - 1 - r) as u32 * scale;
            let x0 = c as u32 * scale;
            for dy in 0..scale {
                for dx in 0..scale {
                    img.put_pixel(x0 + dx, y0 + dy, image::Rgb(px));
                }
            }
        }
    }

    if let Some(path) = &args.sites {
        let sites = read_sites(path)?;
        let classes = classify_sites(&raster, &barrier, &sites);
        let (iw, ih) = (img.width() as i64, img.height() as i64);
        for class in &classes {
            let (row, col, color) = match class.placement {
                Placement::Navigable { row, col } => (row, col, NAVIGABLE_SITE),
                Placement::Blocked { row, col, .. } => (row, col, BLOCKED_SITE),
                Placement::OutOfBounds => {
                    println!("Site {} lies outside the raster; not drawn", class.id);
                    continue;
                }
            };
            let cx = (col as u32 * scale + scale / 2) as i64;
            let cy = ((h - 1 - row) as u32 * scale + scale / 2) as i64;
            let radius = MARKER_RADIUS * scale as i64;
            for y in (cy - radius)..=(cy + radius) {
                for x in (cx - radius)..=(cx + radius) {
                    if x >= 0 && y >= 0 && x < iw && y < ih {
                        img.put_pixel(x as u32, y as u32, image::Rgb(color));
                    }
                }
            }
        }
        let blocked = classes.iter().filter(|c| !c.is_navigable()).count();
        println!("{} sites, {blocked} not navigable", classes.len());
    }

    img.save(&args.output).with_context(|| format!("failed to save {}", args.output.display()))?;
    println!(
        "Wrote {} ({}×{} cells, {:.1}% navigable)",
        args.output.display(),
        w,
        h,
        100.0 * navigable as f64 / (w * h) as f64
    );
    Ok(())
}
