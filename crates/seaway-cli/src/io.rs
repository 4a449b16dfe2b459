//! File formats used by the `seaway` binary.
//!
//! Raster:      JSON `RasterGrid` (`data`, `width`, `height`, bounds).
//! Sites:       CSV with header `id,lon,lat`.
//! Embedding:   CSV `id,lon,lat,x1..xk`.
//! Distances:   CSV with a leading `id` column and one column per site.
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use seaway_core::{DistanceMatrix, EmbeddedSite, RasterGrid, Site};

pub fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    fs::write(path, text).with_context(|| format!("writing {}", path.display()))
}

pub fn read_raster(path: &Path) -> Result<RasterGrid> {
    let raster: RasterGrid = read_json(path)?;
    raster.validate().with_context(|| format!("validating raster {}", path.display()))?;
    Ok(raster)
}

pub fn read_sites(path: &Path) -> Result<Vec<Site>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let mut sites = Vec::new();
    for (line, rec) in rdr.deserialize::<Site>().enumerate() {
        // Header is line 1.
        let site = rec.with_context(|| format!("{}: bad site record on line {}", path.display(), line + 2))?;
        sites.push(site);
    }
    Ok(sites)
}

pub fn write_embedding(path: &Path, sites: &[EmbeddedSite]) -> Result<()> {
    let k = sites.first().map_or(0, |s| s.coords.len());
    let mut w = csv::Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;

    let mut header = vec!["id".to_string(), "lon".to_string(), "lat".to_string()];
    header.extend((1..=k).map(|d| format!("x{d}")));
    w.write_record(&header)?;

    for s in sites {
        let mut rec = vec![s.id.clone(), s.lon.to_string(), s.lat.to_string()];
        rec.extend(s.coords.iter().map(f64::to_string));
        w.write_record(&rec)?;
    }
    w.flush()?;
    Ok(())
}

pub fn write_distances(path: &Path, ids: &[&str], matrix: &DistanceMatrix) -> Result<()> {
    let mut w = csv::Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;
    w.write_record(std::iter::once("id").chain(ids.iter().copied()))?;
    for (i, id) in ids.iter().enumerate() {
        let mut rec = vec![id.to_string()];
        rec.extend(matrix.row(i).iter().map(f64::to_string));
        w.write_record(&rec)?;
    }
    w.flush()?;
    Ok(())
}
