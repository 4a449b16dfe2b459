use serde::{Deserialize, Serialize};

use crate::coords::LatLon;
use crate::error::{Error, Result};

/// A 2D elevation raster in metres, row-major, with geographic bounds.
/// Coordinate math uses f64; elevation values use f32.
///
/// Cell centres are grid-registered: column 0 sits on `min_lon`, column
/// `width − 1` on `max_lon`; row 0 sits on `min_lat` (the southern edge),
/// row `height − 1` on `max_lat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RasterGrid {
    /// Row-major elevation values in metres (negative below sea level).
    pub data: Vec<f32>,
    pub width: usize,
    pub height: usize,
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

/// A named query location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub id: String,
    pub lon: f64,
    pub lat: f64,
}

impl Site {
    pub fn new(id: impl Into<String>, lon: f64, lat: f64) -> Self {
        Self { id: id.into(), lon, lat }
    }
}

impl RasterGrid {
    /// Create a new RasterGrid filled with the given value.
    pub fn new(width: usize, height: usize, min_lon: f64, max_lon: f64, min_lat: f64, max_lat: f64, fill: f32) -> Self {
        Self {
            data: vec![fill; width * height],
            width,
            height,
            min_lon,
            max_lon,
            min_lat,
            max_lat,
        }
    }

    /// Build a raster from a per-cell function `f(row, col)`.
    pub fn from_fn(
        width: usize,
        height: usize,
        min_lon: f64,
        max_lon: f64,
        min_lat: f64,
        max_lat: f64,
        f: impl Fn(usize, usize) -> f32,
    ) -> Self {
        let mut grid = Self::new(width, height, min_lon, max_lon, min_lat, max_lat, 0.0);
        for r in 0..height {
            for c in 0..width {
                grid.set(r, c, f(r, c));
            }
        }
        grid
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.width + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, val: f32) {
        self.data[row * self.width + col] = val;
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Structural checks: non-empty, consistent length, finite values and
    /// well-ordered bounds.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::InvalidGrid(format!(
                "raster has zero extent ({}×{})",
                self.width, self.height
            )));
        }
        if self.data.len() != self.width * self.height {
            return Err(Error::InvalidGrid(format!(
                "data length {} does not match {}×{}",
                self.data.len(),
                self.width,
                self.height
            )));
        }
        if let Some(i) = self.data.iter().position(|v| !v.is_finite()) {
            return Err(Error::InvalidGrid(format!(
                "non-finite elevation at row {}, col {}",
                i / self.width,
                i % self.width
            )));
        }
        let bounds = [self.min_lon, self.max_lon, self.min_lat, self.max_lat];
        if bounds.iter().any(|b| !b.is_finite()) {
            return Err(Error::InvalidGrid("non-finite geographic bounds".into()));
        }
        if (self.width > 1 && self.max_lon <= self.min_lon)
            || (self.height > 1 && self.max_lat <= self.min_lat)
        {
            return Err(Error::InvalidGrid(format!(
                "inverted or empty bounds lon [{}, {}] lat [{}, {}]",
                self.min_lon, self.max_lon, self.min_lat, self.max_lat
            )));
        }
        Ok(())
    }

    /// Longitude/latitude of the centre of cell `(row, col)`.
    pub fn cell_center(&self, row: usize, col: usize) -> LatLon {
        let lon = if self.width > 1 {
            self.min_lon + col as f64 * (self.max_lon - self.min_lon) / (self.width - 1) as f64
        } else {
            self.min_lon
        };
        let lat = if self.height > 1 {
            self.min_lat + row as f64 * (self.max_lat - self.min_lat) / (self.height - 1) as f64
        } else {
            self.min_lat
        };
        LatLon::new(lat, lon)
    }

    /// Nearest cell `(row, col)` to `(lon, lat)`.
    /// Returns None if (lon, lat) is outside the raster bounds.
    pub fn nearest_cell(&self, lon: f64, lat: f64) -> Option<(usize, usize)> {
        if !lon.is_finite() || !lat.is_finite() {
            return None;
        }
        if lon < self.min_lon || lon > self.max_lon || lat < self.min_lat || lat > self.max_lat {
            return None;
        }

        let col = if self.width > 1 {
            let fx = (lon - self.min_lon) / (self.max_lon - self.min_lon) * (self.width - 1) as f64;
            (fx.round() as usize).min(self.width - 1)
        } else {
            0
        };
        let row = if self.height > 1 {
            let fy = (lat - self.min_lat) / (self.max_lat - self.min_lat) * (self.height - 1) as f64;
            (fy.round() as usize).min(self.height - 1)
        } else {
            0
        };
        Some((row, col))
    }

    /// FNV-1a hash over shape, bounds and elevation bits.
    pub(crate) fn fingerprint(&self) -> u64 {
        let mut h = Fnv1a::new();
        h.write_u64(self.width as u64);
        h.write_u64(self.height as u64);
        for b in [self.min_lon, self.max_lon, self.min_lat, self.max_lat] {
            h.write_u64(b.to_bits());
        }
        for v in &self.data {
            h.write_u64(v.to_bits() as u64);
        }
        h.finish()
    }

    pub fn max_elevation(&self) -> f32 {
        self.data.iter().cloned().fold(f32::NEG_INFINITY, f32::max)
    }
}

/// Minimal FNV-1a 64-bit hasher. Output must not depend on the toolchain:
/// fingerprints are persisted alongside transition models.
pub(crate) struct Fnv1a(u64);

impl Fnv1a {
    pub(crate) fn new() -> Self {
        Self(0xcbf2_9ce4_8422_2325)
    }

    pub(crate) fn write_u64(&mut self, v: u64) {
        for byte in v.to_le_bytes() {
            self.0 ^= byte as u64;
            self.0 = self.0.wrapping_mul(0x0000_0100_0000_01b3);
        }
    }

    pub(crate) fn finish(&self) -> u64 {
        self.0
    }
}
