//! Error types for the distance and embedding pipeline.

use thiserror::Error;

/// Fatal outcomes of a seaway computation.
///
/// Structural problems (bad raster, sites on land, disconnected water bodies,
/// degenerate matrices) are reported before any expensive work where possible.
/// Poor embedding quality is never an error; see [`crate::pipeline::Warning`].
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid grid: {0}")]
    InvalidGrid(String),

    #[error("sites on a barrier cell: {}", .sites.join(", "))]
    SiteOnBarrier { sites: Vec<String> },

    #[error("unreachable site pairs: {}", format_pairs(.pairs))]
    UnreachablePair { pairs: Vec<(String, String)> },

    #[error("degenerate embedding: {0}")]
    DegenerateEmbedding(String),

    #[error("transition model does not match this grid and conductance transform (expected fingerprint {expected:016x}, got {found:016x})")]
    ModelMismatch { expected: u64, found: u64 },

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

fn format_pairs(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(a, b)| format!("{a}–{b}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result alias used throughout `seaway-core`.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn site_on_barrier_lists_every_identifier() {
        let e = Error::SiteOnBarrier { sites: vec!["A".into(), "C".into()] };
        assert_eq!(e.to_string(), "sites on a barrier cell: A, C");
    }

    #[test]
    fn unreachable_pair_lists_pairs() {
        let e = Error::UnreachablePair {
            pairs: vec![("A".into(), "B".into()), ("A".into(), "C".into())],
        };
        let msg = e.to_string();
        assert!(msg.contains("A–B") && msg.contains("A–C"), "got {msg}");
    }
}
