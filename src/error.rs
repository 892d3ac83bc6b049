//! Error taxonomy for priorizar
//!
//! Resolution and derivation problems are handled in place with neutral
//! substitutes (dropped case, empty set, sentinel distance) and never surface
//! here. This enum covers the fatal cases that abort a whole experiment unit.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The external path-mapping table is required but absent.
    #[error("path mapping table not found at {0}")]
    MissingMapping(PathBuf),

    /// LSH banding does not match the signature permutation count.
    #[error("invalid LSH configuration: {bands} bands x {rows} rows != {num_perm} permutations")]
    LshConfig {
        bands: usize,
        rows: usize,
        num_perm: usize,
    },

    /// The line-oriented history log could not be parsed at all.
    #[error("malformed history log {path}: {reason}")]
    HistoryLog { path: PathBuf, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
