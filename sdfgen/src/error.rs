//! Module containing the universal error type
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Universal error type for `sdfgen`
#[derive(Error, Debug)]
pub enum Error {
    /// The mesh file could not be parsed into a polygon mesh
    #[error("could not load mesh from {path:?}: {reason}")]
    MeshLoad {
        /// Source file
        path: PathBuf,
        /// Human-readable cause
        reason: String,
    },

    /// Geometry failed a coverage or sign-consistency check
    #[error("bad mesh: {0}")]
    BadMesh(String),

    /// The rendering context could not be acquired in time
    #[error("rendering context was not released within {0:?}")]
    ResourceContention(Duration),

    /// Invalid configuration value
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Configuration file could not be parsed
    #[error("could not parse configuration: {0}")]
    Toml(#[from] toml::de::Error),

    /// A numeric array file is malformed or has an unexpected shape
    #[error("bad array file: {0}")]
    BadArray(String),

    /// Sampling was requested with no query points
    #[error("query point set is empty")]
    EmptyQuery,

    /// Render or voxel resolution must be non-zero
    #[error("resolution must be non-zero (got {0})")]
    BadResolution(u32),

    /// IO error; see inner code for details
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
}

impl Error {
    /// Checks whether this error is confined to a single pipeline item
    ///
    /// Item errors are reduced to a terminal item state at the worker
    /// boundary; everything else aborts the run.
    pub fn is_item_error(&self) -> bool {
        matches!(self, Error::MeshLoad { .. } | Error::BadMesh(..))
    }

    pub(crate) fn mesh_load<S: Into<String>>(
        path: &std::path::Path,
        reason: S,
    ) -> Self {
        Error::MeshLoad {
            path: path.to_owned(),
            reason: reason.into(),
        }
    }
}
