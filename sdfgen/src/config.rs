//! Run configuration, loaded from TOML
//!
//! Every section has defaults, so an empty file is a valid configuration:
//!
//! ```toml
//! workers = 4
//!
//! [paths]
//! input = "meshes"
//! output = "sdf"
//! extension = "ply"
//!
//! [voxels]
//! resolution = 32
//!
//! [cloud]
//! sample_count = 100000
//! ```
use crate::{Error, mesh::RotationTable};
use serde::{Deserialize, Serialize};
use std::{path::Path, path::PathBuf, time::Duration};

/// Root configuration for a pipeline run
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub paths: PathSettings,
    pub voxels: VoxelSettings,
    pub cloud: CloudSettings,
    pub scan: ScanSettings,
    pub sign: SignSettings,
    pub render: RenderSettings,

    /// Number of worker threads; 0 uses all available cores
    pub workers: usize,

    /// Canonical-frame rotation for each source category
    pub rotation: RotationTable,
}

/// Input and output locations
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathSettings {
    /// Root directory searched (recursively) for meshes
    pub input: PathBuf,
    /// Root directory for artifacts, mirroring the input tree
    pub output: PathBuf,
    /// Mesh file extension, matched case-insensitively
    pub extension: String,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            input: PathBuf::from("meshes"),
            output: PathBuf::from("sdf"),
            extension: "ply".to_owned(),
        }
    }
}

/// Dense voxel grid output
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VoxelSettings {
    pub enabled: bool,
    /// Voxels per side
    pub resolution: u32,
    /// Reject grids whose neighboring values differ by more than distance
    pub check_lipschitz: bool,
}

impl Default for VoxelSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            resolution: 32,
            check_lipschitz: true,
        }
    }
}

/// Point cloud output
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CloudSettings {
    pub enabled: bool,
    /// Rows per cloud
    pub sample_count: usize,
    /// Share of samples drawn near the surface (the rest are uniform)
    pub near_surface_fraction: f32,
    /// Standard deviations of the two near-surface noise bands
    pub near_surface_sigma: [f32; 2],
    /// Base seed, mixed with a hash of each mesh's identity
    pub seed: u64,
    /// Smallest allowed share of uniform samples inside the mesh
    pub min_inside_fraction: f32,
}

impl Default for CloudSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            sample_count: 100_000,
            near_surface_fraction: 0.94,
            near_surface_sigma: [0.05, 0.005],
            seed: 0,
            min_inside_fraction: 0.0,
        }
    }
}

/// Viewpoints used to reconstruct the surface
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScanSettings {
    /// Number of cameras around the mesh
    pub viewpoints: usize,
    /// Pixels per side of each render
    pub resolution: u32,
    /// Camera distance from the origin
    pub camera_distance: f32,
    /// Share of viewpoints that must see the mesh
    pub min_coverage: f32,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            viewpoints: 100,
            resolution: 400,
            camera_distance: 2.0,
            min_coverage: 0.5,
        }
    }
}

/// Inside/outside voting
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SignSettings {
    /// Surface points consulted per query
    pub neighbors: usize,
    /// Votes below this agreement count as ambiguous
    pub min_agreement: f32,
    /// Largest tolerated share of ambiguous queries
    pub max_ambiguous_fraction: f32,
}

impl Default for SignSettings {
    fn default() -> Self {
        Self {
            neighbors: 11,
            min_agreement: 0.6,
            max_ambiguous_fraction: 0.1,
        }
    }
}

/// Shared render context
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderSettings {
    /// Seconds to wait for the context before giving up
    pub lock_timeout: f64,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            lock_timeout: 300.0,
        }
    }
}

impl RenderSettings {
    /// Returns the lock timeout as a [`Duration`]
    ///
    /// Fails if the value is not positive or does not fit in a `Duration`.
    pub fn lock_timeout(&self) -> Result<Duration, Error> {
        match Duration::try_from_secs_f64(self.lock_timeout) {
            Ok(d) if !d.is_zero() => Ok(d),
            _ => Err(Error::Config(
                "render.lock_timeout must be a positive number of seconds"
                    .to_owned(),
            )),
        }
    }
}

impl Config {
    /// Reads and validates a TOML file
    pub fn load(path: &Path) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&text)?;
        log::debug!("loaded config from {}", path.display());
        Ok(config)
    }

    /// Parses and validates TOML text
    pub fn from_toml(text: &str) -> Result<Self, Error> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every setting is in range
    pub fn validate(&self) -> Result<(), Error> {
        fn check(ok: bool, msg: &str) -> Result<(), Error> {
            if ok {
                Ok(())
            } else {
                Err(Error::Config(msg.to_owned()))
            }
        }
        let unit = |f: f32| (0.0..=1.0).contains(&f);

        check(
            self.voxels.enabled || self.cloud.enabled,
            "at least one of voxels or cloud must be enabled",
        )?;
        check(!self.paths.extension.is_empty(), "extension must be set")?;
        check(self.voxels.resolution > 0, "voxels.resolution must be > 0")?;
        check(self.cloud.sample_count > 0, "cloud.sample_count must be > 0")?;
        check(
            unit(self.cloud.near_surface_fraction),
            "cloud.near_surface_fraction must be in [0, 1]",
        )?;
        check(
            self.cloud.near_surface_sigma.iter().all(|s| *s > 0.0),
            "cloud.near_surface_sigma must be positive",
        )?;
        check(
            unit(self.cloud.min_inside_fraction),
            "cloud.min_inside_fraction must be in [0, 1]",
        )?;
        check(self.scan.viewpoints > 0, "scan.viewpoints must be > 0")?;
        check(self.scan.resolution > 0, "scan.resolution must be > 0")?;
        check(
            self.scan.camera_distance > 1.0,
            "scan.camera_distance must be outside the unit sphere",
        )?;
        check(
            unit(self.scan.min_coverage),
            "scan.min_coverage must be in [0, 1]",
        )?;
        check(self.sign.neighbors > 0, "sign.neighbors must be > 0")?;
        check(
            (0.5..=1.0).contains(&self.sign.min_agreement),
            "sign.min_agreement must be in [0.5, 1]",
        )?;
        check(
            unit(self.sign.max_ambiguous_fraction),
            "sign.max_ambiguous_fraction must be in [0, 1]",
        )?;
        self.render.lock_timeout()?;
        Ok(())
    }
}
