//! Sdfgen turns directories of polygon meshes into signed distance field
//! training data.
//!
//! Meshes are usually not watertight, so the inside of a mesh is not well
//! defined from its triangles alone.  Instead, each mesh is rendered from
//! many viewpoints around it; the visible surface is back-projected into a
//! cloud of oriented points, and signed distances are measured against that
//! cloud.  Interior faces and internal clutter are never seen, so they never
//! affect the result.
//!
//! # Overview
//! - [`mesh`] loads meshes and normalizes them into the unit sphere
//! - [`render`] rasterizes depth and normal images, behind a [`RenderGuard`]
//!   which serializes access to the single render context
//! - [`sdf`] builds the surface point cloud and samples it, either on a dense
//!   grid ([`sdf::voxel_grid`]) or as a point cloud ([`sdf::point_cloud`])
//! - [`pipeline`] runs the whole thing over a directory tree, resumably
//! - [`npy`] reads and writes the NumPy arrays that come out the other end
//!
//! ```
//! use sdfgen::{
//!     config::{ScanSettings, SignSettings},
//!     mesh::{normalize, primitives},
//!     render::{Rasterizer, RenderGuard},
//!     sdf::SdfSampler,
//! };
//! use nalgebra::{Point3, Rotation3};
//! use std::time::Duration;
//!
//! let mut mesh = primitives::icosphere(3);
//! normalize(&mut mesh, &Rotation3::identity())?;
//!
//! let guard = RenderGuard::new(Rasterizer::new(), Duration::from_secs(10));
//! let scan = ScanSettings {
//!     viewpoints: 20,
//!     resolution: 48,
//!     ..Default::default()
//! };
//! let sign = SignSettings::default();
//! let sampler = SdfSampler::new(&mesh, &guard, &scan, &sign)?;
//! let d = sampler.sample(&[Point3::origin(), Point3::new(0.0, 0.0, 2.0)])?;
//! assert!(d[0] < 0.0);
//! assert!(d[1] > 0.0);
//! # Ok::<(), sdfgen::Error>(())
//! ```
//!
//! [`RenderGuard`]: render::RenderGuard
pub mod config;
mod error;
pub mod mesh;
pub mod npy;
pub mod pipeline;
pub mod render;
pub mod sdf;

pub use config::Config;
pub use error::Error;
