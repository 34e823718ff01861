//! Signed distance sampling
//!
//! An [`SdfSampler`] is built once per normalized mesh: it renders depth and
//! normal images from viewpoints around the unit sphere, back-projects them
//! into a cloud of oriented surface points, and indexes that cloud for
//! nearest-neighbor search.  Distances come from the nearest surface point;
//! signs come from a vote among the `k` nearest points, each of which calls
//! the query inside if it lies behind that point's normal.
//!
//! [`voxel_grid`] and [`point_cloud`] turn a sampler into artifacts.
mod cloud;
mod grid;
mod sampler;
mod scan;
mod surface;

pub use cloud::{PointCloud, cloud_seed, point_cloud};
pub use grid::{VoxelGrid, lattice, voxel_grid};
pub use sampler::{Samples, SdfSampler};
pub use scan::{back_project, scan_surface};
pub use surface::{Neighbor, SurfacePoints, SurfaceTree};
