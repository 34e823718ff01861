//! Dense voxel grids
use super::SdfSampler;
use crate::{Error, config::VoxelSettings};
use nalgebra::Point3;

/// Cubic grid of signed distances over `[-1, 1]³`
///
/// Values are sampled at voxel centers and stored in C order (`[x][y][z]`,
/// with `z` varying fastest).
#[derive(Clone, Debug, PartialEq)]
pub struct VoxelGrid {
    pub resolution: u32,
    pub values: Vec<f32>,
}

impl VoxelGrid {
    /// Distance between neighboring voxel centers
    pub fn spacing(&self) -> f32 {
        2.0 / self.resolution as f32
    }

    /// Returns the value at the given voxel
    pub fn get(&self, x: usize, y: usize, z: usize) -> f32 {
        let r = self.resolution as usize;
        self.values[(x * r + y) * r + z]
    }

    /// Checks that no border voxel is inside the mesh
    ///
    /// A normalized mesh fits in the unit sphere, which never reaches the
    /// grid's corners, so a negative border value means the signs are wrong.
    pub fn check_border(&self) -> Result<(), Error> {
        let r = self.resolution as usize;
        for x in 0..r {
            for y in 0..r {
                for z in 0..r {
                    let border =
                        [x, y, z].iter().any(|i| *i == 0 || *i == r - 1);
                    if border && self.get(x, y, z) < 0.0 {
                        return Err(Error::BadMesh(format!(
                            "border voxel ({x}, {y}, {z}) is inside the mesh"
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Checks that face-neighbors differ by no more than their distance
    ///
    /// The bound is loosened to `spacing·√3·1.1` to tolerate estimation
    /// error.
    pub fn check_lipschitz(&self) -> Result<(), Error> {
        let r = self.resolution as usize;
        let limit = self.spacing() * 3.0f32.sqrt() * 1.1;
        for x in 0..r {
            for y in 0..r {
                for z in 0..r {
                    let v = self.get(x, y, z);
                    let next = [
                        (x + 1 < r).then(|| self.get(x + 1, y, z)),
                        (y + 1 < r).then(|| self.get(x, y + 1, z)),
                        (z + 1 < r).then(|| self.get(x, y, z + 1)),
                    ];
                    if let Some(d) = next
                        .into_iter()
                        .flatten()
                        .map(|n| (n - v).abs())
                        .find(|d| *d > limit)
                    {
                        return Err(Error::BadMesh(format!(
                            "distance jumps by {d} at voxel ({x}, {y}, {z})"
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Returns the voxel centers of an `R³` grid, in storage order
pub fn lattice(resolution: u32) -> Vec<Point3<f32>> {
    let r = resolution as usize;
    let step = 2.0 / resolution as f32;
    let coord = |i: usize| -1.0 + (i as f32 + 0.5) * step;
    let mut out = Vec::with_capacity(r * r * r);
    for x in 0..r {
        for y in 0..r {
            for z in 0..r {
                out.push(Point3::new(coord(x), coord(y), coord(z)));
            }
        }
    }
    out
}

/// Samples a voxel grid and checks it for sign errors
pub fn voxel_grid(
    sampler: &SdfSampler,
    settings: &VoxelSettings,
) -> Result<VoxelGrid, Error> {
    if settings.resolution == 0 {
        return Err(Error::BadResolution(settings.resolution));
    }
    let values = sampler.sample(&lattice(settings.resolution))?;
    let grid = VoxelGrid {
        resolution: settings.resolution,
        values,
    };
    grid.check_border()?;
    if settings.check_lipschitz {
        grid.check_lipschitz()?;
    }
    Ok(grid)
}
