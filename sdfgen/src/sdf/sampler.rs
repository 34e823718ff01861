//! Signed distance estimation against a scanned surface
use super::{SurfacePoints, SurfaceTree, scan_surface};
use crate::{
    Error,
    config::{ScanSettings, SignSettings},
    mesh::Mesh,
    render::RenderGuard,
};
use nalgebra::Point3;
use rayon::prelude::*;

/// Result of a batched query, before any consistency check
#[derive(Clone, Debug, Default)]
pub struct Samples {
    /// Signed distance per query point
    pub values: Vec<f32>,
    /// Number of queries whose sign vote was a near-tie
    pub ambiguous: usize,
}

impl Samples {
    /// Share of queries with an ambiguous sign
    pub fn ambiguous_fraction(&self) -> f32 {
        if self.values.is_empty() {
            0.0
        } else {
            self.ambiguous as f32 / self.values.len() as f32
        }
    }
}

/// Signed distance estimator for one normalized mesh
///
/// Construction renders the mesh from every viewpoint (through the shared
/// [`RenderGuard`]) and indexes the reconstructed surface; afterwards queries
/// never touch the renderer.
pub struct SdfSampler {
    surface: SurfacePoints,
    tree: SurfaceTree,
    sign: SignSettings,
}

impl SdfSampler {
    /// Scans the mesh and builds the nearest-surface index
    ///
    /// Fails with [`Error::BadMesh`] if too few viewpoints see the mesh.
    pub fn new(
        mesh: &Mesh,
        guard: &RenderGuard,
        scan: &ScanSettings,
        sign: &SignSettings,
    ) -> Result<Self, Error> {
        let surface = scan_surface(mesh, guard, scan)?;
        if surface.is_empty() {
            return Err(Error::BadMesh(
                "no surface points were seen".to_owned(),
            ));
        }
        let coverage = surface.views_seen() as f32 / scan.viewpoints as f32;
        if coverage < scan.min_coverage {
            return Err(Error::BadMesh(format!(
                "only {:.0}% of viewpoints see the mesh",
                coverage * 100.0
            )));
        }
        Ok(Self::from_surface(surface, sign))
    }

    /// Builds a sampler over an existing set of surface points
    pub fn from_surface(surface: SurfacePoints, sign: &SignSettings) -> Self {
        let tree = SurfaceTree::new(&surface);
        Self {
            surface,
            tree,
            sign: *sign,
        }
    }

    /// Returns the reconstructed surface
    pub fn surface(&self) -> &SurfacePoints {
        &self.surface
    }

    /// Estimates signed distances, failing if signs are inconsistent
    ///
    /// Returns [`Error::BadMesh`] when the share of ambiguous sign votes
    /// exceeds the configured tolerance.
    pub fn sample(&self, queries: &[Point3<f32>]) -> Result<Vec<f32>, Error> {
        let samples = self.query(queries)?;
        let f = samples.ambiguous_fraction();
        if f > self.sign.max_ambiguous_fraction {
            return Err(Error::BadMesh(format!(
                "{:.1}% of sign votes are ambiguous",
                f * 100.0
            )));
        }
        Ok(samples.values)
    }

    /// Estimates signed distances without checking sign consistency
    pub fn query(&self, queries: &[Point3<f32>]) -> Result<Samples, Error> {
        if queries.is_empty() {
            return Err(Error::EmptyQuery);
        }
        let results: Vec<(f32, bool)> =
            queries.par_iter().map(|q| self.evaluate(q)).collect();
        let ambiguous = results.iter().filter(|(_, a)| *a).count();
        Ok(Samples {
            values: results.into_iter().map(|(v, _)| v).collect(),
            ambiguous,
        })
    }

    /// Returns the signed distance at `q`, and whether its vote was a tie
    fn evaluate(&self, q: &Point3<f32>) -> (f32, bool) {
        let neighbors = self.tree.nearest(q, self.sign.neighbors);
        let Some(closest) = neighbors.first() else {
            return (f32::INFINITY, true);
        };
        let distance = closest.distance_squared.sqrt();
        let inside = neighbors
            .iter()
            .filter(|n| {
                let p = self.surface.points[n.index];
                (q - p).dot(&self.surface.normals[n.index]) < 0.0
            })
            .count();
        let total = neighbors.len();
        let agreement = inside.max(total - inside) as f32 / total as f32;
        let ambiguous = agreement < self.sign.min_agreement;
        if inside * 2 > total {
            (-distance, ambiguous)
        } else {
            (distance, ambiguous)
        }
    }
}
