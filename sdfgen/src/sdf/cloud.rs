//! Random point clouds, weighted toward the surface
use super::SdfSampler;
use crate::{Error, config::CloudSettings};
use nalgebra::{Point3, Vector3};
use rand::Rng;

/// Sampled points with their signed distances
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PointCloud {
    pub points: Vec<Point3<f32>>,
    pub values: Vec<f32>,
}

impl PointCloud {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Flattens the cloud into `N` rows of `(x, y, z, sdf)`
    pub fn to_rows(&self) -> Vec<f32> {
        self.points
            .iter()
            .zip(&self.values)
            .flat_map(|(p, v)| [p.x, p.y, p.z, *v])
            .collect()
    }

    /// Rebuilds a cloud from rows of `(x, y, z, sdf)`
    pub fn from_rows(rows: &[f32]) -> Result<Self, Error> {
        if rows.len() % 4 != 0 {
            return Err(Error::BadArray(format!(
                "{} values do not form rows of 4",
                rows.len()
            )));
        }
        let (points, values) = rows
            .chunks_exact(4)
            .map(|r| (Point3::new(r[0], r[1], r[2]), r[3]))
            .unzip();
        Ok(Self { points, values })
    }
}

/// Mixes a base seed with a mesh identity
///
/// The hash (64-bit FNV-1a) is fixed, so seeds are stable across runs,
/// platforms, and toolchain versions.
pub fn cloud_seed(seed: u64, identity: &str) -> u64 {
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    for b in identity.bytes() {
        h ^= u64::from(b);
        h = h.wrapping_mul(0x0000_0100_0000_01b3);
    }
    seed ^ h
}

/// Standard normal variate, by the Box-Muller transform
fn gaussian<R: Rng>(rng: &mut R) -> f32 {
    let u1: f32 = 1.0 - rng.r#gen::<f32>(); // (0, 1], so ln is finite
    let u2: f32 = rng.r#gen();
    (-2.0 * u1.ln()).sqrt() * (std::f32::consts::TAU * u2).cos()
}

/// Uniform point in the unit ball, by rejection
fn uniform_in_sphere<R: Rng>(rng: &mut R) -> Point3<f32> {
    loop {
        let p = Point3::new(
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
        );
        if p.coords.norm_squared() <= 1.0 {
            return p;
        }
    }
}

/// Draws a point cloud and samples its signed distances
///
/// The first `near_surface_fraction·N` points are surface points displaced by
/// Gaussian noise (half with each of the two sigmas); the rest are uniform in
/// the unit sphere.  Every coordinate is clamped to `[-1, 1]`.
pub fn point_cloud<R: Rng>(
    sampler: &SdfSampler,
    settings: &CloudSettings,
    rng: &mut R,
) -> Result<PointCloud, Error> {
    let n = settings.sample_count;
    if n == 0 {
        return Err(Error::EmptyQuery);
    }
    let surface = sampler.surface();
    if surface.is_empty() {
        return Err(Error::BadMesh("no surface points to sample".to_owned()));
    }
    let near = ((n as f32 * settings.near_surface_fraction).round() as usize)
        .min(n);
    let wide = near / 2;

    let mut points = Vec::with_capacity(n);
    for i in 0..near {
        let sigma = settings.near_surface_sigma[usize::from(i >= wide)];
        let p = surface.points[rng.gen_range(0..surface.len())];
        let noise =
            Vector3::new(gaussian(rng), gaussian(rng), gaussian(rng)) * sigma;
        points.push(p + noise);
    }
    for _ in near..n {
        points.push(uniform_in_sphere(rng));
    }
    for p in &mut points {
        p.apply(|c| *c = c.clamp(-1.0, 1.0));
    }

    let values = sampler.sample(&points)?;

    let uniform = &values[near..];
    if settings.min_inside_fraction > 0.0 && !uniform.is_empty() {
        let inside = uniform.iter().filter(|v| **v < 0.0).count();
        let f = inside as f32 / uniform.len() as f32;
        if f < settings.min_inside_fraction {
            return Err(Error::BadMesh(format!(
                "mesh fills only {:.2}% of the unit sphere",
                f * 100.0
            )));
        }
    }
    Ok(PointCloud { points, values })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        config::{ScanSettings, SignSettings},
        mesh::primitives,
        render::{Rasterizer, RenderGuard},
    };
    use rand::{SeedableRng, rngs::StdRng};
    use std::time::Duration;

    fn sampler(half: f32) -> SdfSampler {
        let guard = RenderGuard::new(Rasterizer::new(), Duration::from_secs(5));
        let scan = ScanSettings {
            viewpoints: 20,
            resolution: 48,
            ..ScanSettings::default()
        };
        SdfSampler::new(
            &primitives::cube(half),
            &guard,
            &scan,
            &SignSettings::default(),
        )
        .unwrap()
    }

    #[test]
    fn cloud_shape() {
        let s = sampler(0.5);
        let settings = CloudSettings {
            sample_count: 1000,
            ..CloudSettings::default()
        };
        let mut rng = StdRng::seed_from_u64(cloud_seed(1, "cube"));
        let cloud = point_cloud(&s, &settings, &mut rng).unwrap();
        assert_eq!(cloud.len(), 1000);
        assert_eq!(cloud.values.len(), 1000);
        assert!(cloud.points.iter().all(|p| p.coords.amax() <= 1.0));
        assert!(cloud.values.iter().all(|v| v.is_finite()));

        let rows = cloud.to_rows();
        assert_eq!(rows.len(), 4000);
        assert_eq!(PointCloud::from_rows(&rows).unwrap(), cloud);
    }

    #[test]
    fn deterministic_for_a_seed() {
        let s = sampler(0.5);
        let settings = CloudSettings {
            sample_count: 200,
            ..CloudSettings::default()
        };
        let draw = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            point_cloud(&s, &settings, &mut rng).unwrap()
        };
        assert_eq!(draw(5), draw(5));
        assert_ne!(draw(5).points, draw(6).points);
    }

    #[test]
    fn small_meshes_fail_min_size() {
        let s = sampler(0.1);
        let settings = CloudSettings {
            sample_count: 500,
            near_surface_fraction: 0.0,
            min_inside_fraction: 0.05,
            ..CloudSettings::default()
        };
        let mut rng = StdRng::seed_from_u64(0);
        match point_cloud(&s, &settings, &mut rng) {
            Err(Error::BadMesh(msg)) => assert!(msg.contains("fills"), "{msg}"),
            r => panic!("expected a bad mesh, got {r:?}"),
        }
    }

    #[test]
    fn seeds_depend_on_identity() {
        assert_eq!(cloud_seed(0, "a/b"), cloud_seed(0, "a/b"));
        assert_ne!(cloud_seed(0, "a/b"), cloud_seed(0, "a/c"));
        assert_ne!(cloud_seed(0, "a/b"), cloud_seed(1, "a/b"));
    }

    #[test]
    fn gaussian_moments() {
        let mut rng = StdRng::seed_from_u64(42);
        let xs: Vec<f32> = (0..20_000).map(|_| gaussian(&mut rng)).collect();
        let mean = xs.iter().sum::<f32>() / xs.len() as f32;
        let var = xs.iter().map(|x| (x - mean).powi(2)).sum::<f32>()
            / xs.len() as f32;
        assert!(mean.abs() < 0.05, "mean {mean}");
        assert!((var - 1.0).abs() < 0.05, "variance {var}");
    }
}
