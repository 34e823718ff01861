//! End-to-end sampling of normalized primitives
use approx::assert_relative_eq;
use nalgebra::{Point3, Rotation3};
use sdfgen::{
    config::{ScanSettings, SignSettings, VoxelSettings},
    mesh::{normalize, primitives},
    render::{Rasterizer, RenderGuard, fibonacci_sphere},
    sdf::{SdfSampler, voxel_grid},
};
use std::time::Duration;

fn scan() -> ScanSettings {
    ScanSettings {
        viewpoints: 30,
        resolution: 64,
        ..ScanSettings::default()
    }
}

fn guard() -> RenderGuard {
    RenderGuard::new(Rasterizer::new(), Duration::from_secs(10))
}

#[test]
fn cube_voxel_grid() {
    let mut mesh = primitives::cube(3.0);
    for v in &mut mesh.vertices {
        v.x += 10.0;
    }
    let n = normalize(&mut mesh, &Rotation3::identity()).unwrap();
    assert_relative_eq!(n.center, Point3::new(10.0, 0.0, 0.0));

    let guard = guard();
    let sampler =
        SdfSampler::new(&mesh, &guard, &scan(), &SignSettings::default())
            .unwrap();
    let grid = voxel_grid(
        &sampler,
        &VoxelSettings {
            resolution: 8,
            ..VoxelSettings::default()
        },
    )
    .unwrap();
    assert_eq!(grid.values.len(), 512);

    // The normalized cube has half-side 1/√3, so exactly the central 4³
    // voxels (centers at ±0.125 and ±0.375) are inside it
    let inner = |i: usize| (2..6).contains(&i);
    for x in 0..8 {
        for y in 0..8 {
            for z in 0..8 {
                let v = grid.get(x, y, z);
                if inner(x) && inner(y) && inner(z) {
                    assert!(v < 0.0, "voxel ({x}, {y}, {z}) = {v}");
                } else {
                    assert!(v > 0.0, "voxel ({x}, {y}, {z}) = {v}");
                }
            }
        }
    }

    // Center voxels are 0.125 from each of three faces at 0.577
    let h = 1.0 / 3.0f32.sqrt();
    assert_relative_eq!(grid.get(3, 3, 3), -(h - 0.125), epsilon = 0.04);
    assert!(guard.stats().max_overlap <= 1);
    assert_eq!(guard.stats().renders, 30);
}

#[test]
fn sphere_distances() {
    let mut mesh = primitives::icosphere(3);
    normalize(&mut mesh, &Rotation3::identity()).unwrap();
    let guard = guard();
    let sampler =
        SdfSampler::new(&mesh, &guard, &scan(), &SignSettings::default())
            .unwrap();

    let v = sampler
        .sample(&[
            Point3::origin(),
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(0.0, -2.0, 0.0),
        ])
        .unwrap();
    assert_relative_eq!(v[0], -1.0, epsilon = 0.05);
    assert_relative_eq!(v[1], 1.0, epsilon = 0.05);
    assert_relative_eq!(v[2], 1.0, epsilon = 0.05);

    let dirs = fibonacci_sphere(50, 1.0);
    for r in [0.3, 0.6, 1.2, 1.5] {
        let queries: Vec<Point3<f32>> =
            dirs.iter().map(|d| Point3::from(d.coords * r)).collect();
        let values = sampler.sample(&queries).unwrap();
        for (q, v) in queries.iter().zip(&values) {
            assert_relative_eq!(*v, r - 1.0, epsilon = 0.05);
            assert_eq!(*v < 0.0, r < 1.0, "wrong sign at {q:?}");
        }
    }
}

#[test]
fn rotated_category() {
    // A long box along X, turned so that it lies along Z
    let mut mesh = primitives::cube(1.0);
    for v in &mut mesh.vertices {
        v.x *= 4.0;
    }
    let rotation = Rotation3::from_axis_angle(
        &nalgebra::Vector3::y_axis(),
        -std::f32::consts::FRAC_PI_2,
    );
    normalize(&mut mesh, &rotation).unwrap();
    let (lo, hi) = mesh.bounding_box().unwrap();
    assert!(hi.z - lo.z > 1.5);
    assert!(hi.x - lo.x < 0.6);

    let guard = guard();
    let sampler =
        SdfSampler::new(&mesh, &guard, &scan(), &SignSettings::default())
            .unwrap();
    let v = sampler
        .sample(&[Point3::new(0.0, 0.0, 0.8), Point3::new(0.8, 0.0, 0.0)])
        .unwrap();
    assert!(v[0] < 0.0);
    assert!(v[1] > 0.0);
}
