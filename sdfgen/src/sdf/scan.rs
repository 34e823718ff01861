//! Multi-view surface reconstruction
use super::SurfacePoints;
use crate::{
    Error,
    config::ScanSettings,
    mesh::Mesh,
    render::{CameraPose, DepthImage, NormalImage, RenderGuard, viewpoints},
};
use nalgebra::Vector3;

/// Renders the mesh from every viewpoint and collects its visible surface
///
/// The result is deduplicated, with normals facing the cameras that saw them.
pub fn scan_surface(
    mesh: &Mesh,
    guard: &RenderGuard,
    settings: &ScanSettings,
) -> Result<SurfacePoints, Error> {
    let mut surface = SurfacePoints::new();
    for (i, camera) in viewpoints(settings.viewpoints, settings.camera_distance)
        .iter()
        .enumerate()
    {
        let (normals, depth) = guard.render(mesh, camera, settings.resolution)?;
        back_project(
            &normals,
            &depth,
            camera,
            settings.resolution,
            i as u32,
            &mut surface,
        );
    }
    let raw = surface.len();
    surface.dedup();
    log::debug!(
        "scanned {} surface points ({} duplicates) from {} of {} views",
        surface.len(),
        raw - surface.len(),
        surface.views_seen(),
        settings.viewpoints,
    );
    Ok(surface)
}

/// Converts a depth and normal image into world-space surface points
pub fn back_project(
    normals: &NormalImage,
    depth: &DepthImage,
    camera: &CameraPose,
    resolution: u32,
    viewpoint: u32,
    out: &mut SurfacePoints,
) {
    let width = depth.width();
    for (i, d) in depth.iter().enumerate() {
        if *d <= 0.0 {
            continue;
        }
        let Some(mut n) = Vector3::from(normals[i]).try_normalize(0.0) else {
            continue;
        };
        // The camera sees the outside of the surface
        if n.dot(&camera.forward) > 0.0 {
            n = -n;
        }
        let p = camera.unproject(i / width, i % width, *d, resolution);
        out.push(p, n, viewpoint);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        mesh::primitives,
        render::{Rasterizer, RenderState, Renderer},
    };
    use approx::assert_relative_eq;
    use nalgebra::Point3;
    use std::time::Duration;

    #[test]
    fn back_projected_points_lie_on_surface() {
        let sphere = primitives::icosphere(3);
        let camera =
            CameraPose::looking_at_origin(Point3::new(0.0, 2.0, 0.0), 1.0);
        let mut r = Rasterizer::with_state(RenderState::SURFACE_SAMPLING);
        let frame = r.render(&sphere, &camera, 32).unwrap();

        let mut s = SurfacePoints::new();
        back_project(&frame.image, &frame.depth, &camera, 32, 7, &mut s);
        assert!(!s.is_empty());
        for (p, n) in s.points.iter().zip(&s.normals) {
            assert!((p.coords.norm() - 1.0).abs() < 0.02, "{p}");
            assert!(p.y > -0.01);
            // Normals of a sphere seen from outside point away from it
            assert!(n.dot(&p.coords) > 0.9);
        }
        assert_eq!(s.views_seen(), 1);
    }

    #[test]
    fn inward_faces_are_flipped() {
        // Reverse the winding so every face normal points inward
        let mut cube = primitives::cube(0.5);
        for t in &mut cube.triangles {
            t.swap(1, 2);
        }
        let camera =
            CameraPose::looking_at_origin(Point3::new(0.0, 0.0, 2.0), 1.0);
        let mut r = Rasterizer::with_state(RenderState::SURFACE_SAMPLING);
        let frame = r.render(&cube, &camera, 16).unwrap();
        let mut s = SurfacePoints::new();
        back_project(&frame.image, &frame.depth, &camera, 16, 0, &mut s);
        for (p, n) in s.points.iter().zip(&s.normals) {
            assert_relative_eq!(p.z, 0.5, epsilon = 1e-5);
            assert_relative_eq!(*n, Vector3::z(), epsilon = 1e-6);
        }
    }

    #[test]
    fn scan_covers_every_view() {
        let guard = RenderGuard::new(Rasterizer::new(), Duration::from_secs(5));
        let settings = ScanSettings {
            viewpoints: 12,
            resolution: 24,
            ..ScanSettings::default()
        };
        let s =
            scan_surface(&primitives::cube(0.5), &guard, &settings).unwrap();
        assert_eq!(s.views_seen(), 12);
        assert_eq!(guard.stats().renders, 12);
        assert!(s.points.iter().all(|p| p.coords.amax() < 0.5 + 1e-4));
    }
}
