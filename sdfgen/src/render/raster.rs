//! Software triangle rasterizer
use super::{
    CameraPose, DepthImage, Frame, NormalImage, OutputMode, RenderState,
    Renderer,
};
use crate::{Error, mesh::Mesh};
use nalgebra::Vector3;

/// Sample positions within a pixel, in pixel units
const CENTER: [(f32, f32); 1] = [(0.5, 0.5)];
const SUBSAMPLES: [(f32, f32); 4] =
    [(0.25, 0.25), (0.75, 0.25), (0.25, 0.75), (0.75, 0.75)];

/// CPU rasterizer with a z-buffer
///
/// Triangles are drawn two-sided with flat face normals.  In multisample mode
/// each pixel resolves four samples, and samples that miss the mesh count as
/// hits on the far plane; this blurs silhouettes the way a GPU resolve does.
#[derive(Clone, Debug, Default)]
pub struct Rasterizer {
    state: RenderState,
}

impl Rasterizer {
    /// Builds a rasterizer with default (display) settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a rasterizer with the given settings
    pub fn with_state(state: RenderState) -> Self {
        Self { state }
    }
}

/// Twice the signed area of the triangle `a, b, p` in screen space
#[inline]
fn edge(a: &Vector3<f32>, b: &Vector3<f32>, px: f32, py: f32) -> f32 {
    (b.x - a.x) * (py - a.y) - (b.y - a.y) * (px - a.x)
}

impl Renderer for Rasterizer {
    fn state(&self) -> RenderState {
        self.state
    }

    fn set_state(&mut self, state: RenderState) {
        self.state = state;
    }

    fn render(
        &mut self,
        mesh: &Mesh,
        camera: &CameraPose,
        resolution: u32,
    ) -> Result<Frame, Error> {
        if resolution == 0 {
            return Err(Error::BadResolution(resolution));
        }
        let offsets: &[(f32, f32)] = if self.state.multisample {
            &SUBSAMPLES
        } else {
            &CENTER
        };
        let res = resolution as usize;
        let k = offsets.len();
        let mut depth = vec![f32::INFINITY; res * res * k];
        let mut normal = vec![Vector3::zeros(); res * res * k];

        let screen: Vec<Vector3<f32>> = mesh
            .vertices
            .iter()
            .map(|v| camera.to_screen(v, resolution))
            .collect();

        for (i, tri) in mesh.triangles.iter().enumerate() {
            let Some(n) = mesh.face_normal(i).try_normalize(0.0) else {
                continue;
            };
            let [a, b, c] = tri.map(|j| screen[j]);
            let area = edge(&a, &b, c.x, c.y);
            if area == 0.0 || !area.is_finite() {
                continue; // edge-on
            }

            // Float-to-int casts saturate, so off-screen bounds clamp to 0
            let x0 = a.x.min(b.x).min(c.x).floor() as usize;
            let y0 = a.y.min(b.y).min(c.y).floor() as usize;
            let x1 = (a.x.max(b.x).max(c.x).ceil() as usize).min(res);
            let y1 = (a.y.max(b.y).max(c.y).ceil() as usize).min(res);

            for row in y0..y1 {
                for col in x0..x1 {
                    for (s, (dx, dy)) in offsets.iter().enumerate() {
                        let px = col as f32 + dx;
                        let py = row as f32 + dy;
                        let w0 = edge(&b, &c, px, py) / area;
                        let w1 = edge(&c, &a, px, py) / area;
                        let w2 = edge(&a, &b, px, py) / area;
                        if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                            continue;
                        }
                        let z = w0 * a.z + w1 * b.z + w2 * c.z;
                        let index = (row * res + col) * k + s;
                        if z > 0.0 && z < depth[index] {
                            depth[index] = z;
                            normal[index] = n;
                        }
                    }
                }
            }
        }

        // Cleared samples resolve to the far plane
        let far = 2.0 * camera.eye.coords.norm();
        let light = -camera.forward;
        let mut out_depth = DepthImage::new(res, res);
        let mut image = NormalImage::new(res, res);
        for px in 0..res * res {
            let samples = px * k..(px + 1) * k;
            let hits = samples.clone().filter(|&i| depth[i].is_finite());
            if hits.clone().next().is_none() {
                continue;
            }
            let n: Vector3<f32> = hits.map(|i| normal[i]).sum();
            let n = n.try_normalize(0.0).unwrap_or(n);
            let d: f32 = samples
                .map(|i| if depth[i].is_finite() { depth[i] } else { far })
                .sum();
            out_depth[px] = d / k as f32;
            image[px] = match self.state.mode {
                OutputMode::Normals => n.into(),
                OutputMode::Color => [n.dot(&light).abs(); 3],
            };
        }

        Ok(Frame {
            image,
            depth: out_depth,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mesh::primitives;
    use approx::assert_relative_eq;
    use nalgebra::Point3;

    fn front_camera() -> CameraPose {
        CameraPose::looking_at_origin(Point3::new(0.0, 0.0, 2.0), 1.0)
    }

    #[test]
    fn cube_front_face() {
        let mut r = Rasterizer::with_state(RenderState::SURFACE_SAMPLING);
        let frame =
            r.render(&primitives::cube(0.5), &front_camera(), 16).unwrap();
        assert_relative_eq!(frame.depth[(8, 8)], 1.5, epsilon = 1e-5);
        assert_relative_eq!(
            Vector3::from(frame.image[(8, 8)]),
            Vector3::z(),
            epsilon = 1e-6
        );
        assert_eq!(frame.depth[(0, 0)], 0.0);
        assert_eq!(frame.depth[(15, 15)], 0.0);
    }

    #[test]
    fn multisample_corrupts_silhouettes() {
        let cube = primitives::cube(0.5);
        let mut r = Rasterizer::with_state(RenderState::SURFACE_SAMPLING);
        let frame = r.render(&cube, &front_camera(), 10).unwrap();
        let hit: Vec<f32> =
            frame.depth.iter().cloned().filter(|d| *d > 0.0).collect();
        assert!(!hit.is_empty());
        for d in hit {
            assert_relative_eq!(d, 1.5, epsilon = 1e-5);
        }

        r.set_state(RenderState {
            mode: OutputMode::Normals,
            multisample: true,
        });
        let frame = r.render(&cube, &front_camera(), 10).unwrap();
        assert!(frame.depth.iter().any(|d| *d > 2.0));
    }

    #[test]
    fn color_mode() {
        let mut r = Rasterizer::with_state(RenderState {
            mode: OutputMode::Color,
            multisample: false,
        });
        let frame =
            r.render(&primitives::cube(0.5), &front_camera(), 16).unwrap();
        assert_relative_eq!(frame.image[(8, 8)][0], 1.0, epsilon = 1e-6);
        assert_eq!(frame.image[(0, 0)], [0.0; 3]);
    }

    #[test]
    fn nearest_face_wins() {
        // Viewed from +z, the sphere's near side is at depth 1
        let sphere = primitives::icosphere(3);
        let mut r = Rasterizer::with_state(RenderState::SURFACE_SAMPLING);
        let frame = r.render(&sphere, &front_camera(), 32).unwrap();
        let d = frame.depth[(16, 16)];
        assert!((d - 1.0).abs() < 0.01, "depth {d}");
        assert!(frame.image[(16, 16)][2] > 0.99);
    }

    #[test]
    fn zero_resolution() {
        let mut r = Rasterizer::new();
        let out = r.render(&primitives::cube(0.5), &front_camera(), 0);
        assert!(matches!(out, Err(Error::BadResolution(0))));
    }
}
