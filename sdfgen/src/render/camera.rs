//! Orthographic cameras looking at the origin
use nalgebra::{Point3, Vector3};

/// Orthographic camera with an orthonormal basis
///
/// Screen coordinates run from `-half_extent` to `+half_extent` along
/// `right` and `up`; pixel row 0 is at the top of the image.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CameraPose {
    /// Camera position
    pub eye: Point3<f32>,
    /// Unit viewing direction
    pub forward: Vector3<f32>,
    /// Unit screen-space X axis
    pub right: Vector3<f32>,
    /// Unit screen-space Y axis
    pub up: Vector3<f32>,
    /// Half-width of the visible square, in world units
    pub half_extent: f32,
}

impl CameraPose {
    /// Builds a camera at `eye` looking at the origin
    ///
    /// `eye` must not be the origin.
    pub fn looking_at_origin(eye: Point3<f32>, half_extent: f32) -> Self {
        let forward = -eye.coords.normalize();
        // Avoid a degenerate basis when looking along the Y axis
        let helper = if forward.y.abs() > 0.99 {
            Vector3::z()
        } else {
            Vector3::y()
        };
        let right = forward.cross(&helper).normalize();
        let up = right.cross(&forward);
        Self {
            eye,
            forward,
            right,
            up,
            half_extent,
        }
    }

    /// Returns the camera-space position `(u, v, depth)` of a world point
    pub fn project(&self, p: &Point3<f32>) -> Vector3<f32> {
        let d = p - self.eye;
        Vector3::new(d.dot(&self.right), d.dot(&self.up), d.dot(&self.forward))
    }

    /// Converts a world point to `(column, row, depth)` in pixel units
    pub fn to_screen(&self, p: &Point3<f32>, resolution: u32) -> Vector3<f32> {
        let c = self.project(p);
        let res = resolution as f32;
        let h = self.half_extent;
        Vector3::new(
            (c.x / h + 1.0) * 0.5 * res,
            (1.0 - c.y / h) * 0.5 * res,
            c.z,
        )
    }

    /// Back-projects the center of a pixel at the given depth
    pub fn unproject(
        &self,
        row: usize,
        col: usize,
        depth: f32,
        resolution: u32,
    ) -> Point3<f32> {
        let res = resolution as f32;
        let h = self.half_extent;
        let u = ((col as f32 + 0.5) / res * 2.0 - 1.0) * h;
        let v = (1.0 - (row as f32 + 0.5) / res * 2.0) * h;
        self.eye + self.right * u + self.up * v + self.forward * depth
    }
}

/// Returns `n` near-uniform points on a sphere of the given radius
///
/// Points follow a spherical Fibonacci spiral from the +Y pole to the -Y pole.
pub fn fibonacci_sphere(n: usize, radius: f32) -> Vec<Point3<f32>> {
    let golden = std::f32::consts::PI * (3.0 - 5.0f32.sqrt());
    (0..n)
        .map(|i| {
            let y = if n == 1 {
                0.0
            } else {
                1.0 - 2.0 * i as f32 / (n - 1) as f32
            };
            let r = (1.0 - y * y).max(0.0).sqrt();
            let theta = golden * i as f32;
            Point3::new(r * theta.cos(), y, r * theta.sin()) * radius
        })
        .collect()
}

/// Builds `n` cameras on a sphere of radius `distance`, all aimed inward
///
/// Each camera sees the whole unit sphere.
pub fn viewpoints(n: usize, distance: f32) -> Vec<CameraPose> {
    fibonacci_sphere(n, distance)
        .into_iter()
        .map(|eye| CameraPose::looking_at_origin(eye, 1.0))
        .collect()
}
