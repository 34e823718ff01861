//! Triangle meshes, loaders, and normalization into the unit sphere
//!
//! A [`Mesh`] is transient: the pipeline loads one per item, normalizes it in
//! place with [`normalize`], hands it to the sampler, and drops it.
use nalgebra::{Point3, Vector3};

mod load;
mod normalize;
pub mod primitives;

pub use load::{FileLoader, MeshLoader, load_obj, load_ply, load_stl};
pub use normalize::{
    Axis, Category, Normalization, RotationStep, RotationTable, normalize,
};

/// Indexed triangle mesh
///
/// Polygons with more than three vertices are fan-triangulated by the
/// loaders, so every face here is a triangle.
#[derive(Clone, Debug, Default)]
pub struct Mesh {
    /// Vertex positions
    pub vertices: Vec<Point3<f32>>,

    /// Triangles, as indices into [`Mesh::vertices`]
    pub triangles: Vec<[usize; 3]>,

    /// Optional per-vertex normals, parallel to [`Mesh::vertices`]
    pub normals: Option<Vec<Vector3<f32>>>,
}

impl Mesh {
    /// Builds an empty mesh
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a mesh from vertices and triangles
    ///
    /// Returns `None` if any triangle refers to a missing vertex.
    pub fn from_parts(
        vertices: Vec<Point3<f32>>,
        triangles: Vec<[usize; 3]>,
    ) -> Option<Self> {
        let n = vertices.len();
        if triangles.iter().flatten().any(|i| *i >= n) {
            return None;
        }
        Some(Self {
            vertices,
            triangles,
            normals: None,
        })
    }

    /// Returns the corners of the given triangle
    pub fn triangle(&self, i: usize) -> [Point3<f32>; 3] {
        self.triangles[i].map(|v| self.vertices[v])
    }

    /// Returns the unnormalized face normal of a triangle
    ///
    /// The length of the result is twice the triangle's area; degenerate
    /// triangles return a zero vector.
    pub fn face_normal(&self, i: usize) -> Vector3<f32> {
        let [a, b, c] = self.triangle(i);
        (b - a).cross(&(c - a))
    }

    /// Returns the axis-aligned bounding box as `(min, max)`
    ///
    /// Returns `None` if the mesh has no vertices.
    pub fn bounding_box(&self) -> Option<(Point3<f32>, Point3<f32>)> {
        let first = *self.vertices.first()?;
        Some(self.vertices.iter().fold((first, first), |(lo, hi), v| {
            (lo.inf(v), hi.sup(v))
        }))
    }

    /// Largest distance from `center` to any vertex
    pub fn radius_about(&self, center: &Point3<f32>) -> f32 {
        self.vertices
            .iter()
            .map(|v| (v - center).norm())
            .fold(0.0, f32::max)
    }

    /// Total surface area
    pub fn area(&self) -> f32 {
        (0..self.triangles.len())
            .map(|i| self.face_normal(i).norm() * 0.5)
            .sum()
    }

    /// Applies a function to every vertex
    pub(crate) fn map_vertices<F: Fn(&Point3<f32>) -> Point3<f32>>(
        &mut self,
        f: F,
    ) {
        for v in &mut self.vertices {
            *v = f(v);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn from_parts_checks_indices() {
        let v = vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0)];
        assert!(Mesh::from_parts(v.clone(), vec![[0, 1, 2]]).is_none());
        let mut w = v.clone();
        w.push(Point3::new(0.0, 1.0, 0.0));
        let mesh = Mesh::from_parts(w, vec![[0, 1, 2]]).unwrap();
        assert_eq!(mesh.face_normal(0), Vector3::new(0.0, 0.0, 1.0));
        assert_eq!(mesh.area(), 0.5);
    }

    #[test]
    fn bounding_box() {
        assert!(Mesh::new().bounding_box().is_none());
        let mesh = primitives::cube(0.5);
        let (lo, hi) = mesh.bounding_box().unwrap();
        assert_eq!(lo, Point3::new(-0.5, -0.5, -0.5));
        assert_eq!(hi, Point3::new(0.5, 0.5, 0.5));
        let r = mesh.radius_about(&Point3::origin());
        assert!((r - 0.75f32.sqrt()).abs() < 1e-6);
    }
}
