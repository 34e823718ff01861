//! Canonical-frame normalization
//!
//! Meshes are recentered on their bounding-box center, scaled so that the
//! farthest vertex lies on the unit sphere, then rotated by a matrix chosen
//! from a [`RotationTable`].
use super::Mesh;
use crate::Error;
use nalgebra::{Point3, Rotation3, Unit, Vector3};
use serde::{Deserialize, Serialize};

/// Coordinate axis used in a [`RotationStep`]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    fn unit(self) -> Unit<Vector3<f32>> {
        match self {
            Axis::X => Vector3::x_axis(),
            Axis::Y => Vector3::y_axis(),
            Axis::Z => Vector3::z_axis(),
        }
    }
}

/// A single rotation about a coordinate axis
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RotationStep {
    pub axis: Axis,
    pub degrees: f32,
}

impl RotationStep {
    pub fn new(axis: Axis, degrees: f32) -> Self {
        Self { axis, degrees }
    }

    fn matrix(&self) -> Rotation3<f32> {
        Rotation3::from_axis_angle(&self.axis.unit(), self.degrees.to_radians())
    }
}

/// Source category with its canonical-frame rotation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Category {
    /// Name used in logs
    pub tag: String,

    /// Substrings of the mesh identity which select this category
    #[serde(default)]
    pub patterns: Vec<String>,

    /// Rotation steps, composed left to right as a matrix product
    ///
    /// `[Rx(90), Rz(180)]` produces the matrix `Rx(90) · Rz(180)`.
    #[serde(default)]
    pub rotation: Vec<RotationStep>,
}

impl Category {
    /// Composes the rotation steps into a single matrix
    pub fn rotation(&self) -> Rotation3<f32> {
        self.rotation
            .iter()
            .fold(Rotation3::identity(), |acc, s| acc * s.matrix())
    }

    fn matches(&self, identity: &str) -> bool {
        self.patterns.iter().any(|p| identity.contains(p.as_str()))
    }
}

/// Data-driven mapping from mesh identity to rotation
///
/// Categories are checked in order; the first category with a matching
/// pattern wins, falling back to `default`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationTable {
    pub categories: Vec<Category>,
    pub default: Category,
}

impl Default for RotationTable {
    fn default() -> Self {
        Self {
            categories: vec![],
            default: Category {
                tag: "generic".to_owned(),
                patterns: vec![],
                rotation: vec![],
            },
        }
    }
}

impl RotationTable {
    /// Table used for the ShapeNet-plus-anatomy corpus
    ///
    /// Anatomical scans (by filename prefix) are stored Z-up facing the
    /// other way from the generic models, so they get a different tilt.
    pub fn shape_corpus() -> Self {
        Self {
            categories: vec![Category {
                tag: "anatomical".to_owned(),
                patterns: ["CMU_", "KKI_", "Caltech_", "Leuven_", "PE0"]
                    .into_iter()
                    .map(String::from)
                    .collect(),
                rotation: vec![
                    RotationStep::new(Axis::X, -90.0),
                    RotationStep::new(Axis::Z, 180.0),
                ],
            }],
            default: Category {
                tag: "generic".to_owned(),
                patterns: vec![],
                rotation: vec![
                    RotationStep::new(Axis::X, 90.0),
                    RotationStep::new(Axis::Z, 180.0),
                ],
            },
        }
    }

    /// Picks the category for a mesh identity (typically its relative path)
    pub fn resolve(&self, identity: &str) -> &Category {
        self.categories
            .iter()
            .find(|c| c.matches(identity))
            .unwrap_or(&self.default)
    }
}

/// Record of the transform applied by [`normalize`]
#[derive(Clone, Debug)]
pub struct Normalization {
    /// Bounding-box center of the input mesh
    pub center: Point3<f32>,
    /// Uniform scale applied after recentering
    pub scale: f32,
    /// Rotation applied last
    pub rotation: Rotation3<f32>,
}

/// Recenters, rescales, and rotates a mesh into the unit sphere
///
/// The center is the bounding-box center (not the vertex centroid), so the
/// result does not depend on tessellation density.
///
/// Fails with [`Error::BadMesh`] if the mesh has no triangles or no extent.
pub fn normalize(
    mesh: &mut Mesh,
    rotation: &Rotation3<f32>,
) -> Result<Normalization, Error> {
    if mesh.triangles.is_empty() {
        return Err(Error::BadMesh("mesh has no faces".to_owned()));
    }
    let (lo, hi) = mesh
        .bounding_box()
        .ok_or_else(|| Error::BadMesh("mesh has no vertices".to_owned()))?;
    let center = nalgebra::center(&lo, &hi);
    let radius = mesh.radius_about(&center);
    if !(radius.is_finite() && radius > f32::EPSILON) {
        return Err(Error::BadMesh(format!(
            "mesh has degenerate extent (radius {radius})"
        )));
    }
    let scale = 1.0 / radius;
    mesh.map_vertices(|v| rotation * Point3::from((v - center) * scale));
    if let Some(normals) = mesh.normals.as_mut() {
        for n in normals {
            *n = rotation * *n;
        }
    }
    Ok(Normalization {
        center,
        scale,
        rotation: *rotation,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mesh::primitives;
    use approx::assert_relative_eq;

    #[test]
    fn normalize_cube() {
        let mut mesh = primitives::cube(3.0);
        mesh.map_vertices(|v| v + Vector3::new(10.0, -4.0, 2.0));
        let n = normalize(&mut mesh, &Rotation3::identity()).unwrap();
        assert_relative_eq!(n.center, Point3::new(10.0, -4.0, 2.0));
        assert_relative_eq!(
            mesh.radius_about(&Point3::origin()),
            1.0,
            epsilon = 1e-6
        );
        let (lo, hi) = mesh.bounding_box().unwrap();
        let h = 1.0 / 3.0f32.sqrt();
        assert_relative_eq!(hi, Point3::new(h, h, h), epsilon = 1e-6);
        assert_relative_eq!(lo, Point3::new(-h, -h, -h), epsilon = 1e-6);
    }

    #[test]
    fn normalize_uses_bounding_box_center() {
        // Extra vertices clustered near one corner pull the centroid, but
        // not the bounding-box center
        let mut mesh = primitives::cube(1.0);
        for _ in 0..20 {
            mesh.vertices.push(Point3::new(0.9, 0.9, 0.9));
        }
        let n = normalize(&mut mesh, &Rotation3::identity()).unwrap();
        assert_relative_eq!(n.center, Point3::origin());
    }

    #[test]
    fn degenerate_meshes_are_bad() {
        let mut mesh = Mesh::from_parts(
            vec![Point3::new(1.0, 1.0, 1.0); 3],
            vec![[0, 1, 2]],
        )
        .unwrap();
        let r = normalize(&mut mesh, &Rotation3::identity());
        assert!(matches!(r, Err(Error::BadMesh(..))), "{r:?}");

        let mut empty = Mesh::new();
        let r = normalize(&mut empty, &Rotation3::identity());
        assert!(matches!(r, Err(Error::BadMesh(..))), "{r:?}");
    }

    #[test]
    fn resolve_category() {
        let table = RotationTable::shape_corpus();
        assert_eq!(table.resolve("humans/KKI_0042").tag, "anatomical");
        assert_eq!(table.resolve("chairs/PE01").tag, "anatomical");
        assert_eq!(table.resolve("chairs/1a2b3c").tag, "generic");
        assert_eq!(RotationTable::default().resolve("KKI_").tag, "generic");
    }

    #[test]
    fn rotation_composition() {
        let table = RotationTable::shape_corpus();
        let r = table.resolve("airplane").rotation();
        // Rz(180) sends +x to -x, then Rx(90) leaves it there
        let v = r * Vector3::x();
        assert_relative_eq!(v, -Vector3::x(), epsilon = 1e-6);
        // Rz(180) sends +y to -y, then Rx(90) sends -y to -z
        let v = r * Vector3::y();
        assert_relative_eq!(v, -Vector3::z(), epsilon = 1e-6);

        let r = table.resolve("CMU_1").rotation();
        let v = r * Vector3::y();
        assert_relative_eq!(v, Vector3::z(), epsilon = 1e-6);
    }

    #[test]
    fn table_from_toml() {
        let table: RotationTable = toml::from_str(
            r#"
            [[categories]]
            tag = "scan"
            patterns = ["scan_"]
            rotation = [{ axis = "y", degrees = 90.0 }]

            [default]
            tag = "other"
            "#,
        )
        .unwrap();
        assert_eq!(table.resolve("scan_1").tag, "scan");
        assert_eq!(table.resolve("x").tag, "other");
        let v = table.resolve("scan_1").rotation() * Vector3::z();
        assert_relative_eq!(v, Vector3::x(), epsilon = 1e-6);
    }
}
