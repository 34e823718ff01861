//! Simple closed meshes, used for calibration and testing
use super::Mesh;
use nalgebra::Point3;
use std::collections::HashMap;

/// Builds an axis-aligned cube centered at the origin
///
/// Faces are wound counter-clockwise when seen from outside.
pub fn cube(half: f32) -> Mesh {
    let vertices = (0..8)
        .map(|i| {
            let x = if matches!(i, 1 | 2 | 5 | 6) { half } else { -half };
            let y = if matches!(i, 2 | 3 | 6 | 7) { half } else { -half };
            let z = if i >= 4 { half } else { -half };
            Point3::new(x, y, z)
        })
        .collect();
    let triangles = vec![
        [0, 2, 1],
        [0, 3, 2],
        [4, 5, 6],
        [4, 6, 7],
        [0, 1, 5],
        [0, 5, 4],
        [3, 7, 6],
        [3, 6, 2],
        [0, 4, 7],
        [0, 7, 3],
        [1, 2, 6],
        [1, 6, 5],
    ];
    Mesh {
        vertices,
        triangles,
        normals: None,
    }
}

/// Builds a unit icosphere by repeatedly splitting an icosahedron
///
/// Every vertex lies exactly on the unit sphere; faces lie slightly inside
/// it, by an amount that shrinks with each subdivision.
pub fn icosphere(subdivisions: usize) -> Mesh {
    let t = (1.0 + 5.0f32.sqrt()) / 2.0;
    let mut vertices: Vec<Point3<f32>> = [
        [-1.0, t, 0.0],
        [1.0, t, 0.0],
        [-1.0, -t, 0.0],
        [1.0, -t, 0.0],
        [0.0, -1.0, t],
        [0.0, 1.0, t],
        [0.0, -1.0, -t],
        [0.0, 1.0, -t],
        [t, 0.0, -1.0],
        [t, 0.0, 1.0],
        [-t, 0.0, -1.0],
        [-t, 0.0, 1.0],
    ]
    .iter()
    .map(|[x, y, z]| {
        Point3::from(nalgebra::Vector3::new(*x, *y, *z).normalize())
    })
    .collect();

    let mut triangles = vec![
        [0, 11, 5],
        [0, 5, 1],
        [0, 1, 7],
        [0, 7, 10],
        [0, 10, 11],
        [1, 5, 9],
        [5, 11, 4],
        [11, 10, 2],
        [10, 7, 6],
        [7, 1, 8],
        [3, 9, 4],
        [3, 4, 2],
        [3, 2, 6],
        [3, 6, 8],
        [3, 8, 9],
        [4, 9, 5],
        [2, 4, 11],
        [6, 2, 10],
        [8, 6, 7],
        [9, 8, 1],
    ];

    for _ in 0..subdivisions {
        let mut midpoints: HashMap<(usize, usize), usize> = HashMap::new();
        let mut midpoint = |a: usize, b: usize| {
            let key = (a.min(b), a.max(b));
            *midpoints.entry(key).or_insert_with(|| {
                let m = (vertices[a].coords + vertices[b].coords).normalize();
                vertices.push(Point3::from(m));
                vertices.len() - 1
            })
        };
        let mut next = Vec::with_capacity(triangles.len() * 4);
        for [a, b, c] in triangles {
            let ab = midpoint(a, b);
            let bc = midpoint(b, c);
            let ca = midpoint(c, a);
            next.extend([[a, ab, ca], [b, bc, ab], [c, ca, bc], [ab, bc, ca]]);
        }
        triangles = next;
    }

    Mesh {
        vertices,
        triangles,
        normals: None,
    }
}
