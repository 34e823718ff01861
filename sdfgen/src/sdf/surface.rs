//! Observed surface points and nearest-neighbor search
use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::{Point3, Rotation3, Vector3};
use std::collections::HashSet;

/// Surface samples reconstructed from renders
///
/// The three vectors are parallel: `normals[i]` is the outward unit normal at
/// `points[i]`, which was seen from camera `viewpoints[i]`.
#[derive(Clone, Debug, Default)]
pub struct SurfacePoints {
    pub points: Vec<Point3<f32>>,
    pub normals: Vec<Vector3<f32>>,
    pub viewpoints: Vec<u32>,
}

impl SurfacePoints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn push(&mut self, p: Point3<f32>, n: Vector3<f32>, viewpoint: u32) {
        self.points.push(p);
        self.normals.push(n);
        self.viewpoints.push(viewpoint);
    }

    /// Number of distinct viewpoints that contributed points
    pub fn views_seen(&self) -> usize {
        self.viewpoints.iter().collect::<HashSet<_>>().len()
    }

    /// Removes exact duplicate positions, keeping the first occurrence
    pub fn dedup(&mut self) {
        let mut seen = HashSet::with_capacity(self.points.len());
        let mut keep = 0;
        for i in 0..self.points.len() {
            let key = self.points[i].coords.map(f32::to_bits);
            if seen.insert((key.x, key.y, key.z)) {
                self.points.swap(keep, i);
                self.normals.swap(keep, i);
                self.viewpoints.swap(keep, i);
                keep += 1;
            }
        }
        self.points.truncate(keep);
        self.normals.truncate(keep);
        self.viewpoints.truncate(keep);
    }
}

/// A neighbor returned by [`SurfaceTree::nearest`]
#[derive(Copy, Clone, Debug)]
pub struct Neighbor {
    /// Index into the [`SurfacePoints`] used to build the tree
    pub index: usize,
    /// Squared distance to the query
    pub distance_squared: f32,
}

/// k-d tree over surface points
///
/// Rendered surfaces contain large grids of points sharing a coordinate
/// (any axis-aligned face does), and a bucketed k-d tree cannot split a
/// bucket whose points all share the split value.  Points are therefore
/// stored in a fixed oblique frame; distances are unaffected.
pub struct SurfaceTree {
    tree: KdTree<f32, 3>,
    frame: Rotation3<f32>,
}

impl SurfaceTree {
    /// Builds a tree over `surface`, which should be deduplicated
    pub fn new(surface: &SurfacePoints) -> Self {
        let frame =
            Rotation3::from_euler_angles(0.6154797, 0.7853982, 0.3398369);
        let mut tree = KdTree::with_capacity(surface.len());
        for (i, p) in surface.points.iter().enumerate() {
            let q = frame * p;
            tree.add(&[q.x, q.y, q.z], i as u64);
        }
        Self { tree, frame }
    }

    /// Returns up to `k` nearest points, closest first
    pub fn nearest(&self, query: &Point3<f32>, k: usize) -> Vec<Neighbor> {
        let q = self.frame * query;
        self.tree
            .nearest_n::<SquaredEuclidean>(&[q.x, q.y, q.z], k)
            .into_iter()
            .map(|n| Neighbor {
                index: n.item as usize,
                distance_squared: n.distance,
            })
            .collect()
    }
}
