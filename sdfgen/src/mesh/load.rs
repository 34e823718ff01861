//! Mesh loading
//!
//! The pipeline only talks to the [`MeshLoader`] trait; [`FileLoader`] is the
//! stock implementation, dispatching on file extension.
use super::Mesh;
use crate::Error;
use nalgebra::Point3;
use std::{
    fs::File,
    io::{BufRead, BufReader, Read},
    path::Path,
};

/// Source of meshes for the pipeline
pub trait MeshLoader: Sync {
    /// Loads the mesh at `path`
    ///
    /// Malformed input is reported as [`Error::MeshLoad`].
    fn load(&self, path: &Path) -> Result<Mesh, Error>;
}

/// Loads `.ply`, `.obj`, and `.stl` files from disk
#[derive(Copy, Clone, Debug, Default)]
pub struct FileLoader;

impl MeshLoader for FileLoader {
    fn load(&self, path: &Path) -> Result<Mesh, Error> {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_ascii_lowercase())
            .unwrap_or_default();
        let file = File::open(path)
            .map_err(|e| Error::mesh_load(path, e.to_string()))?;
        let mut reader = BufReader::new(file);
        let mesh = match ext.as_str() {
            "obj" => load_obj(&mut reader),
            "stl" => load_stl(&mut reader),
            "ply" => load_ply(&mut reader),
            _ => Err(format!("unsupported extension {ext:?}")),
        }
        .map_err(|reason| Error::mesh_load(path, reason))?;
        if mesh.triangles.is_empty() {
            return Err(Error::mesh_load(path, "file contains no faces"));
        }
        Ok(mesh)
    }
}

/// Appends a polygon to the mesh, fan-triangulating it
fn push_polygon(mesh: &mut Mesh, indices: &[usize]) -> Result<(), String> {
    if indices.len() < 3 {
        return Err(format!("face has {} vertices", indices.len()));
    }
    if let Some(i) = indices.iter().find(|i| **i >= mesh.vertices.len()) {
        return Err(format!(
            "face refers to vertex {i}, but there are only {}",
            mesh.vertices.len()
        ));
    }
    for i in 1..indices.len() - 1 {
        mesh.triangles.push([indices[0], indices[i], indices[i + 1]]);
    }
    Ok(())
}

/// Parses a Wavefront OBJ file
///
/// Polygons are triangulated and every object or group in the file is merged
/// into one mesh.  Material libraries are not read.
pub fn load_obj<R: BufRead>(mut reader: R) -> Result<Mesh, String> {
    let opts = tobj::LoadOptions {
        triangulate: true,
        ..Default::default()
    };
    let (models, _) =
        tobj::load_obj_buf(&mut reader, &opts, |_| {
            Err(tobj::LoadError::OpenFileFailed)
        })
        .map_err(|e| format!("failed to parse OBJ: {e}"))?;

    let mut mesh = Mesh::new();
    for m in models {
        let start = mesh.vertices.len();
        mesh.vertices.extend(
            m.mesh
                .positions
                .chunks_exact(3)
                .map(|p| Point3::new(p[0], p[1], p[2])),
        );
        for t in m.mesh.indices.chunks_exact(3) {
            let face: Vec<usize> =
                t.iter().map(|i| start + *i as usize).collect();
            push_polygon(&mut mesh, &face)?;
        }
    }
    Ok(mesh)
}

/// Parses a binary or ASCII STL file
///
/// STL stores unshared corners, so each facet becomes three new vertices.
pub fn load_stl<R: Read>(mut reader: R) -> Result<Mesh, String> {
    let mut data = vec![];
    reader.read_to_end(&mut data).map_err(|e| e.to_string())?;

    // Some binary files begin with "solid" too, so trust the size check first
    if data.len() >= 84 {
        let n = u32::from_le_bytes([data[80], data[81], data[82], data[83]]);
        if data.len() == 84 + n as usize * 50 {
            return load_stl_binary(&data[84..], n as usize);
        }
    }
    if data.starts_with(b"solid") {
        load_stl_ascii(&data)
    } else {
        Err("not a valid binary or ASCII STL file".to_owned())
    }
}

fn load_stl_binary(data: &[u8], n: usize) -> Result<Mesh, String> {
    let mut mesh = Mesh::new();
    for facet in data.chunks_exact(50).take(n) {
        // Skip the stored normal (12 bytes); attributes trail the corners
        let corners = &facet[12..48];
        let start = mesh.vertices.len();
        for c in corners.chunks_exact(12) {
            let f = |i: usize| {
                f32::from_le_bytes([c[i], c[i + 1], c[i + 2], c[i + 3]])
            };
            mesh.vertices.push(Point3::new(f(0), f(4), f(8)));
        }
        mesh.triangles.push([start, start + 1, start + 2]);
    }
    Ok(mesh)
}

fn load_stl_ascii(data: &[u8]) -> Result<Mesh, String> {
    let text = std::str::from_utf8(data).map_err(|e| e.to_string())?;
    let mut mesh = Mesh::new();
    let mut facet = vec![];
    for line in text.lines() {
        let mut words = line.split_whitespace();
        match words.next() {
            Some("vertex") => {
                let xyz = words
                    .map(|w| w.parse::<f32>())
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| e.to_string())?;
                let [x, y, z] = xyz[..] else {
                    return Err(format!("bad vertex line {line:?}"));
                };
                facet.push(mesh.vertices.len());
                mesh.vertices.push(Point3::new(x, y, z));
            }
            Some("endfacet") => {
                push_polygon(&mut mesh, &facet)?;
                facet.clear();
            }
            _ => (),
        }
    }
    Ok(mesh)
}

/// Parses an ASCII or binary PLY file with `vertex` and `face` elements
pub fn load_ply<R: BufRead>(reader: &mut R) -> Result<Mesh, String> {
    use ply_rs::{parser::Parser, ply::DefaultElement};

    let parser = Parser::<DefaultElement>::new();
    let ply = parser
        .read_ply(reader)
        .map_err(|e| format!("failed to parse PLY: {e}"))?;

    let mut mesh = Mesh::new();
    if let Some(vertices) = ply.payload.get("vertex") {
        mesh.vertices.reserve(vertices.len());
        for v in vertices {
            let get = |k: &str| {
                ply_float(v, k).ok_or_else(|| format!("vertex is missing {k}"))
            };
            mesh.vertices.push(Point3::new(get("x")?, get("y")?, get("z")?));
        }
    }
    if let Some(faces) = ply.payload.get("face") {
        for f in faces {
            push_polygon(&mut mesh, &ply_indices(f))?;
        }
    }
    Ok(mesh)
}

fn ply_float(e: &ply_rs::ply::DefaultElement, key: &str) -> Option<f32> {
    use ply_rs::ply::Property;
    match e.get(key)? {
        Property::Float(v) => Some(*v),
        Property::Double(v) => Some(*v as f32),
        Property::Int(v) => Some(*v as f32),
        Property::UInt(v) => Some(*v as f32),
        Property::Short(v) => Some(*v as f32),
        Property::UShort(v) => Some(*v as f32),
        _ => None,
    }
}

fn ply_indices(e: &ply_rs::ply::DefaultElement) -> Vec<usize> {
    use ply_rs::ply::Property;
    for key in ["vertex_indices", "vertex_index"] {
        let Some(p) = e.get(key) else {
            continue;
        };
        return match p {
            Property::ListInt(v) => v.iter().map(|i| *i as usize).collect(),
            Property::ListUInt(v) => v.iter().map(|i| *i as usize).collect(),
            Property::ListShort(v) => v.iter().map(|i| *i as usize).collect(),
            Property::ListUShort(v) => v.iter().map(|i| *i as usize).collect(),
            Property::ListChar(v) => v.iter().map(|i| *i as usize).collect(),
            Property::ListUChar(v) => v.iter().map(|i| *i as usize).collect(),
            _ => continue,
        };
    }
    vec![]
}
