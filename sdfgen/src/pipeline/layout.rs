//! Input enumeration and artifact paths
use crate::Error;
use std::{
    fs::OpenOptions,
    path::{Component, Path, PathBuf},
};
use walkdir::WalkDir;

/// Kinds of per-mesh artifact
#[derive(
    Copy, Clone, Debug, Eq, PartialEq, Hash, strum::Display, strum::EnumIter,
)]
#[strum(serialize_all = "lowercase")]
pub enum OutputKind {
    /// Dense `R³` grid, stored as an `(R, R, R)` array
    Voxels,
    /// Sampled points, stored as an `(N, 4)` array
    Cloud,
}

/// Finds every mesh file under `root` with the given extension
///
/// The extension is matched case-insensitively, with or without a leading
/// dot.  Results are sorted, so repeated runs visit items in the same order.
pub fn enumerate(root: &Path, extension: &str) -> Result<Vec<PathBuf>, Error> {
    let want = extension.trim_start_matches('.');
    let mut out = vec![];
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let matches = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(want));
        if matches {
            out.push(entry.into_path());
        }
    }
    out.sort();
    Ok(out)
}

/// Maps source meshes to artifact and marker paths
///
/// The identity of a source is its path relative to the input root, without
/// its extension and with `/` separators.  Artifacts mirror the input tree
/// under the output root.
#[derive(Clone, Debug)]
pub struct ArtifactLayout {
    input: PathBuf,
    output: PathBuf,
    resolution: u32,
}

impl ArtifactLayout {
    /// Builds a layout; `resolution` is the voxel grid size
    pub fn new(input: &Path, output: &Path, resolution: u32) -> Self {
        Self {
            input: input.to_owned(),
            output: output.to_owned(),
            resolution,
        }
    }

    /// Returns the output root
    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Returns the identity of a source mesh
    ///
    /// Sources outside the input root are identified by file name alone.
    pub fn identity(&self, source: &Path) -> String {
        let rel = source
            .strip_prefix(&self.input)
            .ok()
            .filter(|r| !r.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| {
                source.file_name().map(PathBuf::from).unwrap_or_default()
            });
        rel.with_extension("")
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_string_lossy()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Returns the path of one artifact for the given identity
    pub fn artifact(&self, id: &str, kind: OutputKind) -> PathBuf {
        let name = match kind {
            OutputKind::Voxels => {
                format!("{id}-voxels-{}.npy", self.resolution)
            }
            OutputKind::Cloud => format!("{id}-sdf.npy"),
        };
        self.output.join(name)
    }

    /// Returns the bad-mesh marker path for the given identity
    pub fn marker(&self, id: &str) -> PathBuf {
        self.output.join(format!("{id}.badmesh"))
    }

    /// Checks whether a source was marked bad by an earlier run
    pub fn is_marked_bad(&self, id: &str) -> bool {
        self.marker(id).is_file()
    }

    /// Creates the bad-mesh marker, if it does not already exist
    pub fn mark_bad(&self, id: &str) -> Result<(), Error> {
        let path = self.marker(id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn artifact_paths() {
        let layout = ArtifactLayout::new(
            Path::new("data/meshes"),
            Path::new("data/sdf"),
            64,
        );
        let id = layout.identity(Path::new("data/meshes/chairs/abc.model.ply"));
        assert_eq!(id, "chairs/abc.model");
        assert_eq!(
            layout.artifact(&id, OutputKind::Voxels),
            Path::new("data/sdf/chairs/abc.model-voxels-64.npy")
        );
        assert_eq!(
            layout.artifact(&id, OutputKind::Cloud),
            Path::new("data/sdf/chairs/abc.model-sdf.npy")
        );
        assert_eq!(
            layout.marker(&id),
            Path::new("data/sdf/chairs/abc.model.badmesh")
        );
        assert_eq!(layout.identity(Path::new("elsewhere/x.obj")), "x");
        assert_eq!(OutputKind::Voxels.to_string(), "voxels");
    }

    #[test]
    fn enumerate_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("b/c")).unwrap();
        for f in ["z.ply", "a.PLY", "b/c/m.ply", "b/notes.txt", "b/d.obj"] {
            std::fs::write(root.join(f), "").unwrap();
        }
        std::fs::create_dir(root.join("dir.ply")).unwrap();

        let found = enumerate(root, ".ply").unwrap();
        let rel: Vec<_> = found
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_owned())
            .collect();
        assert_eq!(
            rel,
            vec![
                PathBuf::from("a.PLY"),
                PathBuf::from("b/c/m.ply"),
                PathBuf::from("z.ply")
            ]
        );
        assert!(enumerate(&root.join("missing"), "ply").is_err());
    }

    #[test]
    fn marker_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ArtifactLayout::new(dir.path(), dir.path(), 8);
        assert!(!layout.is_marked_bad("x/y"));
        layout.mark_bad("x/y").unwrap();
        layout.mark_bad("x/y").unwrap();
        assert!(layout.is_marked_bad("x/y"));
        assert!(dir.path().join("x/y.badmesh").is_file());
    }
}
