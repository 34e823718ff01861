//! Aggregation of per-mesh artifacts into training arrays
use super::{ArtifactLayout, OutputKind};
use crate::{Error, npy};
use std::path::{Path, PathBuf};

/// Returns the existing artifacts of one kind, sorted by path
fn existing(
    layout: &ArtifactLayout,
    sources: &[PathBuf],
    kind: OutputKind,
) -> Vec<PathBuf> {
    let mut out: Vec<PathBuf> = sources
        .iter()
        .map(|s| layout.artifact(&layout.identity(s), kind))
        .filter(|p| p.is_file())
        .collect();
    out.sort();
    out
}

fn read_checked(path: &Path, shape: &[usize]) -> Result<Vec<f32>, Error> {
    let a = npy::read_f32(path)?;
    if a.shape != shape {
        return Err(Error::BadArray(format!(
            "{} has shape {:?}, expected {shape:?}",
            path.display(),
            a.shape
        )));
    }
    Ok(a.data)
}

/// Stacks every per-mesh voxel grid into one `(N, R, R, R)` array
///
/// Sources without a grid (bad or unprocessed meshes) are skipped.  Returns
/// the number of grids written.
pub fn combine_voxels(
    layout: &ArtifactLayout,
    sources: &[PathBuf],
    resolution: u32,
    out: &Path,
) -> Result<usize, Error> {
    let files = existing(layout, sources, OutputKind::Voxels);
    let r = resolution as usize;
    let shape = [r, r, r];
    log::info!(
        "combining {} voxel grids into {}",
        files.len(),
        out.display()
    );
    npy::write_chunks(
        out,
        &[files.len(), r, r, r],
        files.iter().map(|f| read_checked(f, &shape)),
    )?;
    Ok(files.len())
}

/// Concatenates every per-mesh point cloud
///
/// Writes `sdf_points.npy` (`(N·S, 3)`) and `sdf_values.npy` (`(N·S,)`) into
/// `out_dir`, where `S` is the number of samples per cloud.  Returns `N`.
pub fn combine_clouds(
    layout: &ArtifactLayout,
    sources: &[PathBuf],
    sample_count: usize,
    out_dir: &Path,
) -> Result<usize, Error> {
    let files = existing(layout, sources, OutputKind::Cloud);
    let shape = [sample_count, 4];
    let rows = files.len() * sample_count;
    log::info!(
        "combining {} point clouds into {}",
        files.len(),
        out_dir.display()
    );

    // Each file is read twice, so neither output needs all clouds in memory
    npy::write_chunks(
        &out_dir.join("sdf_points.npy"),
        &[rows, 3],
        files.iter().map(|f| {
            let data = read_checked(f, &shape)?;
            Ok(data
                .chunks_exact(4)
                .flat_map(|r| [r[0], r[1], r[2]])
                .collect::<Vec<f32>>())
        }),
    )?;
    npy::write_chunks(
        &out_dir.join("sdf_values.npy"),
        &[rows],
        files.iter().map(|f| {
            let data = read_checked(f, &shape)?;
            Ok(data.chunks_exact(4).map(|r| r[3]).collect::<Vec<f32>>())
        }),
    )?;
    Ok(files.len())
}
