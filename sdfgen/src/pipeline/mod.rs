//! Resumable batch processing of a directory of meshes
//!
//! A [`Pipeline`] enumerates the input tree, then hands each mesh to a fixed
//! pool of worker threads.  Every item first checks its bad-mesh marker and
//! its outputs, so an interrupted run can simply be started again: finished
//! and known-bad items are skipped, and nothing else is lost because outputs
//! are only ever renamed into place once complete.
//!
//! Per-item failures never stop the run.  A [`Error::BadMesh`] leaves a
//! marker that excludes the item from future runs, a [`Error::MeshLoad`] is
//! reported as [`ItemState::LoadFailed`], and a panic while processing one
//! item is caught and reported as [`ItemState::Failed`].  Any other error is
//! systemic: dispatch stops, in-flight items finish, and [`Pipeline::run`]
//! returns the error.
use crate::{
    Error,
    config::Config,
    mesh::{FileLoader, MeshLoader, normalize},
    npy,
    render::{Rasterizer, RenderGuard},
    sdf::{SdfSampler, cloud_seed, point_cloud, voxel_grid},
};
use rand::{SeedableRng, rngs::StdRng};
use std::{
    panic::{self, AssertUnwindSafe},
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use strum::IntoEnumIterator;

mod combine;
mod layout;

pub use combine::{combine_clouds, combine_voxels};
pub use layout::{ArtifactLayout, OutputKind, enumerate};

/// Shared flag for stopping a run early
///
/// Cancellation stops dispatch; items already being processed run to
/// completion.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Progress of a single source mesh
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, strum::Display)]
pub enum ItemState {
    /// Not started (or never started, after cancellation)
    Pending,
    /// Picked up by a worker
    Processing,
    /// All requested outputs were written
    Done,
    /// Failed a geometry check; a marker was written
    BadMesh,
    /// Every requested output already existed
    SkippedAlreadyDone,
    /// Marked bad by an earlier run
    SkippedBadMesh,
    /// The file could not be parsed
    LoadFailed,
    /// Processing panicked; the item is retried on the next run
    Failed,
}

impl ItemState {
    /// Checks whether the state is final
    pub fn is_terminal(self) -> bool {
        !matches!(self, ItemState::Pending | ItemState::Processing)
    }
}

/// Outcome of one source mesh
#[derive(Clone, Debug)]
pub struct ItemReport {
    pub source: PathBuf,
    pub id: String,
    pub state: ItemState,
    /// Reason for a [`ItemState::BadMesh`], [`ItemState::LoadFailed`] or
    /// [`ItemState::Failed`]
    pub message: Option<String>,
}

/// Outcome of a whole run, in enumeration order
#[derive(Clone, Debug, Default)]
pub struct PipelineReport {
    pub items: Vec<ItemReport>,
}

impl PipelineReport {
    /// Counts items in the given state
    pub fn count(&self, state: ItemState) -> usize {
        self.items.iter().filter(|i| i.state == state).count()
    }

    /// Checks whether every item reached a final state
    pub fn is_complete(&self) -> bool {
        self.items.iter().all(|i| i.state.is_terminal())
    }
}

impl std::fmt::Display for PipelineReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} items:", self.items.len())?;
        let mut first = true;
        for state in [
            ItemState::Done,
            ItemState::BadMesh,
            ItemState::SkippedAlreadyDone,
            ItemState::SkippedBadMesh,
            ItemState::LoadFailed,
            ItemState::Failed,
            ItemState::Pending,
            ItemState::Processing,
        ] {
            let n = self.count(state);
            if n > 0 {
                write!(f, "{} {n} {state}", if first { "" } else { "," })?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Messages from workers to the consuming thread
enum Event {
    Started(usize),
    Finished(usize, Result<(ItemState, Option<String>), Error>),
}

/// Batch SDF generator
pub struct Pipeline<L = FileLoader> {
    config: Config,
    layout: ArtifactLayout,
    loader: L,
    guard: RenderGuard,
}

impl Pipeline<FileLoader> {
    /// Builds a pipeline which reads files from disk and renders on the CPU
    pub fn new(config: Config) -> Result<Self, Error> {
        let timeout = config.render.lock_timeout()?;
        let guard = RenderGuard::new(Rasterizer::new(), timeout);
        Self::with_parts(config, FileLoader, guard)
    }
}

impl<L: MeshLoader> Pipeline<L> {
    /// Builds a pipeline from a custom loader and render context
    pub fn with_parts(
        config: Config,
        loader: L,
        guard: RenderGuard,
    ) -> Result<Self, Error> {
        config.validate()?;
        let layout = ArtifactLayout::new(
            &config.paths.input,
            &config.paths.output,
            config.voxels.resolution,
        );
        Ok(Self {
            config,
            layout,
            loader,
            guard,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    pub fn guard(&self) -> &RenderGuard {
        &self.guard
    }

    /// Returns the number of worker threads to use
    pub fn worker_count(&self) -> usize {
        match self.config.workers {
            0 => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            n => n,
        }
    }

    /// Output kinds requested by the configuration
    fn requested(&self) -> impl Iterator<Item = OutputKind> + '_ {
        OutputKind::iter().filter(|k| match k {
            OutputKind::Voxels => self.config.voxels.enabled,
            OutputKind::Cloud => self.config.cloud.enabled,
        })
    }

    /// Processes every mesh under the input root
    pub fn run(&self, cancel: &CancelToken) -> Result<PipelineReport, Error> {
        let sources =
            enumerate(&self.config.paths.input, &self.config.paths.extension)?;
        self.run_sources(&sources, cancel)
    }

    /// Processes the given meshes
    pub fn run_sources(
        &self,
        sources: &[PathBuf],
        cancel: &CancelToken,
    ) -> Result<PipelineReport, Error> {
        let workers = self.worker_count().min(sources.len()).max(1);
        log::info!(
            "processing {} meshes from {:?} with {workers} workers",
            sources.len(),
            self.config.paths.input
        );

        let ids: Vec<String> =
            sources.iter().map(|s| self.layout.identity(s)).collect();
        let mut report = PipelineReport {
            items: sources
                .iter()
                .zip(&ids)
                .map(|(source, id)| ItemReport {
                    source: source.clone(),
                    id: id.clone(),
                    state: ItemState::Pending,
                    message: None,
                })
                .collect(),
        };

        let abort = AtomicBool::new(false);
        let stopped = || abort.load(Ordering::SeqCst) || cancel.is_cancelled();
        let mut failure = None;

        std::thread::scope(|s| {
            let (job_tx, job_rx) = crossbeam_channel::bounded(workers * 2);
            let (event_tx, event_rx) = crossbeam_channel::unbounded();

            s.spawn(move || {
                for i in 0..sources.len() {
                    if stopped() || job_tx.send(i).is_err() {
                        break;
                    }
                }
            });

            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let event_tx = event_tx.clone();
                let ids = &ids;
                s.spawn(move || {
                    for i in job_rx {
                        if stopped() {
                            break;
                        }
                        let _ = event_tx.send(Event::Started(i));
                        let out = self.process_isolated(&sources[i], &ids[i]);
                        if event_tx.send(Event::Finished(i, out)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(job_rx);
            drop(event_tx);

            let mut finished = 0;
            for event in event_rx {
                match event {
                    Event::Started(i) => {
                        report.items[i].state = ItemState::Processing;
                    }
                    Event::Finished(i, Ok((state, message))) => {
                        finished += 1;
                        let item = &mut report.items[i];
                        item.state = state;
                        item.message = message;
                        log::info!(
                            "[{finished}/{}] {}: {state}",
                            sources.len(),
                            item.id
                        );
                    }
                    Event::Finished(i, Err(e)) => {
                        report.items[i].state = ItemState::Pending;
                        log::error!("{}: {e}", report.items[i].id);
                        if failure.is_none() {
                            abort.store(true, Ordering::SeqCst);
                            failure = Some(e);
                        }
                    }
                }
            }
        });

        if let Some(e) = failure {
            return Err(e);
        }
        if cancel.is_cancelled() {
            log::warn!("run cancelled; {report}");
        } else {
            log::info!("run complete; {report}");
        }
        Ok(report)
    }

    /// Runs [`Pipeline::process`], turning a panic into [`ItemState::Failed`]
    fn process_isolated(
        &self,
        source: &Path,
        id: &str,
    ) -> Result<(ItemState, Option<String>), Error> {
        panic::catch_unwind(AssertUnwindSafe(|| self.process(source, id)))
            .unwrap_or_else(|payload| {
                let msg = match payload.downcast_ref::<&str>() {
                    Some(s) => (*s).to_owned(),
                    None => match payload.downcast_ref::<String>() {
                        Some(s) => s.clone(),
                        None => "unknown panic".to_owned(),
                    },
                };
                log::error!("{id}: panicked while processing: {msg}");
                Ok((ItemState::Failed, Some(format!("panicked: {msg}"))))
            })
    }

    /// Processes one mesh, applying the per-item error policy
    ///
    /// Returns an error only for systemic failures.
    pub fn process(
        &self,
        source: &Path,
        id: &str,
    ) -> Result<(ItemState, Option<String>), Error> {
        if self.layout.is_marked_bad(id) {
            return Ok((ItemState::SkippedBadMesh, None));
        }
        let missing: Vec<OutputKind> = self
            .requested()
            .filter(|k| !self.layout.artifact(id, *k).is_file())
            .collect();
        if missing.is_empty() {
            return Ok((ItemState::SkippedAlreadyDone, None));
        }
        match self.generate(source, id, &missing) {
            Ok(()) => Ok((ItemState::Done, None)),
            Err(e) if !e.is_item_error() => Err(e),
            Err(Error::BadMesh(reason)) => {
                log::warn!("{id}: bad mesh ({reason})");
                self.layout.mark_bad(id)?;
                Ok((ItemState::BadMesh, Some(reason)))
            }
            Err(e) => {
                log::warn!("{id}: {e}");
                Ok((ItemState::LoadFailed, Some(e.to_string())))
            }
        }
    }

    /// Builds and writes the missing artifacts for one mesh
    ///
    /// Nothing is written unless every artifact could be built.
    fn generate(
        &self,
        source: &Path,
        id: &str,
        missing: &[OutputKind],
    ) -> Result<(), Error> {
        let mut mesh = self.loader.load(source)?;
        let category = self.config.rotation.resolve(id);
        log::debug!(
            "{id}: {} vertices, {} triangles, category {}",
            mesh.vertices.len(),
            mesh.triangles.len(),
            category.tag
        );
        normalize(&mut mesh, &category.rotation())?;

        let sampler = SdfSampler::new(
            &mesh,
            &self.guard,
            &self.config.scan,
            &self.config.sign,
        )?;
        drop(mesh);

        let mut outputs = Vec::with_capacity(missing.len());
        for kind in missing {
            let (shape, data) = match kind {
                OutputKind::Cloud => {
                    let mut rng = StdRng::seed_from_u64(cloud_seed(
                        self.config.cloud.seed,
                        id,
                    ));
                    let cloud =
                        point_cloud(&sampler, &self.config.cloud, &mut rng)?;
                    (vec![cloud.len(), 4], cloud.to_rows())
                }
                OutputKind::Voxels => {
                    let grid = voxel_grid(&sampler, &self.config.voxels)?;
                    let r = grid.resolution as usize;
                    (vec![r, r, r], grid.values)
                }
            };
            outputs.push((*kind, shape, data));
        }
        for (kind, shape, data) in outputs {
            npy::write_f32(&self.layout.artifact(id, kind), &shape, &data)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(!ItemState::Pending.is_terminal());
        assert!(!ItemState::Processing.is_terminal());
        assert!(ItemState::Done.is_terminal());
        assert!(ItemState::LoadFailed.is_terminal());
        assert!(ItemState::Failed.is_terminal());
        assert_eq!(ItemState::SkippedBadMesh.to_string(), "SkippedBadMesh");
    }

    #[test]
    fn report_summary() {
        let item = |state| ItemReport {
            source: PathBuf::new(),
            id: String::new(),
            state,
            message: None,
        };
        let report = PipelineReport {
            items: vec![
                item(ItemState::Done),
                item(ItemState::Done),
                item(ItemState::BadMesh),
            ],
        };
        assert_eq!(report.count(ItemState::Done), 2);
        assert!(report.is_complete());
        assert_eq!(report.to_string(), "3 items: 2 Done, 1 BadMesh");
    }

    #[test]
    fn cancel_token_is_shared() {
        let a = CancelToken::new();
        let b = a.clone();
        assert!(!b.is_cancelled());
        a.cancel();
        assert!(b.is_cancelled());
    }
}
