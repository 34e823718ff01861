use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use env_logger::Env;
use log::{info, warn};

use sdfgen::{
    Config,
    pipeline::{
        CancelToken, ItemState, Pipeline, combine_clouds, combine_voxels,
    },
};

/// Signed distance field training data from a directory of meshes
#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(subcommand)]
    cmd: Command,

    /// TOML configuration file (defaults are used if omitted)
    #[clap(short, long)]
    config: Option<PathBuf>,

    #[clap(flatten)]
    overrides: Overrides,
}

#[derive(Subcommand)]
enum Command {
    /// Builds per-mesh voxel grids and point clouds, skipping finished items
    Run,

    /// Concatenates per-mesh artifacts into dataset-wide arrays
    Combine {
        /// Name of the combined voxel `.npy` file to write
        ///
        /// (defaults to `voxels-{resolution}.npy` in the output directory)
        #[clap(long)]
        voxels_out: Option<PathBuf>,
    },
}

/// Command-line values which take precedence over the configuration file
#[derive(Parser)]
struct Overrides {
    /// Root directory searched for meshes
    #[clap(short, long)]
    input: Option<PathBuf>,

    /// Root directory for artifacts
    #[clap(short, long)]
    output: Option<PathBuf>,

    /// Mesh file extension
    #[clap(short, long)]
    extension: Option<String>,

    /// Number of worker threads
    #[clap(short, long)]
    workers: Option<NonZeroUsize>,

    /// Voxel grid resolution
    #[clap(short, long)]
    resolution: Option<u32>,

    /// Points per cloud
    #[clap(short = 'n', long)]
    samples: Option<usize>,

    /// Skip voxel grids
    #[clap(long)]
    no_voxels: bool,

    /// Skip point clouds
    #[clap(long)]
    no_cloud: bool,
}

impl Overrides {
    fn apply(self, config: &mut Config) {
        if let Some(input) = self.input {
            config.paths.input = input;
        }
        if let Some(output) = self.output {
            config.paths.output = output;
        }
        if let Some(ext) = self.extension {
            config.paths.extension = ext;
        }
        if let Some(n) = self.workers {
            config.workers = n.get();
        }
        if let Some(r) = self.resolution {
            config.voxels.resolution = r;
        }
        if let Some(n) = self.samples {
            config.cloud.sample_count = n;
        }
        if self.no_voxels {
            config.voxels.enabled = false;
        }
        if self.no_cloud {
            config.cloud.enabled = false;
        }
    }
}

////////////////////////////////////////////////////////////////////////////////

static INTERRUPTS: AtomicUsize = AtomicUsize::new(0);

/// Counts a signal, returning `true` if an earlier one was already seen
fn is_repeat_signal(count: &AtomicUsize) -> bool {
    count.fetch_add(1, Ordering::SeqCst) > 0
}

extern "C" fn on_signal(_: libc::c_int) {
    if is_repeat_signal(&INTERRUPTS) {
        // Items in flight are abandoned
        #[cfg(unix)]
        unsafe {
            libc::_exit(130);
        }
    }
}

/// Routes SIGINT and SIGTERM to the returned token
///
/// The handler only sets a flag; a watcher thread forwards it to the token.
/// A second signal exits immediately.
fn cancel_on_signal() -> CancelToken {
    let token = CancelToken::new();
    #[cfg(unix)]
    unsafe {
        let handler = on_signal as extern "C" fn(libc::c_int);
        libc::signal(libc::SIGINT, handler as libc::sighandler_t);
        libc::signal(libc::SIGTERM, handler as libc::sighandler_t);
    }
    let t = token.clone();
    std::thread::spawn(move || {
        while INTERRUPTS.load(Ordering::SeqCst) == 0 {
            std::thread::sleep(Duration::from_millis(100));
        }
        warn!(
            "interrupted; finishing items in progress \
             (interrupt again to exit now)"
        );
        t.cancel();
    });
    token
}

////////////////////////////////////////////////////////////////////////////////

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    args.overrides.apply(&mut config);
    config.validate()?;

    match args.cmd {
        Command::Run => {
            let start = Instant::now();
            let cancel = cancel_on_signal();
            let pipeline = Pipeline::new(config)?;
            let report = pipeline.run(&cancel)?;
            info!("finished in {:?}: {report}", start.elapsed());

            let stats = pipeline.guard().stats();
            info!(
                "{} renders, max overlap {}",
                stats.renders, stats.max_overlap
            );
            for item in &report.items {
                if let (ItemState::LoadFailed | ItemState::Failed, Some(msg)) =
                    (item.state, &item.message)
                {
                    warn!("{}: {msg}", item.id);
                }
            }
            if cancel.is_cancelled() {
                bail!(
                    "cancelled with {} items pending; run again to resume",
                    report.count(ItemState::Pending)
                );
            }
        }
        Command::Combine { voxels_out } => {
            let pipeline = Pipeline::new(config)?;
            let config = pipeline.config();
            let layout = pipeline.layout();
            let sources = sdfgen::pipeline::enumerate(
                &config.paths.input,
                &config.paths.extension,
            )?;
            if config.voxels.enabled {
                let r = config.voxels.resolution;
                let out = voxels_out.unwrap_or_else(|| {
                    config.paths.output.join(format!("voxels-{r}.npy"))
                });
                let n = combine_voxels(layout, &sources, r, &out)?;
                info!("wrote {n} voxel grids to {}", out.display());
            }
            if config.cloud.enabled {
                let n = combine_clouds(
                    layout,
                    &sources,
                    config.cloud.sample_count,
                    &config.paths.output,
                )?;
                info!(
                    "wrote {n} point clouds to {}",
                    config.paths.output.display()
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn second_signal_is_a_repeat() {
        let count = AtomicUsize::new(0);
        assert!(!is_repeat_signal(&count));
        assert!(is_repeat_signal(&count));
        assert!(is_repeat_signal(&count));
    }

    #[test]
    fn flags_override_the_file() {
        let args = Args::try_parse_from([
            "sdfgen-cli",
            "--workers",
            "3",
            "-n",
            "500",
            "--no-voxels",
            "run",
        ])
        .unwrap();
        assert!(matches!(args.cmd, Command::Run));
        let mut config = Config::default();
        args.overrides.apply(&mut config);
        assert_eq!(config.workers, 3);
        assert_eq!(config.cloud.sample_count, 500);
        assert!(!config.voxels.enabled);
        assert!(config.cloud.enabled);
    }
}
