//! Command line driver of the spectral segmentation benchmarks.
//!
//! ```bash
//! # serial against rayon backend, chart written to artifacts/cpu_vs_rayon.svg
//! spectral-bench compare --artifacts artifacts
//!
//! # one backend, record line on stdout for a parent process
//! spectral-bench sweep --backend cpu --emit-record --drop-last 4
//!
//! # every configured dependency version in a fresh process
//! spectral-bench --config bench.toml versions --output versions.jsonl
//!
//! # labels of one run as a PNG overlay
//! spectral-bench segment --scale 0.2 --output coins.png
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use spectral_bench::arrays::Image;
use spectral_bench::backend::{BackendKind, ParallelBackend, SerialBackend};
use spectral_bench::common::Settings;
use spectral_bench::pipeline::{run_both, run_segmentation_performance, segmentation};
use spectral_bench::report::{
    render_segmentation, render_version_table, write_jsonl, SweepRecord, RECORD_SEPARATOR,
};
use spectral_bench::sample::{coins, load_grayscale};
use spectral_bench::versions::{run_version_sweep, CommandExecutor, CommandInstaller};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "spectral-bench")]
#[command(about = "Benchmark spectral image segmentation across scales, backends and versions")]
#[command(version)]
struct Cli {
    /// TOML settings file. Missing keys keep their defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Size of the rayon thread pool (defaults to the number of cores)
    #[arg(long, global = true)]
    threads: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sweep the serial and the rayon backend and plot both
    Compare {
        /// Directory for the comparison chart
        #[arg(long)]
        artifacts: Option<PathBuf>,
        /// Grayscale input instead of the built-in coins sample
        #[arg(long)]
        image: Option<PathBuf>,
    },
    /// Sweep all scale factors with one backend
    Sweep {
        #[arg(long, value_enum, default_value = "cpu")]
        backend: BackendKind,
        /// Print a separator and a JSON record as the last stdout lines
        #[arg(long)]
        emit_record: bool,
        /// Skip this many of the largest scale factors
        #[arg(long, default_value_t = 0)]
        drop_last: usize,
        #[arg(long)]
        image: Option<PathBuf>,
    },
    /// Pin every configured dependency version and sweep it in a fresh process
    Versions {
        /// Also write the records as JSON lines
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Segment the image at one scale and save the labels as an overlay
    Segment {
        #[arg(long, default_value_t = 0.2)]
        scale: f64,
        #[arg(long, value_enum, default_value = "cpu")]
        backend: BackendKind,
        #[arg(long)]
        output: PathBuf,
        #[arg(long)]
        image: Option<PathBuf>,
    },
    /// Print the default settings as TOML
    Config,
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_image(path: Option<&Path>) -> Result<Image> {
    match path {
        Some(path) => load_grayscale(path)
            .with_context(|| format!("failed to load image {}", path.display())),
        None => Ok(coins()),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("failed to configure the rayon thread pool")?;
    }

    let settings = match &cli.config {
        Some(path) => Settings::load(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => Settings::default(),
    };

    match cli.command {
        Commands::Compare { artifacts, image } => {
            let image = load_image(image.as_deref())?;
            let artifacts = artifacts.or_else(|| settings.artifacts_dir.clone());
            let plot = run_both(
                &[&SerialBackend, &ParallelBackend],
                &image,
                &settings.bench,
                settings.plot_skip_first,
                artifacts.as_deref(),
            )?;
            match plot.path {
                Some(path) => println!("{}", path.display()),
                None => print!("{}", plot.svg),
            }
        }
        Commands::Sweep {
            backend,
            emit_record,
            drop_last,
            image,
        } => {
            let image = load_image(image.as_deref())?;
            let config = settings.bench.without_last_proportions(drop_last);
            let backend = backend.create();
            let result = run_segmentation_performance(backend.as_ref(), &image, &config)?;
            if emit_record {
                let record = SweepRecord::new(backend.name(), result);
                println!("{RECORD_SEPARATOR}");
                println!("{}", record.to_line()?);
            } else {
                for (size, time) in result.sizes.iter().zip(&result.times) {
                    println!("{size}\t{time:.4}");
                }
            }
        }
        Commands::Versions { output } => {
            let versions = &settings.versions;
            let mut installer = CommandInstaller::new(versions.install_command.clone());
            let mut executor = CommandExecutor::from_config(versions, cli.config.as_deref());
            let records = run_version_sweep(&versions.versions, &mut installer, &mut executor)
                .with_context(|| format!("version sweep of {} failed", versions.package))?;
            print!("{}", render_version_table(&records));
            if let Some(path) = output {
                write_jsonl(&records, &path)?;
                info!(path = %path.display(), "records written");
            }
        }
        Commands::Segment {
            scale,
            backend,
            output,
            image,
        } => {
            let image = load_image(image.as_deref())?;
            let backend = backend.create();
            let run = segmentation(backend.as_ref(), &image, &settings.bench, scale)?;
            info!(
                "Spectral clustering via {}: {}, {:.2}s",
                backend.name(),
                settings.bench.assign_labels.as_str(),
                run.elapsed
            );
            render_segmentation(&run.rescaled, &run.labels, settings.bench.n_clusters, &output)?;
            println!("{}", output.display());
        }
        Commands::Config => {
            print!("{}", Settings::default().to_toml()?);
        }
    }
    Ok(())
}
