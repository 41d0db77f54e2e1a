//! Benchmark drivers: one pipeline run per scale factor and the multi-scale sweep.

use crate::arrays::{Image, ImageShape};
use crate::backend::ArrayBackend;
use crate::common::{check_scale_factor, BenchConfig};
use crate::error::Result;
use crate::graph::{img_to_graph, CooGraph};
use crate::report::{plot_performance, BackendSeries, PerformancePlot};
use crate::spectral::{spectral_clustering, SpectralOptions};
use crate::transform::rescale;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use sprs::CsMat;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

/// Outcome of one pipeline run.
#[derive(Debug, Clone)]
pub struct SegmentationRun {
    /// Wall-clock seconds spent in spectral clustering only.
    pub elapsed: f64,
    /// Shape of the rescaled image the graph was built from.
    pub shape: ImageShape,
    pub labels: Vec<usize>,
    pub rescaled: Image,
}

/// Timings and image sizes of a sweep, in scale factor order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepResult {
    pub times: Vec<f64>,
    pub sizes: Vec<String>,
}

/// Smooths, rescales and turns the image into a similarity graph with gradient weights.
///
/// `resize_proportion` must lie in `(0, 1]`.
pub fn create_image_graph(
    backend: &dyn ArrayBackend,
    image: &Image,
    config: &BenchConfig,
    resize_proportion: f64,
) -> Result<(Image, CooGraph)> {
    check_scale_factor(resize_proportion)?;
    let smoothed = backend.gaussian_filter(image, config.sigma, config.filter_mode, config.truncate);
    let rescaled = rescale(
        &smoothed,
        resize_proportion,
        config.rescale_mode,
        config.anti_aliasing,
    )?;
    let graph = img_to_graph(&rescaled);
    Ok((rescaled, graph))
}

/// Replaces the gradient weights with `exp(-beta * w / std(w)) + eps`.
///
/// The standard deviation is taken over every stored entry, diagonal included. A graph whose
/// entries are all equal keeps a unit scale.
pub fn set_graph_data(backend: &dyn ArrayBackend, graph: &mut CooGraph, beta: f64, eps: f64) {
    let mut data = backend.asarray(&graph.data);
    let std = backend.std(&data);
    let std = if std > 0.0 && std.is_finite() { std } else { 1.0 };
    backend.affine(&mut data, -beta / std, 0.0);
    backend.exp(&mut data);
    backend.affine(&mut data, 1.0, eps);
    graph.data = data;
}

/// Builds the weighted graph in the backend's sparse format.
pub fn weighted_graph(
    backend: &dyn ArrayBackend,
    image: &Image,
    config: &BenchConfig,
    resize_proportion: f64,
) -> Result<(Image, CsMat<f64>)> {
    let (rescaled, mut graph) = create_image_graph(backend, image, config, resize_proportion)?;
    set_graph_data(backend, &mut graph, config.beta, config.eps);
    debug!(nodes = graph.n_nodes, nnz = graph.nnz(), "similarity graph built");
    Ok((rescaled, backend.sparse(&graph)))
}

/// Runs the whole pipeline at one scale factor, timing only the clustering.
pub fn segmentation(
    backend: &dyn ArrayBackend,
    image: &Image,
    config: &BenchConfig,
    resize_proportion: f64,
) -> Result<SegmentationRun> {
    info!(
        backend = backend.name(),
        resize_proportion, "running spectral segmentation"
    );
    let (rescaled, graph) = weighted_graph(backend, image, config, resize_proportion)?;
    let options = SpectralOptions::from(config);
    let start = Instant::now();
    let labels = spectral_clustering(&graph, &options)?;
    let elapsed = start.elapsed().as_secs_f64();
    info!(
        backend = backend.name(),
        shape = %rescaled.shape(),
        elapsed,
        "segmentation finished"
    );
    Ok(SegmentationRun {
        elapsed,
        shape: rescaled.shape(),
        labels,
        rescaled,
    })
}

/// Runs [`segmentation`] once per scale factor of the config, sequentially and in order.
pub fn run_segmentation_performance(
    backend: &dyn ArrayBackend,
    image: &Image,
    config: &BenchConfig,
) -> Result<SweepResult> {
    let progress = if config.show_progress {
        ProgressBar::new(config.resize_proportions.len() as u64)
    } else {
        ProgressBar::hidden()
    };
    if let Ok(style) = ProgressStyle::with_template("{prefix} [{bar:30}] {pos}/{len} {elapsed}") {
        progress.set_style(style);
    }
    progress.set_prefix(backend.name());

    let mut result = SweepResult::default();
    for proportion in &config.resize_proportions {
        let run = segmentation(backend, image, config, *proportion)?;
        result.times.push(run.elapsed);
        result.sizes.push(run.shape.to_string());
        progress.inc(1);
    }
    progress.finish_and_clear();
    Ok(result)
}

/// Sweeps every backend in turn and plots their timings against each other.
///
/// The first `skip_first` samples of each sweep are left out of the chart.
pub fn run_both(
    backends: &[&dyn ArrayBackend],
    image: &Image,
    config: &BenchConfig,
    skip_first: usize,
    artifacts_path: Option<&Path>,
) -> Result<PerformancePlot> {
    let mut series = Vec::with_capacity(backends.len());
    for backend in backends {
        let result = run_segmentation_performance(*backend, image, config)?;
        series.push(
            BackendSeries {
                label: backend.name().to_string(),
                times: result.times,
                sizes: result.sizes,
            }
            .skip_first(skip_first),
        );
    }
    plot_performance(&series, artifacts_path)
}
