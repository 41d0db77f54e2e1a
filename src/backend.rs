//! Array backends the pipeline is generic over.
//!
//! A backend is a capability set: array conversion, the element-wise and reduction operations
//! used to reweight the graph, the smoothing filter and the sparse matrix constructor. The
//! pipeline only talks to [`ArrayBackend`], so a new implementation only has to provide these
//! operations.

use crate::arrays::Image;
use crate::common::{split_length_to_ranges, PadMode};
use crate::filters::{gaussian_filter, par_gaussian_filter};
use crate::graph::CooGraph;
use rayon::current_num_threads;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sprs::CsMat;

pub trait ArrayBackend: Send + Sync {
    /// Label used in logs, records and plot legends.
    fn name(&self) -> &'static str;

    /// Copies `values` into an array owned by the backend.
    fn asarray(&self, values: &[f64]) -> Vec<f64>;

    /// Element-wise `exp`.
    fn exp(&self, values: &mut [f64]);

    /// Element-wise `values * mul + add`.
    fn affine(&self, values: &mut [f64], mul: f64, add: f64);

    /// Population standard deviation.
    fn std(&self, values: &[f64]) -> f64;

    fn gaussian_filter(&self, image: &Image, sigma: f64, mode: PadMode, truncate: f64) -> Image;

    /// Sparse matrix constructor for the similarity graph.
    fn sparse(&self, graph: &CooGraph) -> CsMat<f64> {
        graph.to_csr()
    }
}

/// Selects a backend from the command line or a config file.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Single-threaded reference backend.
    Cpu,
    /// Data-parallel backend running on the rayon thread pool.
    Rayon,
}

impl BackendKind {
    pub fn create(self) -> Box<dyn ArrayBackend> {
        match self {
            BackendKind::Cpu => Box::new(SerialBackend),
            BackendKind::Rayon => Box::new(ParallelBackend),
        }
    }
}

/// Plain iterator implementation on the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialBackend;

impl ArrayBackend for SerialBackend {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn asarray(&self, values: &[f64]) -> Vec<f64> {
        values.to_vec()
    }

    fn exp(&self, values: &mut [f64]) {
        values.iter_mut().for_each(|v| *v = v.exp());
    }

    fn affine(&self, values: &mut [f64], mul: f64, add: f64) {
        values.iter_mut().for_each(|v| *v = *v * mul + add);
    }

    fn std(&self, values: &[f64]) -> f64 {
        if values.is_empty() {
            return f64::NAN;
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
        var.sqrt()
    }

    fn gaussian_filter(&self, image: &Image, sigma: f64, mode: PadMode, truncate: f64) -> Image {
        gaussian_filter(image, sigma, mode, truncate)
    }
}

/// Runs every operation data-parallel on the rayon pool.
///
/// Reductions are split into one fixed chunk per thread and the partial sums are combined in
/// chunk order, so the result only depends on the number of threads.
#[derive(Debug, Default, Clone, Copy)]
pub struct ParallelBackend;

impl ParallelBackend {
    fn chunked_sum<F>(values: &[f64], f: F) -> f64
    where
        F: Fn(f64) -> f64 + Sync,
    {
        let ranges = split_length_to_ranges(values.len(), current_num_threads());
        let partial: Vec<f64> = ranges
            .into_par_iter()
            .map(|range| values[range].iter().map(|v| f(*v)).sum::<f64>())
            .collect();
        partial.into_iter().sum()
    }
}

impl ArrayBackend for ParallelBackend {
    fn name(&self) -> &'static str {
        "rayon"
    }

    fn asarray(&self, values: &[f64]) -> Vec<f64> {
        values.par_iter().copied().collect()
    }

    fn exp(&self, values: &mut [f64]) {
        values.par_iter_mut().for_each(|v| *v = v.exp());
    }

    fn affine(&self, values: &mut [f64], mul: f64, add: f64) {
        values.par_iter_mut().for_each(|v| *v = *v * mul + add);
    }

    fn std(&self, values: &[f64]) -> f64 {
        if values.is_empty() {
            return f64::NAN;
        }
        let n = values.len() as f64;
        let mean = Self::chunked_sum(values, |v| v) / n;
        let var = Self::chunked_sum(values, |v| (v - mean) * (v - mean)) / n;
        var.sqrt()
    }

    fn gaussian_filter(&self, image: &Image, sigma: f64, mode: PadMode, truncate: f64) -> Image {
        par_gaussian_filter(image, sigma, mode, truncate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backends() -> Vec<Box<dyn ArrayBackend>> {
        vec![BackendKind::Cpu.create(), BackendKind::Rayon.create()]
    }

    #[test]
    fn std_is_population_std() {
        for backend in backends() {
            let std = backend.std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
            assert!((std - 2.0).abs() < 1e-12, "{}: {std}", backend.name());
            assert!(backend.std(&[]).is_nan());
        }
    }

    #[test]
    fn elementwise_ops_agree() {
        let values: Vec<f64> = (0..1000).map(|i| (i as f64 * 0.37).sin()).collect();
        let results: Vec<Vec<f64>> = backends()
            .iter()
            .map(|backend| {
                let mut a = backend.asarray(&values);
                backend.affine(&mut a, -2.0, 0.5);
                backend.exp(&mut a);
                a
            })
            .collect();
        assert_eq!(results[0], results[1]);
        assert!((results[0][0] - 0.5f64.exp()).abs() < 1e-15);
    }

    #[test]
    fn names_are_distinct() {
        let names: Vec<_> = backends().iter().map(|b| b.name()).collect();
        assert_eq!(names, vec!["cpu", "rayon"]);
    }

    #[test]
    fn backend_kind_parses_from_toml_string() {
        #[derive(Deserialize)]
        struct Wrapper {
            backend: BackendKind,
        }
        let parsed: Wrapper = toml::from_str("backend = \"rayon\"").unwrap();
        assert_eq!(parsed.backend, BackendKind::Rayon);
    }
}
