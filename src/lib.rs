//! Spectral image segmentation benchmarks in Rust.
//!
//! The benchmarked pipeline smooths a grayscale image, downscales it, builds a pixel similarity
//! graph with gradient weights `exp(-beta * gradient / std) + eps` and segments it with spectral
//! clustering. Only the clustering step is timed. On top of the pipeline sit three drivers:
//!
//! * a sweep over scale factors for one array backend ([`pipeline::run_segmentation_performance`]),
//! * a comparison of two backends rendered as an SVG chart ([`pipeline::run_both`]),
//! * a sweep over versions of a dependency, each benchmarked in a fresh process
//!   ([`versions::run_version_sweep`]).
//!
//! The following example runs one sweep on the built-in sample image:
//!
//! ```rust,no_run
//! use spectral_bench::backend::ParallelBackend;
//! use spectral_bench::common::BenchConfig;
//! use spectral_bench::pipeline::run_segmentation_performance;
//! use spectral_bench::sample::coins;
//!
//! fn main() -> spectral_bench::Result<()> {
//!     let image = coins();
//!     // only the three smallest scales
//!     let config = BenchConfig::default().without_last_proportions(4);
//!     let result = run_segmentation_performance(&ParallelBackend, &image, &config)?;
//!     for (size, time) in result.sizes.iter().zip(&result.times) {
//!         println!("{size}: {time:.3}s");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! Backends implement [`backend::ArrayBackend`]. [`backend::SerialBackend`] is the plain
//! reference, [`backend::ParallelBackend`] runs every operation on the rayon thread pool. The
//! eigensolver and the k-means assignment use rayon regardless of the backend, so set the pool
//! size when comparing against a single core.
//!
//! It's strongly recommended to use this in release build. The union-find used by the
//! connectivity check uses the `assume!` macro to avoid bounds checks in release builds.

pub mod arrays;
pub mod backend;
pub mod common;
pub mod eigen;
pub mod error;
pub mod filters;
pub mod graph;
pub mod kmeans;
pub mod linalg;
pub mod pipeline;
pub mod report;
pub mod sample;
pub mod spectral;
pub mod transform;
pub mod versions;

pub use error::{Error, Result};
