use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::path::{Path, PathBuf};

/// How the continuous spectral embedding is turned into discrete labels.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelAssignment {
    /// Yu and Shi discretization: search for the closest partition matrix by alternating
    /// argmax labelling and an orthogonal rotation obtained from an SVD.
    Discretize,
    /// k-means on the rows of the embedding. Depends on the random initialization.
    KMeans,
    ClusterQr,
}

impl LabelAssignment {
    pub fn as_str(&self) -> &'static str {
        match self {
            LabelAssignment::Discretize => "discretize",
            LabelAssignment::KMeans => "kmeans",
            LabelAssignment::ClusterQr => "cluster_qr",
        }
    }
}

/// How samples outside of the image are resolved by filters and interpolation.
///
/// Names follow `scipy.ndimage`. Note that what scikit-image calls `reflect` is [`PadMode::Mirror`]
/// here.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PadMode {
    /// `d c b a | a b c d | d c b a`, the edge sample is repeated.
    Reflect,
    /// `d c b | a b c d | c b a`, reflection about the edge sample.
    Mirror,
    Nearest,
    Wrap,
    Constant,
}

/// Parameters of the eigensolver used by the spectral embedding.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EigenConfig {
    /// Relative residual `||A y - θ y|| / max(|θ|, 1)` under which an eigenpair counts as
    /// converged.
    pub tol: f64,
    pub max_restarts: usize,
    /// Size of the search subspace. `None` uses `max(2 * k + 1, 20)`, capped by the number of
    /// pixels.
    pub krylov_dim: Option<usize>,
    /// Degree of the Chebyshev filter applied after the first cycle. 0 or 1 disables it.
    pub chebyshev_degree: usize,
}

impl Default for EigenConfig {
    fn default() -> Self {
        Self {
            tol: 1e-5,
            max_restarts: 500,
            krylov_dim: None,
            chebyshev_degree: 12,
        }
    }
}

/// Main config for one benchmark sweep.
///
/// All pipeline constants live here and the value is passed explicitly to every call, so two
/// sweeps in the same process never observe each other's settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// Decay of the edge weights, `exp(-beta * gradient / std(gradient))`.
    ///
    /// The smaller beta is, the more independent the segmentation is of the actual image. For
    /// beta = 1 the segmentation is close to a Voronoi partition.
    pub beta: f64,
    /// Added to every edge weight so the graph stays connected.
    pub eps: f64,
    /// Smoothing before downscaling, reduces aliasing artifacts.
    pub sigma: f64,
    pub truncate: f64,
    pub n_clusters: usize,
    pub assign_labels: LabelAssignment,
    /// Seed for the eigensolver start vector and the label assignment.
    pub random_state: u64,
    /// Number of k-means restarts, used only with [`LabelAssignment::KMeans`].
    pub n_init: usize,
    /// Scale factors in `(0, 1]`, one pipeline run each, in this order.
    pub resize_proportions: Vec<f64>,
    pub filter_mode: PadMode,
    pub rescale_mode: PadMode,
    /// Gaussian pre-filter inside `rescale`. Off because the image is already smoothed.
    pub anti_aliasing: bool,
    pub show_progress: bool,
    pub eigen: EigenConfig,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            beta: 10.0,
            eps: 1e-6,
            sigma: 2.0,
            truncate: 4.0,
            n_clusters: 25,
            assign_labels: LabelAssignment::Discretize,
            random_state: 42,
            n_init: 10,
            resize_proportions: vec![0.05, 0.1, 0.2, 0.4, 0.6, 0.8, 1.0],
            filter_mode: PadMode::Reflect,
            rescale_mode: PadMode::Mirror,
            anti_aliasing: false,
            show_progress: true,
            eigen: EigenConfig::default(),
        }
    }
}

impl BenchConfig {
    pub fn validate(&self) -> Result<()> {
        for proportion in &self.resize_proportions {
            check_scale_factor(*proportion)?;
        }
        if self.n_clusters == 0 {
            return Err(Error::Validation("n_clusters must be at least 1".into()));
        }
        if !(self.sigma >= 0.0) || !(self.truncate > 0.0) {
            return Err(Error::Validation(format!(
                "sigma={} and truncate={} must be non-negative and positive",
                self.sigma, self.truncate
            )));
        }
        if self.assign_labels == LabelAssignment::KMeans && self.n_init == 0 {
            return Err(Error::Validation("n_init must be at least 1".into()));
        }
        if !(self.eigen.tol > 0.0) {
            return Err(Error::Validation("eigen.tol must be positive".into()));
        }
        Ok(())
    }

    /// Copy of this config without the last `n` scale factors.
    pub fn without_last_proportions(&self, n: usize) -> Self {
        let mut config = self.clone();
        let keep = config.resize_proportions.len().saturating_sub(n);
        config.resize_proportions.truncate(keep);
        config
    }
}

/// Every command is an argv list, `{version}` is substituted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VersionSweepConfig {
    pub package: String,
    pub versions: Vec<String>,
    pub install_command: Vec<String>,
    /// Command running one sweep in a fresh process. Its last stdout line must be a record.
    pub bench_command: Vec<String>,
    /// The child sweep skips this many of the largest scale factors to shorten the run.
    pub drop_last_proportions: usize,
}

impl Default for VersionSweepConfig {
    fn default() -> Self {
        let package = "sprs".to_string();
        Self {
            install_command: ["cargo", "update", "--package", package.as_str(), "--precise", "{version}"]
                .into_iter()
                .map(String::from)
                .collect(),
            package,
            versions: vec!["0.11.0".into(), "0.11.1".into(), "0.11.2".into()],
            bench_command: ["cargo", "run", "--release", "--quiet", "--", "sweep", "--emit-record"]
                .into_iter()
                .map(String::from)
                .collect(),
            drop_last_proportions: 4,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub bench: BenchConfig,
    pub versions: VersionSweepConfig,
    /// Where the comparison plot is written. No plot file without it.
    pub artifacts_dir: Option<PathBuf>,
    /// Leading samples left out of the comparison plot (the first run includes warm-up).
    pub plot_skip_first: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bench: BenchConfig::default(),
            versions: VersionSweepConfig::default(),
            artifacts_dir: None,
            plot_skip_first: 1,
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(contents)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Validation(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        self.bench.validate()?;
        if self.versions.install_command.is_empty() || self.versions.bench_command.is_empty() {
            return Err(Error::Validation(
                "install_command and bench_command must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Scale factors must lie in `(0, 1]`.
pub fn check_scale_factor(proportion: f64) -> Result<()> {
    if proportion > 0.0 && proportion <= 1.0 {
        Ok(())
    } else {
        Err(Error::InvalidScaleFactor(proportion))
    }
}

pub(crate) fn split_length_to_ranges(length: usize, splits: usize) -> Vec<Range<usize>> {
    let splits = splits.max(1);
    let chunk_size = length / splits;
    let rem = length % splits;
    (0..splits)
        .scan((rem, 0usize), |(r, acc), _split| {
            let mut size = chunk_size;
            if *r > 0 {
                *r -= 1;
                size += 1;
            }
            let out = (*acc, *acc + size);
            *acc += size;
            Some(out.0..out.1)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_benchmark_constants() {
        let config = BenchConfig::default();
        assert_eq!(config.beta, 10.0);
        assert_eq!(config.eps, 1e-6);
        assert_eq!(config.n_clusters, 25);
        assert_eq!(config.assign_labels, LabelAssignment::Discretize);
        assert_eq!(config.random_state, 42);
        assert_eq!(
            config.resize_proportions,
            vec![0.05, 0.1, 0.2, 0.4, 0.6, 0.8, 1.0]
        );
        config.validate().unwrap();
    }

    #[test]
    fn scale_factor_outside_unit_interval_is_rejected() {
        for bad in [0.0, -0.5, 1.5, f64::NAN] {
            let config = BenchConfig {
                resize_proportions: vec![0.1, bad],
                ..BenchConfig::default()
            };
            assert!(matches!(
                config.validate(),
                Err(Error::InvalidScaleFactor(_))
            ));
        }
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let settings = Settings::from_toml(
            r#"
            plot_skip_first = 0
            [bench]
            n_clusters = 4
            assign_labels = "cluster_qr"
            [versions]
            versions = ["0.11.1"]
            "#,
        )
        .unwrap();
        assert_eq!(settings.bench.n_clusters, 4);
        assert_eq!(settings.bench.assign_labels, LabelAssignment::ClusterQr);
        assert_eq!(settings.bench.beta, 10.0);
        assert_eq!(settings.versions.versions, vec!["0.11.1".to_string()]);
        assert_eq!(settings.versions.package, "sprs");
        assert_eq!(settings.plot_skip_first, 0);
    }

    #[test]
    fn default_settings_round_trip_through_toml() {
        let settings = Settings {
            artifacts_dir: Some("artifacts".into()),
            ..Settings::default()
        };
        let text = settings.to_toml().unwrap();
        assert_eq!(Settings::from_toml(&text).unwrap(), settings);
    }

    #[test]
    fn unknown_label_assignment_is_a_config_error() {
        let err = Settings::from_toml("[bench]\nassign_labels = \"amg\"\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn without_last_proportions_truncates() {
        let config = BenchConfig::default().without_last_proportions(4);
        assert_eq!(config.resize_proportions, vec![0.05, 0.1, 0.2]);
        let empty = BenchConfig::default().without_last_proportions(100);
        assert!(empty.resize_proportions.is_empty());
    }

    #[test]
    fn split_ranges_cover_length() {
        let ranges = split_length_to_ranges(10, 3);
        assert_eq!(ranges, vec![0..4, 4..7, 7..10]);
        assert_eq!(split_length_to_ranges(2, 4).iter().map(|r| r.len()).sum::<usize>(), 2);
    }
}
