use std::process::ExitStatus;

/// Errors produced by the benchmark pipeline and drivers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("dimension mismatch: expected {expected} elements, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("image has an empty shape ({rows}, {cols})")]
    EmptyImage { rows: usize, cols: usize },
    #[error("scale factor {0} is outside (0, 1]")]
    InvalidScaleFactor(f64),
    #[error("n_clusters={n_clusters} must be between 1 and the number of pixels ({n_samples})")]
    InvalidClusterCount { n_clusters: usize, n_samples: usize },
    /// Compared sweeps reported different image size sequences.
    #[error("different image sizes cannot be handled: {expected:?} vs {found:?} ({label})")]
    MismatchedImageSizes {
        label: String,
        expected: Vec<String>,
        found: Vec<String>,
    },
    #[error("SVD did not converge")]
    SvdNotConverged,
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: ExitStatus,
        stderr: String,
    },
    #[error("benchmark output contains no record line")]
    MissingRecord,
    #[error("malformed benchmark record: {0}")]
    MalformedRecord(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Validation(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Image(#[from] image::ImageError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
