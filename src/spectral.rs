//! Spectral clustering of a precomputed affinity graph.
//!
//! The graph is embedded with the eigenvectors of the normalized Laplacian belonging to the
//! smallest eigenvalues. The embedding is then turned into labels by one of the strategies of
//! [`LabelAssignment`].

use crate::common::{BenchConfig, EigenConfig, LabelAssignment};
use crate::eigen::{largest_eigenpairs, NormalizedAdjacency};
use crate::error::{Error, Result};
use crate::graph::connected_components;
use crate::kmeans::{kmeans, KMeansOptions};
use crate::linalg::{norm, svd, to_dmatrix, Matrix};
use nalgebra::{DMatrix, DVector};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sprs::CsMat;
use tracing::{debug, warn};

const MAX_SVD_RESTARTS: usize = 30;
const MAX_DISCRETIZE_ITER: usize = 20;

/// Options for [`spectral_clustering`].
#[derive(Debug, Clone)]
pub struct SpectralOptions {
    pub n_clusters: usize,
    pub assign_labels: LabelAssignment,
    /// Seeds the eigensolver start vector and the label assignment.
    pub random_state: u64,
    /// k-means restarts, only used by [`LabelAssignment::KMeans`].
    pub n_init: usize,
    pub eigen: EigenConfig,
}

impl Default for SpectralOptions {
    fn default() -> Self {
        Self::from(&BenchConfig::default())
    }
}

impl From<&BenchConfig> for SpectralOptions {
    fn from(config: &BenchConfig) -> Self {
        Self {
            n_clusters: config.n_clusters,
            assign_labels: config.assign_labels,
            random_state: config.random_state,
            n_init: config.n_init,
            eigen: config.eigen.clone(),
        }
    }
}

/// Spectral embedding of a graph.
#[derive(Debug, Clone)]
pub struct SpectralEmbedding {
    /// One row per node, one column per eigenvector. Column 0 belongs to the smallest
    /// Laplacian eigenvalue.
    pub maps: Matrix,
    /// Eigenvalues of the normalized Laplacian, ascending.
    pub laplacian_eigenvalues: Vec<f64>,
    pub converged: bool,
}

/// Embeds the nodes of `graph` into `n_components` dimensions.
///
/// The eigenvectors are scaled back by `D^-1/2` and their signs fixed so that the entry with the
/// largest magnitude is positive.
pub fn spectral_embedding<R: Rng>(
    graph: &CsMat<f64>,
    n_components: usize,
    eigen: &EigenConfig,
    rng: &mut R,
) -> Result<SpectralEmbedding> {
    let n = graph.rows();
    if n_components == 0 || n_components > n {
        return Err(Error::InvalidClusterCount {
            n_clusters: n_components,
            n_samples: n,
        });
    }
    let components = connected_components(graph);
    if components > 1 {
        warn!(
            components,
            "graph is not fully connected, spectral embedding may not work as expected"
        );
    }
    let op = NormalizedAdjacency::new(graph)?;
    let pairs = largest_eigenpairs(&op, n_components, eigen, rng);
    debug!(
        restarts = pairs.restarts,
        converged = pairs.converged,
        "spectral embedding computed"
    );

    let mut maps = Matrix::from_fn(n_components, n, |x, y| pairs.vectors[x][y] / op.sqrt_degree[y]);
    for col in 0..n_components {
        let (mut arg, mut max) = (0, 0.0);
        for row in 0..n {
            if maps[(col, row)].abs() > max {
                max = maps[(col, row)].abs();
                arg = row;
            }
        }
        if maps[(col, arg)] < 0.0 {
            for row in 0..n {
                maps[(col, row)] = -maps[(col, row)];
            }
        }
    }
    Ok(SpectralEmbedding {
        maps,
        laplacian_eigenvalues: pairs.values.iter().map(|v| 1.0 - v).collect(),
        converged: pairs.converged,
    })
}

/// Segments the nodes of an affinity graph into `options.n_clusters` groups.
///
/// The graph must be symmetric with non-negative weights. Diagonal entries are ignored.
pub fn spectral_clustering(graph: &CsMat<f64>, options: &SpectralOptions) -> Result<Vec<usize>> {
    let n = graph.rows();
    if options.n_clusters == 0 || options.n_clusters > n {
        return Err(Error::InvalidClusterCount {
            n_clusters: options.n_clusters,
            n_samples: n,
        });
    }
    let mut rng = ChaCha8Rng::seed_from_u64(options.random_state);
    let embedding = spectral_embedding(graph, options.n_clusters, &options.eigen, &mut rng)?;
    match options.assign_labels {
        LabelAssignment::KMeans => {
            let kmeans_options = KMeansOptions {
                n_clusters: options.n_clusters,
                n_init: options.n_init,
                ..KMeansOptions::default()
            };
            Ok(kmeans(&embedding.maps, &kmeans_options, &mut rng)?.labels)
        }
        LabelAssignment::Discretize => discretize(&embedding.maps, &mut rng),
        LabelAssignment::ClusterQr => cluster_qr(&embedding.maps),
    }
}

fn argmax<'a>(values: impl IntoIterator<Item = &'a f64>) -> usize {
    values
        .into_iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (i, v)| if *v > best.1 { (i, *v) } else { best })
        .0
}

/// Finds the discrete partition closest to the embedding.
///
/// Alternates between labelling every row by its largest rotated coordinate and solving for the
/// rotation that best aligns the embedding with that partition. Restarts from a new random
/// rotation when the SVD fails.
pub fn discretize<R: Rng>(vectors: &Matrix, rng: &mut R) -> Result<Vec<usize>> {
    let (n, k) = (vectors.height, vectors.width);
    let mut vectors = to_dmatrix(vectors);

    let norm_ones = (n as f64).sqrt();
    for mut column in vectors.column_iter_mut() {
        let nrm = column.norm();
        let sign = if column[0] == 0.0 { 1.0 } else { -column[0].signum() };
        let factor = if nrm > 0.0 { sign * norm_ones / nrm } else { sign };
        column *= factor;
    }
    for mut row in vectors.row_iter_mut() {
        let nrm = row.norm();
        if nrm > 0.0 {
            row /= nrm;
        }
    }

    let mut labels = vec![0; n];
    for restart in 0..MAX_SVD_RESTARTS {
        // initial rotation from mutually far apart rows
        let mut rotation = DMatrix::<f64>::zeros(k, k);
        rotation.set_column(0, &vectors.row(rng.gen_range(0..n)).transpose());
        let mut c = DVector::<f64>::zeros(n);
        for col in 1..k {
            c += (&vectors * rotation.column(col - 1)).abs();
            let pick = c
                .iter()
                .enumerate()
                .fold((0, f64::INFINITY), |best, (i, v)| if *v < best.1 { (i, *v) } else { best })
                .0;
            rotation.set_column(col, &vectors.row(pick).transpose());
        }

        let mut last_objective = 0.0;
        let mut n_iter = 0;
        loop {
            n_iter += 1;
            let rotated = &vectors * &rotation;
            for (label, row) in labels.iter_mut().zip(rotated.row_iter()) {
                *label = argmax(row.iter());
            }
            // partition matrix transposed times embedding
            let mut t_svd = DMatrix::<f64>::zeros(k, k);
            for (label, row) in labels.iter().zip(vectors.row_iter()) {
                let mut target = t_svd.row_mut(*label);
                target += row;
            }
            let decomposition = match svd(t_svd) {
                Ok(decomposition) => decomposition,
                Err(_) => {
                    debug!(restart, "SVD did not converge, randomizing and trying again");
                    break;
                }
            };
            let ncut = 2.0 * (n as f64 - decomposition.s.sum());
            if (ncut - last_objective).abs() < f64::EPSILON || n_iter > MAX_DISCRETIZE_ITER {
                return Ok(labels);
            }
            last_objective = ncut;
            rotation = decomposition.vt.transpose() * decomposition.u.transpose();
        }
    }
    Err(Error::SvdNotConverged)
}

/// Labels the embedding with a column-pivoted QR.
///
/// The `k` pivot rows span the embedding best. Every row is assigned to the pivot direction it
/// is most aligned with after an orthogonal polar alignment.
pub fn cluster_qr(vectors: &Matrix) -> Result<Vec<usize>> {
    let (n, k) = (vectors.height, vectors.width);
    if k > n {
        return Err(Error::InvalidClusterCount {
            n_clusters: k,
            n_samples: n,
        });
    }
    let mut residual = vectors.clone();
    let mut norms: Vec<f64> = (0..n).map(|row| norm(residual.get_row(row)).powi(2)).collect();
    let mut pivots = Vec::with_capacity(k);
    for _ in 0..k {
        let pivot = norms
            .iter()
            .enumerate()
            .filter(|(i, _)| !pivots.contains(i))
            .fold((0, f64::NEG_INFINITY), |best, (i, v)| if *v > best.1 { (i, *v) } else { best })
            .0;
        pivots.push(pivot);
        let q: Vec<f64> = {
            let row = residual.get_row(pivot);
            let nrm = norm(row);
            if nrm > 0.0 {
                row.iter().map(|v| v / nrm).collect()
            } else {
                vec![0.0; k]
            }
        };
        for row in 0..n {
            let r = residual.get_row_mut(row);
            let proj: f64 = r.iter().zip(&q).map(|(a, b)| a * b).sum();
            r.iter_mut().zip(&q).for_each(|(a, b)| *a -= proj * b);
            norms[row] = r.iter().map(|v| v * v).sum();
        }
    }
    // pivot rows, transposed
    let pivot_block = DMatrix::from_fn(k, k, |row, col| vectors[(row, pivots[col])]);
    let decomposition = svd(pivot_block)?;
    let alignment = decomposition.u * decomposition.vt;
    let aligned = to_dmatrix(vectors) * alignment;
    Ok(aligned
        .row_iter()
        .map(|row| argmax(row.abs().iter()))
        .collect())
}
