//! Largest eigenpairs of the normalized graph adjacency.
//!
//! The solver is a thick-restart Krylov method: the search subspace is grown by applying the
//! operator to the newest basis vector (full re-orthogonalization), the wanted Ritz pairs are
//! extracted by Rayleigh-Ritz, and on restart the best Ritz vectors plus the Krylov residual
//! direction are kept.
//!
//! When the operator knows a lower bound of its spectrum, one unfiltered cycle estimates where
//! the wanted eigenvalues end and the remaining cycles run on a Chebyshev polynomial of the
//! operator that damps everything below that point. Image graphs have many eigenvalues packed
//! just under one, and the filter spreads them apart.

use crate::common::EigenConfig;
use crate::error::{Error, Result};
use crate::graph::degrees;
use crate::linalg::{axpy, dot, norm, symmetric_eigen};
use multiversion::multiversion;
use nalgebra::DMatrix;
use rand::Rng;
use rayon::prelude::*;
use sprs::CsMat;
use std::borrow::Cow;
use tracing::{debug, warn};

/// Symmetric linear map `R^n -> R^n`.
pub trait LinearOperator: Sync {
    fn dim(&self) -> usize;
    fn apply(&self, x: &[f64], y: &mut [f64]);

    /// Lower bound of the spectrum, if known.
    fn lower_bound(&self) -> Option<f64> {
        None
    }
}

/// `D^-1/2 W D^-1/2` where `W` is the graph without self loops and `D` its degree matrix.
///
/// Its largest eigenvectors are the smallest eigenvectors of the normalized Laplacian
/// `I - D^-1/2 W D^-1/2`. Isolated nodes get a degree of one. With non-negative weights the
/// spectrum lies in `[-1, 1]`.
pub struct NormalizedAdjacency<'a> {
    graph: Cow<'a, CsMat<f64>>,
    inv_sqrt_degree: Vec<f64>,
    pub sqrt_degree: Vec<f64>,
}

impl<'a> NormalizedAdjacency<'a> {
    /// CSC input is converted to CSR.
    pub fn new(graph: &'a CsMat<f64>) -> Result<Self> {
        if graph.rows() != graph.cols() {
            return Err(Error::DimensionMismatch {
                expected: graph.rows(),
                actual: graph.cols(),
            });
        }
        let graph = if graph.is_csr() {
            Cow::Borrowed(graph)
        } else {
            Cow::Owned(graph.to_csr())
        };
        let sqrt_degree: Vec<f64> = degrees(&graph)
            .into_iter()
            .map(|d| if d > 0.0 { d.sqrt() } else { 1.0 })
            .collect();
        let inv_sqrt_degree = sqrt_degree.iter().map(|d| 1.0 / d).collect();
        Ok(Self {
            graph,
            inv_sqrt_degree,
            sqrt_degree,
        })
    }
}

#[multiversion(targets = "simd")]
fn row_dot_skip_diagonal(row: usize, indices: &[usize], data: &[f64], x: &[f64]) -> f64 {
    indices
        .iter()
        .zip(data)
        .filter(|(col, _)| **col != row)
        .map(|(col, w)| w * x[*col])
        .sum()
}

impl LinearOperator for NormalizedAdjacency<'_> {
    fn dim(&self) -> usize {
        self.graph.rows()
    }

    fn apply(&self, x: &[f64], y: &mut [f64]) {
        debug_assert_eq!(x.len(), self.dim());
        debug_assert_eq!(y.len(), self.dim());
        let scaled: Vec<f64> = x
            .iter()
            .zip(&self.inv_sqrt_degree)
            .map(|(x, d)| x * d)
            .collect();
        let indptr = self.graph.indptr().into_raw_storage();
        let indices = self.graph.indices();
        let data = self.graph.data();
        y.par_iter_mut()
            .zip(indptr.par_windows(2))
            .enumerate()
            .for_each(|(row, (y, range))| {
                let (start, end) = (range[0], range[1]);
                *y = self.inv_sqrt_degree[row]
                    * row_dot_skip_diagonal(row, &indices[start..end], &data[start..end], &scaled);
            });
    }

    fn lower_bound(&self) -> Option<f64> {
        Some(-1.0)
    }
}

/// Chebyshev polynomial `T_degree` of the operator mapped from `[lower, cut]` onto `[-1, 1]`.
///
/// Eigenvalues above `cut` grow quickly with the degree while the ones in `[lower, cut]` stay in
/// `[-1, 1]`, so the largest eigenvectors keep their order.
struct ChebyshevFilter<'a, O> {
    op: &'a O,
    degree: usize,
    center: f64,
    half_width: f64,
}

impl<'a, O: LinearOperator> ChebyshevFilter<'a, O> {
    fn new(op: &'a O, degree: usize, lower: f64, cut: f64) -> Self {
        Self {
            op,
            degree: degree.max(1),
            center: 0.5 * (cut + lower),
            half_width: 0.5 * (cut - lower),
        }
    }

    /// `y = (A x - center x) / half_width`
    fn step(&self, x: &[f64], y: &mut [f64]) {
        self.op.apply(x, y);
        let (center, half_width) = (self.center, self.half_width);
        y.par_iter_mut()
            .zip(x.par_iter())
            .for_each(|(y, x)| *y = (*y - center * x) / half_width);
    }
}

impl<O: LinearOperator> LinearOperator for ChebyshevFilter<'_, O> {
    fn dim(&self) -> usize {
        self.op.dim()
    }

    fn apply(&self, x: &[f64], y: &mut [f64]) {
        // T_0 = x, T_1 = L x, T_j+1 = 2 L T_j - T_j-1
        let n = x.len();
        let mut prev = x.to_vec();
        let mut cur = vec![0.0; n];
        let mut next = vec![0.0; n];
        self.step(x, &mut cur);
        for _ in 1..self.degree {
            self.step(&cur, &mut next);
            next.par_iter_mut()
                .zip(prev.par_iter())
                .for_each(|(t, p)| *t = 2.0 * *t - p);
            std::mem::swap(&mut prev, &mut cur);
            std::mem::swap(&mut cur, &mut next);
        }
        y.copy_from_slice(&cur);
    }
}

/// Result of [`largest_eigenpairs`]. Eigenvalues are in descending order.
#[derive(Debug, Clone)]
pub struct EigenPairs {
    pub values: Vec<f64>,
    pub vectors: Vec<Vec<f64>>,
    pub converged: bool,
    pub restarts: usize,
}

/// Removes the components along `basis` (two classical Gram-Schmidt passes) and normalizes.
///
/// A vector that vanishes is replaced by a random one, so the basis can always grow while its
/// size is below `n`.
fn orthonormalize<R: Rng>(mut v: Vec<f64>, basis: &[Vec<f64>], rng: &mut R) -> Vec<f64> {
    loop {
        let original = norm(&v);
        for _ in 0..2 {
            for b in basis {
                let proj = dot(b, &v);
                axpy(-proj, b, &mut v);
            }
        }
        let nrm = norm(&v);
        if nrm > 1e-10 * original.max(f64::MIN_POSITIVE) && nrm > 0.0 {
            v.iter_mut().for_each(|x| *x /= nrm);
            return v;
        }
        v.iter_mut().for_each(|x| *x = rng.gen_range(-1.0..1.0));
    }
}

/// Linear combinations `sum_j coefficients[(j, col)] * vectors[j]` for the first `count` columns.
fn combine(vectors: &[Vec<f64>], coefficients: &DMatrix<f64>, count: usize) -> Vec<Vec<f64>> {
    let n = vectors.first().map_or(0, Vec::len);
    (0..count)
        .into_par_iter()
        .map(|col| {
            let mut out = vec![0.0; n];
            for (j, v) in vectors.iter().enumerate() {
                axpy(coefficients[(j, col)], v, &mut out);
            }
            out
        })
        .collect()
}

#[derive(Debug, Clone, Copy)]
struct Subspace {
    k: usize,
    m: usize,
    keep: usize,
}

/// Thick-restart Krylov iteration on `search`.
///
/// Eigenvalues and residuals are measured on `check` when given, otherwise on `search`. Also
/// returns every Ritz value of `search` from the last Rayleigh-Ritz step.
fn thick_restart<S, O, R>(
    search: &S,
    check: Option<&O>,
    dims: Subspace,
    tol: f64,
    max_restarts: usize,
    mut candidate: Vec<f64>,
    rng: &mut R,
) -> (EigenPairs, Vec<f64>)
where
    S: LinearOperator,
    O: LinearOperator,
    R: Rng,
{
    let Subspace { k, m, keep } = dims;
    let n = search.dim();
    let mut basis: Vec<Vec<f64>> = Vec::with_capacity(m);
    let mut images: Vec<Vec<f64>> = Vec::with_capacity(m);
    let mut restart = 0;
    loop {
        while basis.len() < m {
            let v = orthonormalize(candidate, &basis, rng);
            let mut w = vec![0.0; n];
            search.apply(&v, &mut w);
            candidate = w.clone();
            basis.push(v);
            images.push(w);
        }

        let rows: Vec<Vec<f64>> = (0..m)
            .into_par_iter()
            .map(|i| (0..m).map(|j| dot(&basis[i], &images[j])).collect())
            .collect();
        let projected = DMatrix::from_fn(m, m, |i, j| 0.5 * (rows[i][j] + rows[j][i]));
        let (theta, coefficients) = symmetric_eigen(projected);

        let wanted = keep.max(k);
        let ritz_vectors = combine(&basis, &coefficients, wanted);
        let ritz_images = combine(&images, &coefficients, wanted);
        let (values, residuals): (Vec<f64>, Vec<f64>) = (0..k)
            .map(|i| match check {
                None => {
                    let mut r = ritz_images[i].clone();
                    axpy(-theta[i], &ritz_vectors[i], &mut r);
                    (theta[i], norm(&r) / theta[i].abs().max(1.0))
                }
                Some(op) => {
                    let mut r = vec![0.0; n];
                    op.apply(&ritz_vectors[i], &mut r);
                    let value = dot(&ritz_vectors[i], &r);
                    axpy(-value, &ritz_vectors[i], &mut r);
                    (value, norm(&r) / value.abs().max(1.0))
                }
            })
            .unzip();
        let max_residual = residuals.iter().cloned().fold(0.0, f64::max);
        let converged = max_residual <= tol || m == n;
        debug!(restart, max_residual, "eigensolver iteration");

        if converged || restart >= max_restarts {
            let mut order: Vec<usize> = (0..k).collect();
            order.sort_by(|i, j| values[*j].total_cmp(&values[*i]));
            let pairs = EigenPairs {
                values: order.iter().map(|i| values[*i]).collect(),
                vectors: order.iter().map(|i| ritz_vectors[*i].clone()).collect(),
                converged,
                restarts: restart,
            };
            return (pairs, theta);
        }

        // Krylov residual direction: operator applied to the newest vector, minus the subspace.
        let mut residual = images[m - 1].clone();
        for _ in 0..2 {
            for b in &basis {
                let proj = dot(b, &residual);
                axpy(-proj, b, &mut residual);
            }
        }
        candidate = residual;
        basis = ritz_vectors.into_iter().take(keep).collect();
        images = ritz_images.into_iter().take(keep).collect();
        restart += 1;
    }
}

/// The `k` algebraically largest eigenpairs of `op`.
///
/// `rng` draws the start vector uniformly from `[-1, 1]^n`. When the residuals do not drop
/// under `config.tol` within `config.max_restarts` restarts, the current Ritz pairs are returned
/// with `converged == false`.
pub fn largest_eigenpairs<O, R>(op: &O, k: usize, config: &EigenConfig, rng: &mut R) -> EigenPairs
where
    O: LinearOperator,
    R: Rng,
{
    let n = op.dim();
    assert!(k >= 1 && k <= n, "k={k} must be in 1..={n}");
    let m = config
        .krylov_dim
        .unwrap_or((2 * k + 1).max(20))
        .max(k + 1)
        .min(n);
    let keep = ((k + m) / 2).max(k).min(m.saturating_sub(1)).max(1);
    let dims = Subspace { k, m, keep };
    let start: Vec<f64> = (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect();

    let pairs = match op.lower_bound() {
        Some(lower) if config.chebyshev_degree > 1 && m < n => {
            let (first, ritz_values) =
                thick_restart(op, None::<&O>, dims, config.tol, 0, start, rng);
            if first.converged {
                first
            } else {
                // Ritz values interlace, so this one is not above the k+1-th eigenvalue
                let cut = ritz_values[keep];
                let start = first.vectors.iter().fold(vec![0.0; n], |mut acc, v| {
                    axpy(1.0, v, &mut acc);
                    acc
                });
                let max_restarts = config.max_restarts.saturating_sub(1);
                let (mut pairs, _) = if cut > lower {
                    debug!(cut, degree = config.chebyshev_degree, "filtering the spectrum");
                    let filter = ChebyshevFilter::new(op, config.chebyshev_degree, lower, cut);
                    thick_restart(&filter, Some(op), dims, config.tol, max_restarts, start, rng)
                } else {
                    thick_restart(op, None::<&O>, dims, config.tol, max_restarts, start, rng)
                };
                pairs.restarts += 1;
                pairs
            }
        }
        _ => thick_restart(op, None::<&O>, dims, config.tol, config.max_restarts, start, rng).0,
    };
    if !pairs.converged {
        warn!(
            restarts = pairs.restarts,
            "eigensolver did not reach the tolerance, using current Ritz vectors"
        );
    }
    pairs
}
