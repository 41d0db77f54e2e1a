//! Dense helpers shared by the eigensolver and the label assignment.
//!
//! Pixel-sized data stays in [`Array2D`] rows. Only the small `k x k` and subspace-sized
//! problems go through nalgebra.

use crate::arrays::Array2D;
use crate::error::{Error, Result};
use nalgebra::{DMatrix, DVector, SymmetricEigen, SVD};

pub type Matrix = Array2D<f64>;

const MAX_SVD_ITER: usize = 10_000;

#[inline]
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[inline]
pub fn norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}

/// `y += alpha * x`
#[inline]
pub fn axpy(alpha: f64, x: &[f64], y: &mut [f64]) {
    debug_assert_eq!(x.len(), y.len());
    y.iter_mut().zip(x).for_each(|(y, x)| *y += alpha * x);
}

pub fn to_dmatrix(m: &Matrix) -> DMatrix<f64> {
    DMatrix::from_fn(m.height, m.width, |row, col| m[(col, row)])
}

/// Eigenvalues in descending order and the matching eigenvectors as columns.
pub fn symmetric_eigen(a: DMatrix<f64>) -> (Vec<f64>, DMatrix<f64>) {
    let SymmetricEigen {
        eigenvalues,
        eigenvectors,
    } = SymmetricEigen::new(a);
    let mut order: Vec<usize> = (0..eigenvalues.len()).collect();
    order.sort_by(|i, j| eigenvalues[*j].total_cmp(&eigenvalues[*i]));
    let values = order.iter().map(|i| eigenvalues[*i]).collect();
    let vectors = DMatrix::from_fn(eigenvectors.nrows(), order.len(), |row, col| {
        eigenvectors[(row, order[col])]
    });
    (values, vectors)
}

/// `a = u * diag(s) * vt`
#[derive(Debug, Clone)]
pub struct Svd {
    pub u: DMatrix<f64>,
    pub s: DVector<f64>,
    pub vt: DMatrix<f64>,
}

pub fn svd(a: DMatrix<f64>) -> Result<Svd> {
    let SVD {
        u,
        v_t,
        singular_values,
    } = a
        .try_svd(true, true, f64::EPSILON, MAX_SVD_ITER)
        .ok_or(Error::SvdNotConverged)?;
    match (u, v_t) {
        (Some(u), Some(vt)) if singular_values.iter().all(|s| s.is_finite()) => Ok(Svd {
            u,
            s: singular_values,
            vt,
        }),
        _ => Err(Error::SvdNotConverged),
    }
}
