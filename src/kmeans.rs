//! K-means on the rows of a dense matrix, used to label the spectral embedding.

use crate::error::{Error, Result};
use crate::linalg::Matrix;
use rand::Rng;
use rayon::prelude::*;

#[derive(Debug, Clone)]
pub struct KMeansOptions {
    pub n_clusters: usize,
    pub max_iter: usize,
    /// Squared centroid shift, relative to the mean feature variance.
    pub tol: f64,
    /// Number of k-means++ initializations, the run with the lowest inertia is kept.
    pub n_init: usize,
}

impl Default for KMeansOptions {
    fn default() -> Self {
        Self {
            n_clusters: 8,
            max_iter: 300,
            tol: 1e-4,
            n_init: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct KMeansResult {
    pub centroids: Matrix,
    pub labels: Vec<usize>,
    pub inertia: f64,
    pub n_iter: usize,
}

#[inline]
fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn nearest(point: &[f64], centroids: &Matrix) -> (usize, f64) {
    (0..centroids.height)
        .map(|c| (c, squared_distance(point, centroids.get_row(c))))
        .fold((0, f64::INFINITY), |best, cur| if cur.1 < best.1 { cur } else { best })
}

/// k-means++ seeding: every further centroid is sampled with probability proportional to the
/// squared distance to the closest centroid chosen so far.
fn kmeans_plusplus<R: Rng>(data: &Matrix, k: usize, rng: &mut R) -> Matrix {
    let n = data.height;
    let d = data.width;
    let mut centroids = Matrix::from_fill(0.0, d, k);
    let first = rng.gen_range(0..n);
    centroids.get_row_mut(0).copy_from_slice(data.get_row(first));
    let mut closest: Vec<f64> = (0..n)
        .map(|i| squared_distance(data.get_row(i), centroids.get_row(0)))
        .collect();
    for c in 1..k {
        let total: f64 = closest.iter().sum();
        let next = if total > 0.0 {
            let threshold = rng.gen::<f64>() * total;
            let mut acc = 0.0;
            closest
                .iter()
                .position(|w| {
                    acc += w;
                    acc >= threshold
                })
                .unwrap_or(n - 1)
        } else {
            rng.gen_range(0..n)
        };
        centroids.get_row_mut(c).copy_from_slice(data.get_row(next));
        for (i, dist) in closest.iter_mut().enumerate() {
            *dist = dist.min(squared_distance(data.get_row(i), centroids.get_row(c)));
        }
    }
    centroids
}

fn mean_variance(data: &Matrix) -> f64 {
    let n = data.height as f64;
    let d = data.width;
    (0..d)
        .map(|col| {
            let mean = (0..data.height).map(|row| data[(col, row)]).sum::<f64>() / n;
            (0..data.height)
                .map(|row| (data[(col, row)] - mean).powi(2))
                .sum::<f64>()
                / n
        })
        .sum::<f64>()
        / d.max(1) as f64
}

fn lloyd(data: &Matrix, mut centroids: Matrix, max_iter: usize, tol: f64) -> KMeansResult {
    let (n, d, k) = (data.height, data.width, centroids.height);
    let mut n_iter = 0;
    for iter in 0..max_iter {
        n_iter = iter + 1;
        let labels: Vec<usize> = (0..n)
            .into_par_iter()
            .map(|i| nearest(data.get_row(i), &centroids).0)
            .collect();
        let mut sums = Matrix::from_fill(0.0, d, k);
        let mut counts = vec![0usize; k];
        for (i, label) in labels.iter().enumerate() {
            counts[*label] += 1;
            sums.get_row_mut(*label)
                .iter_mut()
                .zip(data.get_row(i))
                .for_each(|(s, x)| *s += x);
        }
        let mut shift = 0.0;
        for c in 0..k {
            // empty clusters keep their centroid
            if counts[c] == 0 {
                continue;
            }
            let count = counts[c] as f64;
            let old = centroids.get_row_mut(c);
            for (o, s) in old.iter_mut().zip(sums.get_row(c)) {
                let new = s / count;
                shift += (new - *o) * (new - *o);
                *o = new;
            }
        }
        if shift <= tol {
            break;
        }
    }
    let (labels, inertia): (Vec<usize>, Vec<f64>) = (0..n)
        .into_par_iter()
        .map(|i| nearest(data.get_row(i), &centroids))
        .unzip();
    KMeansResult {
        centroids,
        labels,
        inertia: inertia.iter().sum(),
        n_iter,
    }
}

/// Clusters the rows of `data`, keeping the best of `options.n_init` k-means++ runs.
pub fn kmeans<R: Rng>(data: &Matrix, options: &KMeansOptions, rng: &mut R) -> Result<KMeansResult> {
    let n = data.height;
    let k = options.n_clusters;
    if k == 0 || k > n {
        return Err(Error::InvalidClusterCount {
            n_clusters: k,
            n_samples: n,
        });
    }
    let tol = options.tol * mean_variance(data);
    let mut best: Option<KMeansResult> = None;
    for _ in 0..options.n_init.max(1) {
        let init = kmeans_plusplus(data, k, rng);
        let run = lloyd(data, init, options.max_iter, tol);
        if best.as_ref().map_or(true, |b| run.inertia < b.inertia) {
            best = Some(run);
        }
    }
    best.ok_or(Error::InvalidClusterCount {
        n_clusters: k,
        n_samples: n,
    })
}
