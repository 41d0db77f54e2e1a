//! Separable Gaussian smoothing with `scipy.ndimage` boundary conventions.

use crate::arrays::Image;
use crate::common::PadMode;
use multiversion::multiversion;
use rayon::prelude::*;

/// Maps a possibly out-of-range sample index onto the line of length `len`.
///
/// Returns `None` only for [`PadMode::Constant`] outside of the line.
#[inline(always)]
pub fn extend_index(i: isize, len: usize, mode: PadMode) -> Option<usize> {
    debug_assert!(len > 0);
    let n = len as isize;
    if (0..n).contains(&i) {
        return Some(i as usize);
    }
    let idx = match mode {
        PadMode::Reflect => {
            let period = 2 * n;
            let r = i.rem_euclid(period);
            if r >= n {
                period - 1 - r
            } else {
                r
            }
        }
        PadMode::Mirror => {
            if n == 1 {
                0
            } else {
                let period = 2 * n - 2;
                let r = i.rem_euclid(period);
                if r >= n {
                    period - r
                } else {
                    r
                }
            }
        }
        PadMode::Nearest => i.clamp(0, n - 1),
        PadMode::Wrap => i.rem_euclid(n),
        PadMode::Constant => return None,
    };
    Some(idx as usize)
}

/// Normalized 1D Gaussian of radius `int(truncate * sigma + 0.5)`.
pub fn gaussian_kernel1d(sigma: f64, truncate: f64) -> Vec<f64> {
    if sigma <= 0.0 {
        return vec![1.0];
    }
    let radius = (truncate * sigma + 0.5) as isize;
    let denom = 2.0 * sigma * sigma;
    let mut kernel: Vec<f64> = (-radius..=radius)
        .map(|x| (-((x * x) as f64) / denom).exp())
        .collect();
    let sum: f64 = kernel.iter().sum();
    kernel.iter_mut().for_each(|w| *w /= sum);
    kernel
}

#[multiversion(targets = "simd")]
fn correlate_line(line: &[f64], kernel: &[f64], mode: PadMode, padded: &mut Vec<f64>, out: &mut [f64]) {
    debug_assert_eq!(line.len(), out.len());
    let radius = (kernel.len() / 2) as isize;
    padded.clear();
    padded.extend(
        (-radius..line.len() as isize + radius)
            .map(|i| extend_index(i, line.len(), mode).map_or(0.0, |j| line[j])),
    );
    for (i, o) in out.iter_mut().enumerate() {
        *o = padded[i..i + kernel.len()]
            .iter()
            .zip(kernel)
            .map(|(p, w)| p * w)
            .sum();
    }
}

/// Correlates every row of `image` with `kernel`.
pub fn correlate_rows(image: &Image, kernel: &[f64], mode: PadMode) -> Image {
    let mut output = Image::from_fill(0.0, image.width, image.height);
    let mut padded = Vec::with_capacity(image.width + kernel.len());
    for row in 0..image.height {
        correlate_line(image.get_row(row), kernel, mode, &mut padded, output.get_row_mut(row));
    }
    output
}

/// Same as [`correlate_rows`], rows are processed in parallel.
pub fn par_correlate_rows(image: &Image, kernel: &[f64], mode: PadMode) -> Image {
    let mut output = Image::from_fill(0.0, image.width, image.height);
    if image.is_empty() {
        return output;
    }
    let width = image.width;
    output
        .data
        .par_chunks_mut(width)
        .zip(image.data.par_chunks(width))
        .for_each_init(
            || Vec::with_capacity(width + kernel.len()),
            |padded, (out_row, in_row)| correlate_line(in_row, kernel, mode, padded, out_row),
        );
    output
}

/// Multidimensional Gaussian filter, one 1D pass per axis.
pub fn gaussian_filter(image: &Image, sigma: f64, mode: PadMode, truncate: f64) -> Image {
    let kernel = gaussian_kernel1d(sigma, truncate);
    let along_rows = correlate_rows(image, &kernel, mode);
    correlate_rows(&along_rows.transpose(), &kernel, mode).transpose()
}

/// Data-parallel [`gaussian_filter`].
pub fn par_gaussian_filter(image: &Image, sigma: f64, mode: PadMode, truncate: f64) -> Image {
    let kernel = gaussian_kernel1d(sigma, truncate);
    let along_rows = par_correlate_rows(image, &kernel, mode);
    par_correlate_rows(&along_rows.transpose(), &kernel, mode).transpose()
}
