//! Image rescaling with scikit-image conventions.

use crate::arrays::{Image, ImageShape};
use crate::common::PadMode;
use crate::error::{Error, Result};
use crate::filters::{extend_index, gaussian_filter};

/// Output shape of [`rescale`]: every dimension is multiplied by `scale`, rounded and kept at
/// one pixel at least.
///
/// Rounding is half-to-even like Python's `round`, so `(303, 384)` at `0.2` becomes `(61, 77)`.
pub fn rescaled_shape(shape: ImageShape, scale: f64) -> ImageShape {
    ImageShape::new(
        round_half_even(shape.rows as f64 * scale).max(1),
        round_half_even(shape.cols as f64 * scale).max(1),
    )
}

fn round_half_even(value: f64) -> usize {
    let floor = value.floor();
    let diff = value - floor;
    let rounded = if (diff - 0.5).abs() < 1e-12 {
        if floor as u64 % 2 == 0 {
            floor
        } else {
            floor + 1.0
        }
    } else {
        value.round()
    };
    rounded.max(0.0) as usize
}

/// Bilinear sample at fractional `(x, y)`, out-of-range taps resolved by `mode`.
#[inline(always)]
fn sample_bilinear(image: &Image, x: f64, y: f64, mode: PadMode) -> f64 {
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let (x0, y0) = (x0 as isize, y0 as isize);
    let tap = |xi: isize, yi: isize| -> f64 {
        match (
            extend_index(xi, image.width, mode),
            extend_index(yi, image.height, mode),
        ) {
            (Some(xi), Some(yi)) => image[(xi, yi)],
            _ => 0.0,
        }
    };
    let top = tap(x0, y0) * (1.0 - fx) + tap(x0 + 1, y0) * fx;
    let bottom = tap(x0, y0 + 1) * (1.0 - fx) + tap(x0 + 1, y0 + 1) * fx;
    top * (1.0 - fy) + bottom * fy
}

/// Resizes `image` to `output_shape` with bilinear interpolation.
///
/// Pixel centers are aligned: output pixel `o` samples input coordinate
/// `(o + 0.5) * in / out - 0.5`. The result is clipped to the input range.
pub fn resize(image: &Image, output_shape: ImageShape, mode: PadMode) -> Result<Image> {
    let input_shape = image.shape();
    if input_shape.num_pixels() == 0 {
        return Err(Error::EmptyImage {
            rows: input_shape.rows,
            cols: input_shape.cols,
        });
    }
    if output_shape.num_pixels() == 0 {
        return Err(Error::EmptyImage {
            rows: output_shape.rows,
            cols: output_shape.cols,
        });
    }
    let zoom_x = image.width as f64 / output_shape.cols as f64;
    let zoom_y = image.height as f64 / output_shape.rows as f64;
    let (lo, hi) = image.min_max();
    Ok(Image::from_fn(output_shape.cols, output_shape.rows, |x, y| {
        let in_x = (x as f64 + 0.5) * zoom_x - 0.5;
        let in_y = (y as f64 + 0.5) * zoom_y - 0.5;
        sample_bilinear(image, in_x, in_y, mode).clamp(lo, hi)
    }))
}

/// Scales `image` by `scale` (see [`rescaled_shape`]).
///
/// With `anti_aliasing` a Gaussian of `sigma = max(0, (1 / scale - 1) / 2)` is applied first
/// when downscaling.
pub fn rescale(image: &Image, scale: f64, mode: PadMode, anti_aliasing: bool) -> Result<Image> {
    if !(scale > 0.0) || !scale.is_finite() {
        return Err(Error::InvalidScaleFactor(scale));
    }
    let output_shape = rescaled_shape(image.shape(), scale);
    if anti_aliasing && scale < 1.0 {
        let sigma = ((1.0 / scale - 1.0) / 2.0).max(0.0);
        let smoothed = gaussian_filter(image, sigma, mode, 4.0);
        return resize(&smoothed, output_shape, mode);
    }
    resize(image, output_shape, mode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn coins_shape_at_one_fifth() {
        assert_eq!(
            rescaled_shape(ImageShape::new(303, 384), 0.2),
            ImageShape::new(61, 77)
        );
        let image = Image::from_fn(384, 303, |x, y| ((x + y) % 17) as f64 / 17.0);
        let out = rescale(&image, 0.2, PadMode::Mirror, false).unwrap();
        assert_eq!(out.shape(), ImageShape::new(61, 77));
    }

    #[test]
    fn rounding_is_half_to_even() {
        assert_eq!(round_half_even(2.5), 2);
        assert_eq!(round_half_even(3.5), 4);
        assert_eq!(round_half_even(60.6), 61);
        assert_eq!(round_half_even(0.4), 0);
    }

    #[test]
    fn full_scale_is_identity() {
        let image = Image::from_fn(9, 6, |x, y| (x * 6 + y) as f64 / 54.0);
        let out = rescale(&image, 1.0, PadMode::Mirror, false).unwrap();
        for (a, b) in image.data.iter().zip(out.data.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn halving_averages_pixel_pairs() {
        let image = Image::from_fn(4, 2, |x, _| x as f64);
        let out = rescale(&image, 0.5, PadMode::Mirror, false).unwrap();
        assert_eq!(out.shape(), ImageShape::new(1, 2));
        assert!((out[(0, 0)] - 0.5).abs() < 1e-12);
        assert!((out[(1, 0)] - 2.5).abs() < 1e-12);
    }

    #[test]
    fn tiny_scale_keeps_one_pixel() {
        let image = Image::from_fn(4, 4, |x, y| (x + y) as f64);
        let out = rescale(&image, 0.05, PadMode::Mirror, false).unwrap();
        assert_eq!(out.shape(), ImageShape::new(1, 1));
        assert!(out[(0, 0)].is_finite());
        assert_eq!(
            rescaled_shape(ImageShape::new(303, 384), 0.001),
            ImageShape::new(1, 1)
        );
        assert_eq!(
            rescaled_shape(ImageShape::new(303, 384), 0.002),
            ImageShape::new(1, 1)
        );
    }

    #[test]
    fn empty_input_or_bad_factor_is_an_error() {
        assert!(matches!(
            rescale(&Image::from_fill(1.0, 0, 3), 0.5, PadMode::Mirror, false),
            Err(Error::EmptyImage { .. })
        ));
        let image = Image::from_fill(1.0, 4, 4);
        assert!(matches!(
            rescale(&image, 0.0, PadMode::Mirror, false),
            Err(Error::InvalidScaleFactor(_))
        ));
    }

    #[test]
    fn anti_aliasing_stays_in_range() {
        let image = Image::from_fn(40, 30, |x, y| ((x + y) % 2) as f64);
        let out = rescale(&image, 0.25, PadMode::Mirror, true).unwrap();
        assert_eq!(out.shape(), ImageShape::new(8, 10));
        assert!(out.data.iter().all(|v| (0.0..=1.0).contains(v)));
        // checkerboard averages out
        assert!(out.data.iter().all(|v| (v - 0.5).abs() < 0.1));
    }

    proptest! {
        #[test]
        fn pixel_count_is_monotonic_in_scale(
            rows in 1usize..400,
            cols in 1usize..400,
            a in 0.01f64..=1.0,
            b in 0.01f64..=1.0,
        ) {
            let (small, large) = if a <= b { (a, b) } else { (b, a) };
            let shape = ImageShape::new(rows, cols);
            prop_assert!(
                rescaled_shape(shape, small).num_pixels() <= rescaled_shape(shape, large).num_pixels()
            );
        }

        #[test]
        fn every_factor_gives_a_non_empty_shape(
            rows in 1usize..400,
            cols in 1usize..400,
            scale in 1e-6f64..=1.0,
        ) {
            let out = rescaled_shape(ImageShape::new(rows, cols), scale);
            prop_assert!(out.rows > 0 && out.cols > 0);
            prop_assert!(out.rows <= rows && out.cols <= cols);
        }
    }
}
