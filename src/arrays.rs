use crate::error::{Error, Result};
use aligned_vec::{AVec, ConstAlign};
use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::ops::{Index, IndexMut};

const ALIGN: usize = 64;

/// Row-major 2D array with 64-byte aligned storage.
///
/// Indexing is `(x, y)`, that is `(column, row)`. `width` is the number of columns and `height`
/// the number of rows.
#[derive(Debug)]
pub struct Array2D<T> {
    pub data: AVec<T, ConstAlign<ALIGN>>,
    pub width: usize,
    pub height: usize,
}

/// Grayscale image with intensities in `[0, 1]`.
pub type Image = Array2D<f64>;

impl<T> Array2D<T> {
    pub fn from_slice(data: &[T], width: usize, height: usize) -> Result<Self>
    where
        T: Clone,
    {
        if data.len() != width * height {
            return Err(Error::DimensionMismatch {
                expected: width * height,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data: AVec::from_slice(ALIGN, data),
        })
    }

    pub fn from_fill(value: T, width: usize, height: usize) -> Self
    where
        T: Clone + Copy,
    {
        let data: AVec<T, ConstAlign<ALIGN>> =
            AVec::from_iter(ALIGN, (0..width * height).map(|_| value));
        Self {
            width,
            height,
            data,
        }
    }

    /// Builds the array by calling `f(x, y)` for every element in row-major order.
    pub fn from_fn<F>(width: usize, height: usize, mut f: F) -> Self
    where
        F: FnMut(usize, usize) -> T,
    {
        let data: AVec<T, ConstAlign<ALIGN>> = AVec::from_iter(
            ALIGN,
            (0..height).flat_map(|y| (0..width).map(move |x| (x, y))).map(|(x, y)| f(x, y)),
        );
        Self {
            width,
            height,
            data,
        }
    }

    pub fn fill(&mut self, value: T)
    where
        T: Clone,
    {
        self.data.fill(value)
    }
    pub fn get_row(&self, row: usize) -> &[T] {
        debug_assert!(row < self.height);
        &self.data[(self.width * row)..(self.width * row + self.width)]
    }
    pub fn get_row_mut(&mut self, row: usize) -> &mut [T] {
        debug_assert!(row < self.height);
        &mut self.data[(self.width * row)..(self.width * row + self.width)]
    }
    #[inline(always)]
    pub fn get_index(&self, x: usize, y: usize) -> usize {
        debug_assert!(self.width > x);
        debug_assert!(self.height > y);
        self.width * y + x
    }
    pub fn len(&self) -> usize {
        self.data.len()
    }
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
    /// Shape as `(rows, cols)`.
    pub fn shape(&self) -> ImageShape {
        ImageShape {
            rows: self.height,
            cols: self.width,
        }
    }
    pub fn transpose(&self) -> Self
    where
        T: Clone,
    {
        Self::from_fn(self.height, self.width, |x, y| self[(y, x)].clone())
    }
}

impl<T: Clone> Clone for Array2D<T> {
    fn clone(&self) -> Self {
        Self {
            data: AVec::from_slice(ALIGN, &self.data),
            width: self.width,
            height: self.height,
        }
    }
}

impl<T> Index<(usize, usize)> for Array2D<T> {
    type Output = T;
    fn index(&self, (x, y): (usize, usize)) -> &Self::Output {
        &self.data[self.get_index(x, y)]
    }
}
impl<T> IndexMut<(usize, usize)> for Array2D<T> {
    fn index_mut(&mut self, (x, y): (usize, usize)) -> &mut Self::Output {
        let idx = self.get_index(x, y);
        &mut self.data[idx]
    }
}

impl Image {
    /// Converts 8-bit luma to floating point intensities in `[0, 1]`.
    pub fn from_luma8(gray: &GrayImage) -> Self {
        let width = gray.width() as usize;
        let height = gray.height() as usize;
        Self {
            data: AVec::from_iter(ALIGN, gray.as_raw().iter().map(|p| *p as f64 / 255.0)),
            width,
            height,
        }
    }

    /// Converts back to 8-bit luma, clamping to the valid range.
    pub fn to_luma8(&self) -> GrayImage {
        let buf: Vec<u8> = self
            .data
            .iter()
            .map(|p| (p * 255.0).round().clamp(0.0, 255.0) as u8)
            .collect();
        GrayImage::from_raw(self.width as u32, self.height as u32, buf)
            .unwrap_or_else(|| GrayImage::new(self.width as u32, self.height as u32))
    }

    pub fn min_max(&self) -> (f64, f64) {
        self.data
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(*v), hi.max(*v))
            })
    }
}

/// Image shape in numpy order, `(rows, cols)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageShape {
    pub rows: usize,
    pub cols: usize,
}

impl ImageShape {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }
    pub fn num_pixels(&self) -> usize {
        self.rows * self.cols
    }
}

impl Display for ImageShape {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.rows, self.cols)
    }
}
