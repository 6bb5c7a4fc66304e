//! Grayscale image primitives used by the matching stages.

use crate::{Error, Result};
use image::GrayImage;

pub fn validate_image_size(width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(Error::DimensionMismatch(
            "Image dimensions must be non-zero".into(),
        ));
    }
    Ok(())
}

/// Pixel value, or zero outside the image.
#[inline]
pub fn pixel_or_zero(img: &GrayImage, x: i32, y: i32) -> u8 {
    if x < 0 || y < 0 || x >= img.width() as i32 || y >= img.height() as i32 {
        return 0;
    }
    img.as_raw()[y as usize * img.width() as usize + x as usize]
}

/// Bilinear interpolation with a constant zero border.
pub fn bilinear(img: &GrayImage, x: f64, y: f64) -> f64 {
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let (x0, y0) = (x0 as i32, y0 as i32);

    let v00 = pixel_or_zero(img, x0, y0) as f64;
    let v10 = pixel_or_zero(img, x0 + 1, y0) as f64;
    let v01 = pixel_or_zero(img, x0, y0 + 1) as f64;
    let v11 = pixel_or_zero(img, x0 + 1, y0 + 1) as f64;

    let v0 = v00 * (1.0 - fx) + v10 * fx;
    let v1 = v01 * (1.0 - fx) + v11 * fx;

    v0 * (1.0 - fy) + v1 * fy
}

/// Summed-area table with one row and column of zero padding.
#[derive(Debug, Clone)]
pub struct IntegralImage {
    width: usize,
    height: usize,
    data: Vec<i64>,
}

impl IntegralImage {
    pub fn new(img: &GrayImage) -> Self {
        Self::from_raw(img.width() as usize, img.height() as usize, img.as_raw())
    }

    pub fn from_raw(width: usize, height: usize, raw: &[u8]) -> Self {
        let stride = width + 1;
        let mut data = vec![0i64; stride * (height + 1)];
        for y in 0..height {
            let mut row_sum = 0i64;
            for x in 0..width {
                row_sum += raw[y * width + x] as i64;
                data[(y + 1) * stride + x + 1] = data[y * stride + x + 1] + row_sum;
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Sum over the block `[x, x + w) × [y, y + h)`; the block must lie inside the image.
    pub fn block_sum(&self, x: usize, y: usize, w: usize, h: usize) -> i64 {
        debug_assert!(x + w <= self.width && y + h <= self.height);
        let stride = self.width + 1;
        self.data[(y + h) * stride + x + w] + self.data[y * stride + x]
            - self.data[y * stride + x + w]
            - self.data[(y + h) * stride + x]
    }
}
