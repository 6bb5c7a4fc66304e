//! Matching-cost volume construction.
//!
//! Both strategies write one byte per (grid cell, disparity), smaller is a
//! better match. Samples without a usable curve (reconstruction or
//! projection failed) get zero cost at every disparity; they are counted
//! and reported so callers can tell them apart from genuine matches.

use crate::epipolar::EpipolarCurves;
use crate::grid::SampleGrid;
use crate::params::StereoParameters;
use crate::rasterizer::CurveRasterizer;
use crate::{Error, Result};
use gcam_core::{bilinear, pixel_or_zero, IntegralImage};
use image::GrayImage;
use rayon::prelude::*;

/// Bias clamp of the block strategy.
const BLOCK_MAX_BIAS: i32 = 10;

/// Dense `height × width × disp_max` byte volume.
#[derive(Debug, Clone, PartialEq)]
pub struct CostVolume {
    width: usize,
    height: usize,
    disp_max: usize,
    data: Vec<u8>,
}

impl CostVolume {
    pub fn new(width: usize, height: usize, disp_max: usize) -> Self {
        Self {
            width,
            height,
            disp_max,
            data: vec![0; width * height * disp_max],
        }
    }

    pub fn from_vec(width: usize, height: usize, disp_max: usize, data: Vec<u8>) -> Result<Self> {
        if data.len() != width * height * disp_max {
            return Err(Error::DimensionMismatch(format!(
                "cost volume {width}x{height}x{disp_max} needs {} values, got {}",
                width * height * disp_max,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            disp_max,
            data,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn disp_max(&self) -> usize {
        self.disp_max
    }

    pub fn row_stride(&self) -> usize {
        self.width * self.disp_max
    }

    /// Costs of all disparities of cell `(u, v)`.
    pub fn cell(&self, u: usize, v: usize) -> &[u8] {
        let base = (v * self.width + u) * self.disp_max;
        &self.data[base..base + self.disp_max]
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub(crate) fn same_shape(&self, width: usize, height: usize, disp_max: usize) -> bool {
        self.width == width && self.height == height && self.disp_max == disp_max
    }
}

/// Triangular weights peaking at the profile center.
pub fn profile_weights(half_length: usize) -> Vec<i32> {
    let length = 2 * half_length + 1;
    (0..length)
        .map(|i| i.min(length - 1 - i) as i32 + 1)
        .collect()
}

/// Curve-profile strategy. Returns the number of samples left at zero cost.
pub fn curve_profile_cost(
    img1: &GrayImage,
    img2: &GrayImage,
    grid: &SampleGrid,
    epipolar: &EpipolarCurves,
    params: &StereoParameters,
    volume: &mut CostVolume,
) -> usize {
    let half = params.half_length();
    let length = 2 * half + 1;
    let weights = profile_weights(half);
    let normalizer: i32 = weights.iter().sum();
    let disp_max = params.disp_count();
    let max_bias = params.max_bias;
    let stride = volume.row_stride();
    let width = volume.width;

    volume
        .data
        .par_chunks_mut(stride)
        .enumerate()
        .map(|(v, row)| {
            let mut descriptor = vec![0i32; length];
            let mut samples = vec![0i32; disp_max + length - 1];
            let mut degenerate = 0;
            for (u, out) in row.chunks_mut(disp_max).enumerate().take(width) {
                let idx = grid.index(u, v);
                let sample = grid.sample(idx);
                let (dir, mut raster) = match (sample.direction, grid.rasterizer(idx, epipolar)) {
                    (Some(dir), Some(raster)) => (dir, raster),
                    _ => {
                        out.fill(0);
                        degenerate += 1;
                        continue;
                    }
                };

                // image 1: short profile along the local epipolar direction
                for (i, value) in descriptor.iter_mut().enumerate() {
                    let shifted = sample.point + dir * (i as f64 - half as f64);
                    *value = bilinear(img1, shifted.x, shifted.y).round() as i32;
                }

                // image 2: the curve from just before the anchor to past disp_max
                raster.steps(-(half as i32));
                for value in samples.iter_mut() {
                    *value = pixel_or_zero(img2, raster.x(), raster.y()) as i32;
                    raster.step();
                }

                let sum1: i32 = descriptor.iter().sum();
                let mut sum2: i32 = samples[..length].iter().sum();
                for (d, cost) in out.iter_mut().enumerate() {
                    if d > 0 {
                        sum2 += samples[d + length - 1] - samples[d - 1];
                    }
                    let bias = ((sum2 - sum1) / length as i32).clamp(-max_bias, max_bias);
                    let acc: i32 = descriptor
                        .iter()
                        .zip(&samples[d..d + length])
                        .zip(&weights)
                        .map(|((&a, &b), &w)| (a - b + bias).abs() * w)
                        .sum();
                    *cost = (acc / normalizer).min(u8::MAX as i32) as u8;
                }
            }
            degenerate
        })
        .sum()
}

/// Block strategy. Returns the number of samples left at zero cost.
///
/// The curve is remapped into a `scale`-row band of image 2 whose columns
/// follow increasing `u`, whichever way disparity runs along the curve.
pub fn block_cost(
    img1: &GrayImage,
    img2: &GrayImage,
    grid: &SampleGrid,
    epipolar: &EpipolarCurves,
    params: &StereoParameters,
    volume: &mut CostVolume,
) -> usize {
    let scale = params.scale as usize;
    let scale_sq = (scale * scale) as i32;
    let hblock = scale / 2;
    let disp_max = params.disp_count();
    let band_width = disp_max + scale - 1;
    let integral1 = IntegralImage::new(img1);
    let raw1 = img1.as_raw();
    let img_width = img1.width() as usize;
    let stride = volume.row_stride();
    let width = volume.width;

    volume
        .data
        .par_chunks_mut(stride)
        .enumerate()
        .map(|(v, row)| {
            let mut band = vec![0u8; scale * band_width];
            let mut degenerate = 0;
            for (u, out) in row.chunks_mut(disp_max).enumerate().take(width) {
                let idx = grid.index(u, v);
                let mut raster = match grid.rasterizer(idx, epipolar) {
                    Some(raster) => raster,
                    None => {
                        out.fill(0);
                        degenerate += 1;
                        continue;
                    }
                };

                let increasing = runs_toward_increasing_u(&mut raster, scale as i32);
                let first_step = if increasing {
                    -(hblock as i32)
                } else {
                    -((scale - 1 - hblock) as i32)
                };
                raster.steps(first_step);
                for k in 0..band_width {
                    let c = if increasing { k } else { band_width - 1 - k };
                    for j in 0..scale {
                        let y = raster.y() - hblock as i32 + j as i32;
                        band[j * band_width + c] = pixel_or_zero(img2, raster.x(), y);
                    }
                    raster.step();
                }
                let integral2 = IntegralImage::from_raw(band_width, scale, &band);

                let u1 = params.u_img(u) as usize - hblock;
                let v1 = params.v_img(v) as usize - hblock;
                let sum1 = integral1.block_sum(u1, v1, scale, scale);

                for (d, cost) in out.iter_mut().enumerate() {
                    let i = if increasing { d } else { disp_max - 1 - d };
                    let sum2 = integral2.block_sum(i, 0, scale, scale);
                    let bias = (((sum2 - sum1) / scale_sq as i64) as i32)
                        .clamp(-BLOCK_MAX_BIAS, BLOCK_MAX_BIAS);
                    let mut acc = 0i32;
                    for r in 0..scale {
                        let row1 = &raw1[(v1 + r) * img_width + u1..][..scale];
                        let row2 = &band[r * band_width + i..][..scale];
                        for (&a, &b) in row1.iter().zip(row2) {
                            acc += (a as i32 - b as i32 + bias).abs();
                        }
                    }
                    *cost = (acc / scale_sq).min(u8::MAX as i32) as u8;
                }
            }
            degenerate
        })
        .sum()
}

/// Whether `span` steps from the current pixel end at a larger column.
/// Leaves the rasterizer where it started.
fn runs_toward_increasing_u(raster: &mut CurveRasterizer, span: i32) -> bool {
    let start = raster.x();
    raster.steps(span);
    let increasing = raster.x() > start;
    raster.steps(-span);
    increasing
}

#[cfg(test)]
mod tests {
    use super::*;
    use gcam_core::{Eucm, Transformation};
    use image::Luma;
    use nalgebra::Vector3;

    struct Rig {
        params: StereoParameters,
        curves: EpipolarCurves,
        grid: SampleGrid,
    }

    fn rig(params: StereoParameters) -> Rig {
        rig_with_baseline(params, 0.2)
    }

    fn rig_with_baseline(params: StereoParameters, tx: f64) -> Rig {
        let cam = Eucm::new(0.5, 1.0, 100.0, 100.0, 80.0, 60.0);
        let pose = Transformation::from_translation(Vector3::new(tx, 0.0, 0.0));
        let curves = EpipolarCurves::new(&pose, &cam, params.num_buckets).unwrap();
        let grid = SampleGrid::new(&cam, &cam, &pose, &params, &curves);
        Rig {
            params,
            curves,
            grid,
        }
    }

    fn texture(width: u32, height: u32, shift: i32) -> GrayImage {
        let mut img = GrayImage::new(width, height);
        for y in 0..height {
            for x in 0..width {
                let xs = x as i32 + shift;
                let value = ((xs * 37 + (y as i32) * 11).rem_euclid(97) * 2 + 30) as u8;
                img.put_pixel(x, y, Luma([value]));
            }
        }
        img
    }

    #[test]
    fn test_profile_weights_are_triangular() {
        assert_eq!(profile_weights(1), vec![1, 2, 1]);
        assert_eq!(profile_weights(2), vec![1, 2, 3, 2, 1]);
    }

    #[test]
    fn test_identical_images_match_at_zero_disparity() {
        let r = rig(StereoParameters::new(160, 120).with_disparity_max(16));
        let img = texture(160, 120, 0);
        let mut volume = CostVolume::new(r.grid.width(), r.grid.height(), 16);
        let degenerate =
            curve_profile_cost(&img, &img, &r.grid, &r.curves, &r.params, &mut volume);
        assert_eq!(degenerate, 0);
        // near the central row the curves are almost horizontal
        for u in 3..r.grid.width() - 3 {
            let cell = volume.cell(u, 20);
            let min = *cell.iter().min().unwrap();
            assert_eq!(cell[0], min, "u = {u}");
            assert!(cell[0] <= 2, "u = {u}");
        }
    }

    #[test]
    fn test_block_cost_finds_horizontal_shift() {
        let shift = 6;
        let params = StereoParameters::new(160, 120)
            .with_disparity_max(16)
            .with_cost_strategy(crate::CostStrategy::Block);
        let r = rig(params);
        let img1 = texture(160, 120, 0);
        // image 2 content moved toward the epipole on the left
        let img2 = texture(160, 120, shift);
        let mut volume = CostVolume::new(r.grid.width(), r.grid.height(), 16);
        block_cost(&img1, &img2, &r.grid, &r.curves, &r.params, &mut volume);
        let cell = volume.cell(30, 20);
        let best = (0..16).min_by_key(|&d| cell[d]).unwrap();
        assert_eq!(best, shift as usize);
        assert_eq!(cell[best], 0);
    }

    #[test]
    fn test_block_cost_with_camera_two_on_the_left() {
        let shift = 6;
        let params = StereoParameters::new(160, 120)
            .with_disparity_max(16)
            .with_cost_strategy(crate::CostStrategy::Block);
        let r = rig_with_baseline(params, -0.2);
        let img1 = texture(160, 120, 0);
        // epipole on the right: image 2 content moves toward increasing u
        let img2 = texture(160, 120, -shift);
        let mut volume = CostVolume::new(r.grid.width(), r.grid.height(), 16);
        block_cost(&img1, &img2, &r.grid, &r.curves, &r.params, &mut volume);
        for u in [10, 30] {
            let cell = volume.cell(u, 20);
            let best = (0..16).min_by_key(|&d| cell[d]).unwrap();
            assert_eq!(best, shift as usize, "u = {u}");
            assert_eq!(cell[best], 0, "u = {u}");
        }
    }

    #[test]
    fn test_band_direction_follows_the_curve() {
        let line = crate::epipolar::Conic::line(0.0, 1.0, -10.0);
        let mut left = CurveRasterizer::new((50, 10), (0, 10), line, crate::Heading::Toward);
        assert!(!runs_toward_increasing_u(&mut left, 3));
        assert_eq!(left.pixel(), (50, 10));
        let mut right = CurveRasterizer::new((50, 10), (200, 10), line, crate::Heading::Toward);
        assert!(runs_toward_increasing_u(&mut right, 3));
        assert_eq!(right.pixel(), (50, 10));
    }

    #[test]
    fn test_unprojectable_samples_get_zero_cost() {
        // a narrow model: the corners of the image do not back-project
        let cam = Eucm::new(0.9, 4.0, 60.0, 60.0, 80.0, 60.0);
        let pose = Transformation::from_translation(Vector3::new(0.2, 0.0, 0.0));
        let params = StereoParameters::new(160, 120).with_disparity_max(8);
        let curves = EpipolarCurves::new(&pose, &cam, params.num_buckets).unwrap();
        let grid = SampleGrid::new(&cam, &cam, &pose, &params, &curves);
        assert!(grid.at(0, 0).ray.is_none());

        let img = texture(160, 120, 0);
        let mut volume = CostVolume::new(grid.width(), grid.height(), 8);
        volume.as_mut_slice().fill(7);
        let degenerate = curve_profile_cost(&img, &img, &grid, &curves, &params, &mut volume);
        assert!(degenerate > 0);
        assert!(volume.cell(0, 0).iter().all(|&c| c == 0));
    }
}
