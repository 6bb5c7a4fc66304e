//! Dense stereo for generalized (wide field of view) cameras
//!
//! Matching runs directly along the analytic epipolar curves of an EUCM
//! camera pair, without rectification. The pipeline is: matching cost
//! along curves, four-direction dynamic programming, winner-take-all
//! selection and two-ray triangulation into metric distance.

use image::{GrayImage, Luma};

pub mod cost;
pub mod dynamic;
pub mod engine;
pub mod epipolar;
pub mod grid;
pub mod params;
pub mod rasterizer;
pub mod selection;
pub mod synthetic;
pub mod triangulation;

pub use cost::*;
pub use dynamic::*;
pub use engine::*;
pub use epipolar::*;
pub use grid::*;
pub use params::*;
pub use rasterizer::*;
pub use selection::*;
pub use triangulation::*;

pub use gcam_core::{Error, Result};

/// Disparity per grid cell together with its fused matching score.
#[derive(Debug, Clone, PartialEq)]
pub struct DisparityGrid {
    pub width: usize,
    pub height: usize,
    pub disp_max: usize,
    pub data: Vec<u8>,
    pub errors: Vec<i32>,
}

impl DisparityGrid {
    pub fn new(width: usize, height: usize, disp_max: usize) -> Self {
        let size = width * height;
        Self {
            width,
            height,
            disp_max,
            data: vec![0; size],
            errors: vec![0; size],
        }
    }

    pub fn get(&self, u: usize, v: usize) -> u8 {
        self.data.get(v * self.width + u).copied().unwrap_or(0)
    }

    pub fn set(&mut self, u: usize, v: usize, disparity: u8) {
        let idx = v * self.width + u;
        if let Some(cell) = self.data.get_mut(idx) {
            *cell = disparity;
        }
    }

    /// Fused score of the selected disparity.
    pub fn error(&self, u: usize, v: usize) -> i32 {
        self.errors.get(v * self.width + u).copied().unwrap_or(0)
    }

    pub fn is_valid(&self, u: usize, v: usize) -> bool {
        u < self.width && v < self.height
    }

    /// Grayscale rendering, disparity range stretched to `[0, 255]`.
    pub fn to_image(&self) -> GrayImage {
        let mut img = GrayImage::new(self.width as u32, self.height as u32);
        let range = self.disp_max.saturating_sub(1).max(1) as f64;
        for v in 0..self.height {
            for u in 0..self.width {
                let normalized = (self.get(u, v) as f64 / range * 255.0).min(255.0) as u8;
                img.put_pixel(u as u32, v as u32, Luma([normalized]));
            }
        }
        img
    }
}

/// Metric distance per grid cell.
///
/// `0.0` marks a cell without a valid measurement; cells matched at zero
/// disparity carry the configured maximum distance.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceGrid {
    pub width: usize,
    pub height: usize,
    pub scale: u32,
    pub u0: i32,
    pub v0: i32,
    pub data: Vec<f64>,
}

impl DistanceGrid {
    pub fn new(width: usize, height: usize, scale: u32, u0: i32, v0: i32) -> Self {
        Self {
            width,
            height,
            scale,
            u0,
            v0,
            data: vec![0.0; width * height],
        }
    }

    pub fn for_params(params: &StereoParameters) -> Self {
        Self::new(
            params.disp_width(),
            params.disp_height(),
            params.scale,
            params.u0(),
            params.v0(),
        )
    }

    pub fn get(&self, u: usize, v: usize) -> f64 {
        self.data.get(v * self.width + u).copied().unwrap_or(0.0)
    }

    pub fn set(&mut self, u: usize, v: usize, distance: f64) {
        let idx = v * self.width + u;
        if let Some(cell) = self.data.get_mut(idx) {
            *cell = distance;
        }
    }

    /// Image-1 column of grid column `u`.
    pub fn u_img(&self, u: usize) -> f64 {
        (u as i32 * self.scale as i32 + self.u0) as f64
    }

    pub fn v_img(&self, v: usize) -> f64 {
        (v as i32 * self.scale as i32 + self.v0) as f64
    }

    /// Grid cell closest to an image-1 pixel, if it falls on the grid.
    pub fn nearest(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        let u = ((x - self.u0 as f64) / self.scale as f64).round();
        let v = ((y - self.v0 as f64) / self.scale as f64).round();
        if u < 0.0 || v < 0.0 || u >= self.width as f64 || v >= self.height as f64 {
            return None;
        }
        Some((u as usize, v as usize))
    }

    /// Grayscale rendering with `max_distance` mapped to white.
    pub fn to_image(&self, max_distance: f64) -> GrayImage {
        let mut img = GrayImage::new(self.width as u32, self.height as u32);
        for v in 0..self.height {
            for u in 0..self.width {
                let value = (self.get(u, v) / max_distance * 255.0).clamp(0.0, 255.0) as u8;
                img.put_pixel(u as u32, v as u32, Luma([value]));
            }
        }
        img
    }
}
