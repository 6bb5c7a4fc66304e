//! Stereo run configuration.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// How the matching-cost volume is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CostStrategy {
    /// Triangular-weighted 1-D profiles sampled along the epipolar curve.
    #[default]
    CurveProfile,
    /// `scale × scale` blocks remapped along the curve.
    Block,
}

/// Parameters of one stereo engine instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StereoParameters {
    pub image_width: u32,
    pub image_height: u32,
    /// Decimation between the image and the disparity grid.
    pub scale: u32,
    /// Number of disparity hypotheses, `[0, disp_max)`.
    pub disp_max: u32,
    /// Penalty for a disparity change of one between neighbours.
    pub lambda_step: i32,
    /// Penalty for an arbitrary disparity jump (occlusions).
    pub lambda_jump: i32,
    /// Clamp for the brightness offset between the two windows.
    pub max_bias: i32,
    /// Distance reported for zero disparity.
    pub max_distance: f64,
    /// Angular buckets of the epipolar curve table; must be even.
    pub num_buckets: usize,
    pub cost_strategy: CostStrategy,
    pub verbosity: u8,
}

impl Default for StereoParameters {
    fn default() -> Self {
        Self {
            image_width: 0,
            image_height: 0,
            scale: 3,
            disp_max: 48,
            lambda_step: 3,
            lambda_jump: 15,
            max_bias: 10,
            max_distance: 100.0,
            num_buckets: 2000,
            cost_strategy: CostStrategy::CurveProfile,
            verbosity: 0,
        }
    }
}

impl StereoParameters {
    pub fn new(image_width: u32, image_height: u32) -> Self {
        Self {
            image_width,
            image_height,
            ..Self::default()
        }
    }

    pub fn with_scale(mut self, scale: u32) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_disparity_max(mut self, disp_max: u32) -> Self {
        self.disp_max = disp_max;
        self
    }

    pub fn with_penalties(mut self, lambda_step: i32, lambda_jump: i32) -> Self {
        self.lambda_step = lambda_step;
        self.lambda_jump = lambda_jump;
        self
    }

    pub fn with_max_bias(mut self, max_bias: i32) -> Self {
        self.max_bias = max_bias;
        self
    }

    pub fn with_max_distance(mut self, max_distance: f64) -> Self {
        self.max_distance = max_distance;
        self
    }

    pub fn with_num_buckets(mut self, num_buckets: usize) -> Self {
        self.num_buckets = num_buckets;
        self
    }

    pub fn with_cost_strategy(mut self, strategy: CostStrategy) -> Self {
        self.cost_strategy = strategy;
        self
    }

    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn validate(&self) -> Result<()> {
        gcam_core::validate_image_size(self.image_width, self.image_height)?;
        if self.scale < 1 {
            return Err(Error::invalid_parameters("scale must be >= 1"));
        }
        if self.disp_max == 0 || self.disp_max > u8::MAX as u32 {
            return Err(Error::invalid_parameters(format!(
                "disp_max must lie in [1, 255], got {}",
                self.disp_max
            )));
        }
        if self.lambda_step < 0 || self.lambda_jump < 0 {
            return Err(Error::invalid_parameters(
                "smoothness penalties must be non-negative",
            ));
        }
        if self.max_bias < 0 {
            return Err(Error::invalid_parameters("max_bias must be non-negative"));
        }
        if !self.max_distance.is_finite() || self.max_distance <= 0.0 {
            return Err(Error::invalid_parameters(
                "max_distance must be positive and finite",
            ));
        }
        if self.num_buckets == 0 || self.num_buckets % 2 != 0 {
            return Err(Error::invalid_parameters(format!(
                "num_buckets must be even and positive, got {}",
                self.num_buckets
            )));
        }
        if self.disp_width() == 0 || self.disp_height() == 0 {
            return Err(Error::invalid_parameters(format!(
                "a {}x{} image yields an empty grid at scale {}",
                self.image_width, self.image_height, self.scale
            )));
        }
        Ok(())
    }

    pub fn disp_width(&self) -> usize {
        (self.image_width / self.scale.max(1)) as usize
    }

    pub fn disp_height(&self) -> usize {
        (self.image_height / self.scale.max(1)) as usize
    }

    pub fn disp_count(&self) -> usize {
        self.disp_max as usize
    }

    /// Image column of the first grid column.
    pub fn u0(&self) -> i32 {
        (self.scale / 2) as i32
    }

    pub fn v0(&self) -> i32 {
        (self.scale / 2) as i32
    }

    pub fn u_img(&self, u: usize) -> i32 {
        u as i32 * self.scale as i32 + self.u0()
    }

    pub fn v_img(&self, v: usize) -> i32 {
        v as i32 * self.scale as i32 + self.v0()
    }

    /// Half length of the curve profile, `max(scale - 1, 1)`.
    pub fn half_length(&self) -> usize {
        (self.scale.saturating_sub(1)).max(1) as usize
    }

    pub(crate) fn same_grid(&self, other: &Self) -> bool {
        self.image_width == other.image_width
            && self.image_height == other.image_height
            && self.scale == other.scale
    }
}
