//! Per-sample caches on the decimated grid.
//!
//! Everything here depends only on the calibration, the relative pose and
//! the grid layout, so it is built once and reused for every frame pair.

use crate::epipolar::EpipolarCurves;
use crate::params::StereoParameters;
use crate::rasterizer::CurveRasterizer;
use gcam_core::{CameraModel, Transformation};
use nalgebra::{Point2, Vector2, Vector3};

/// Shift along the baseline used to find the local epipolar direction.
const DIRECTION_SHIFT: f64 = 1e-3;

#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Pixel in image 1.
    pub point: Point2<f64>,
    /// Unit viewing ray in camera 1.
    pub ray: Option<Vector3<f64>>,
    /// The same ray in camera 2's orientation.
    pub rotated: Option<Vector3<f64>>,
    /// Image-2 pixel of the point at infinite depth (disparity zero).
    pub anchor: Option<(i32, i32)>,
    /// Unit direction of the epipolar curve through `point` in image 1.
    pub direction: Option<Vector2<f64>>,
    /// Epipolar bucket of `ray`.
    pub bucket: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct SampleGrid {
    width: usize,
    height: usize,
    samples: Vec<Sample>,
}

impl SampleGrid {
    pub fn new<C1, C2>(
        cam1: &C1,
        cam2: &C2,
        transform: &Transformation,
        params: &StereoParameters,
        epipolar: &EpipolarCurves,
    ) -> Self
    where
        C1: CameraModel,
        C2: CameraModel,
    {
        let width = params.disp_width();
        let height = params.disp_height();
        let shift = transform
            .trans()
            .try_normalize(f64::EPSILON)
            .unwrap_or_else(Vector3::zeros)
            * DIRECTION_SHIFT;

        let mut samples = Vec::with_capacity(width * height);
        for v in 0..height {
            for u in 0..width {
                let point = Point2::new(params.u_img(u) as f64, params.v_img(v) as f64);
                let ray = cam1.reconstruct_point(&point);
                let rotated = ray.map(|r| transform.inverse_rotate(&r));
                let anchor = rotated
                    .and_then(|r| cam2.project_point(&r))
                    .map(|p| (p.x.round() as i32, p.y.round() as i32));
                let direction = ray
                    .and_then(|r| cam1.project_point(&(r - shift)))
                    .and_then(|p| (p - point).try_normalize(f64::EPSILON));
                let bucket = ray.map(|r| epipolar.index(&r));
                samples.push(Sample {
                    point,
                    ray,
                    rotated,
                    anchor,
                    direction,
                    bucket,
                });
            }
        }

        Self {
            width,
            height,
            samples,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[inline]
    pub fn index(&self, u: usize, v: usize) -> usize {
        v * self.width + u
    }

    pub fn sample(&self, idx: usize) -> &Sample {
        &self.samples[idx]
    }

    pub fn at(&self, u: usize, v: usize) -> &Sample {
        &self.samples[self.index(u, v)]
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Rasterizer starting at the disparity-zero anchor of sample `idx`.
    pub fn rasterizer(&self, idx: usize, epipolar: &EpipolarCurves) -> Option<CurveRasterizer> {
        let sample = &self.samples[idx];
        let anchor = sample.anchor?;
        let bucket = sample.bucket?;
        Some(CurveRasterizer::new(
            anchor,
            epipolar.epipole_px(),
            *epipolar.curve(bucket),
            epipolar.heading(),
        ))
    }
}
