//! Synthetic scenes for testing and benchmarking.
//!
//! A textured planar target in front of a background at infinite depth,
//! rendered through any [`CameraModel`], plus the matching ground truth on
//! the stereo grid.

use crate::params::StereoParameters;
use crate::DistanceGrid;
use gcam_core::{CameraModel, Transformation};
use image::{GrayImage, Luma};
use nalgebra::{Point2, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const LATTICE_SIZE: usize = 64;

/// 2×2 sub-pixel offsets used when rendering.
const SUPERSAMPLE: [(f64, f64); 4] = [(-0.25, -0.25), (0.25, -0.25), (-0.25, 0.25), (0.25, 0.25)];

/// Periodic value noise: random lattice values, bilinearly interpolated.
#[derive(Debug, Clone)]
pub struct NoiseTexture {
    frequency: f64,
    values: Vec<f64>,
}

impl NoiseTexture {
    /// `frequency` is the number of lattice cells per unit of the sampling coordinates.
    pub fn new(seed: u64, frequency: f64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let values = (0..LATTICE_SIZE * LATTICE_SIZE)
            .map(|_| rng.gen_range(20.0..235.0))
            .collect();
        Self { frequency, values }
    }

    pub fn sample(&self, x: f64, y: f64) -> f64 {
        let (x, y) = (x * self.frequency, y * self.frequency);
        let (x0, y0) = (x.floor(), y.floor());
        let (fx, fy) = (x - x0, y - y0);
        let lattice = |i: f64, j: f64| {
            let i = (i as i64).rem_euclid(LATTICE_SIZE as i64) as usize;
            let j = (j as i64).rem_euclid(LATTICE_SIZE as i64) as usize;
            self.values[j * LATTICE_SIZE + i]
        };
        let top = lattice(x0, y0) * (1.0 - fx) + lattice(x0 + 1.0, y0) * fx;
        let bottom = lattice(x0, y0 + 1.0) * (1.0 - fx) + lattice(x0 + 1.0, y0 + 1.0) * fx;
        top * (1.0 - fy) + bottom * fy
    }

    /// Texture laid over the whole image plane, `frequency` cells per pixel.
    pub fn to_image(&self, width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            Luma([self.sample(x as f64, y as f64).round().clamp(0.0, 255.0) as u8])
        })
    }
}

/// Textured rectangle on the `z = 0` plane of its own frame.
#[derive(Debug, Clone)]
pub struct PlanarTarget {
    /// Maps target coordinates into camera 1.
    pub pose: Transformation,
    pub half_width: f64,
    pub half_height: f64,
    /// Texture sampled in metres on the target.
    pub texture: NoiseTexture,
}

impl PlanarTarget {
    pub fn new(pose: Transformation, half_width: f64, half_height: f64, texture: NoiseTexture) -> Self {
        Self {
            pose,
            half_width,
            half_height,
            texture,
        }
    }

    /// Corners in target coordinates, ordered for [`plane_distance_grid`].
    pub fn polygon(&self) -> Vec<Vector3<f64>> {
        rectangle(-self.half_width, self.half_width, -self.half_height, self.half_height)
    }

    /// Texture value where the ray `origin + s * dir` (camera-1 frame) hits the target.
    fn hit(&self, origin: &Vector3<f64>, dir: &Vector3<f64>) -> Option<(f64, f64)> {
        let o = self.pose.inverse_transform(origin);
        let d = self.pose.inverse_rotate(dir);
        if d.z.abs() < 1e-12 {
            return None;
        }
        let s = -o.z / d.z;
        if s <= 0.0 {
            return None;
        }
        let p = o + d * s;
        if p.x.abs() > self.half_width || p.y.abs() > self.half_height {
            return None;
        }
        Some((self.texture.sample(p.x, p.y), s))
    }
}

/// Axis-aligned rectangle on the target plane, ordered for [`plane_distance_grid`].
pub fn rectangle(x_min: f64, x_max: f64, y_min: f64, y_max: f64) -> Vec<Vector3<f64>> {
    vec![
        Vector3::new(x_min, y_min, 0.0),
        Vector3::new(x_max, y_min, 0.0),
        Vector3::new(x_max, y_max, 0.0),
        Vector3::new(x_min, y_max, 0.0),
    ]
}

/// Render the target over a background at infinite depth.
///
/// `camera_pose` maps the rendering camera's coordinates into camera 1.
/// The background is textured by viewing direction (azimuth, elevation in
/// radians), so it does not move under translation.
pub fn render_view<C: CameraModel>(
    camera: &C,
    camera_pose: &Transformation,
    width: u32,
    height: u32,
    target: &PlanarTarget,
    background: &NoiseTexture,
) -> GrayImage {
    let origin = camera_pose.trans();
    GrayImage::from_fn(width, height, |x, y| {
        let mut acc = 0.0;
        for (dx, dy) in SUPERSAMPLE {
            let pixel = Point2::new(x as f64 + dx, y as f64 + dy);
            let Some(ray) = camera.reconstruct_point(&pixel) else {
                continue;
            };
            let dir = camera_pose.rotate(&ray);
            acc += match target.hit(&origin, &dir) {
                Some((value, _)) => value,
                None => {
                    let azimuth = dir.x.atan2(dir.z);
                    let elevation = dir.y.atan2(dir.x.hypot(dir.z));
                    background.sample(azimuth, elevation)
                }
            };
        }
        Luma([(acc / SUPERSAMPLE.len() as f64).round().clamp(0.0, 255.0) as u8])
    })
}

/// Ground-truth distance on the stereo grid for a convex polygon lying on a plane.
///
/// `plane_pose` maps plane coordinates (plane `z = 0`, normal `+z` pointing
/// away from camera 1) into camera 1, and `polygon` holds the corners in
/// plane coordinates, ordered so that every edge `p_i × p_{i+1}` (in camera
/// coordinates) faces the interior. Cells off the polygon get `0.0`.
pub fn plane_distance_grid<C: CameraModel>(
    camera: &C,
    params: &StereoParameters,
    plane_pose: &Transformation,
    polygon: &[Vector3<f64>],
) -> DistanceGrid {
    let mut grid = DistanceGrid::for_params(params);
    let t = plane_pose.trans();
    let z = plane_pose.rotation_matrix().column(2).into_owned();
    let corners = plane_pose.transform_points(polygon);
    let edge_normals: Vec<Vector3<f64>> = (0..corners.len())
        .map(|i| corners[i].cross(&corners[(i + 1) % corners.len()]))
        .collect();

    for v in 0..grid.height {
        for u in 0..grid.width {
            let pixel = Point2::new(params.u_img(u) as f64, params.v_img(v) as f64);
            let Some(ray) = camera.reconstruct_point(&pixel) else {
                continue;
            };
            let zray = z.dot(&ray);
            if zray < 1e-3 {
                continue;
            }
            if edge_normals.iter().any(|n| ray.dot(n) < 0.0) {
                continue;
            }
            grid.set(u, v, t.dot(&z) / zray);
        }
    }
    grid
}
