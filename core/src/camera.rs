//! Camera projection models.
//!
//! A closed set of models behind [`CameraModel`]: the enhanced unified camera
//! model (EUCM) used for wide field of view lenses, and a plain pinhole.
//! Rays returned by `reconstruct_point` are unit length.

use crate::{Error, Result};
use nalgebra::{Matrix2x3, Point2, Vector3};
use serde::{Deserialize, Serialize};

/// Smallest admissible projection denominator.
const MIN_DENOMINATOR: f64 = 1e-3;

/// Pinhole points closer than this to the image plane are rejected.
const MIN_PINHOLE_DEPTH: f64 = 1e-2;

pub trait CameraModel {
    /// Project a point in camera coordinates onto the image.
    fn project_point(&self, point: &Vector3<f64>) -> Option<Point2<f64>>;

    /// Back-project a pixel to a unit viewing ray.
    fn reconstruct_point(&self, pixel: &Point2<f64>) -> Option<Vector3<f64>>;

    /// Derivative of the projected pixel with respect to the 3D point.
    fn projection_jacobian(&self, point: &Vector3<f64>) -> Option<Matrix2x3<f64>>;

    /// Intrinsic parameter vector in model order.
    fn params(&self) -> Vec<f64>;

    fn project_points(&self, points: &[Vector3<f64>]) -> Vec<Option<Point2<f64>>> {
        points.iter().map(|p| self.project_point(p)).collect()
    }

    fn reconstruct_points(&self, pixels: &[Point2<f64>]) -> Vec<Option<Vector3<f64>>> {
        pixels.iter().map(|p| self.reconstruct_point(p)).collect()
    }
}

/// Enhanced unified camera model, parameters `[alpha, beta, fu, fv, u0, v0]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Eucm {
    pub alpha: f64,
    pub beta: f64,
    pub fu: f64,
    pub fv: f64,
    pub u0: f64,
    pub v0: f64,
}

impl Eucm {
    pub fn new(alpha: f64, beta: f64, fu: f64, fv: f64, u0: f64, v0: f64) -> Self {
        Self {
            alpha,
            beta,
            fu,
            fv,
            u0,
            v0,
        }
    }

    pub fn from_params(params: &[f64]) -> Result<Self> {
        if params.len() != 6 {
            return Err(Error::invalid_parameters(format!(
                "EUCM expects 6 parameters, got {}",
                params.len()
            )));
        }
        if params.iter().any(|p| !p.is_finite()) {
            return Err(Error::invalid_parameters(
                "EUCM parameters must be finite",
            ));
        }
        let model = Self::new(params[0], params[1], params[2], params[3], params[4], params[5]);
        if !(0.0..=1.0).contains(&model.alpha) {
            return Err(Error::invalid_parameters(format!(
                "EUCM alpha must lie in [0, 1], got {}",
                model.alpha
            )));
        }
        if model.beta <= 0.0 {
            return Err(Error::invalid_parameters(format!(
                "EUCM beta must be positive, got {}",
                model.beta
            )));
        }
        if model.fu <= 0.0 || model.fv <= 0.0 {
            return Err(Error::invalid_parameters(
                "EUCM focal lengths must be positive",
            ));
        }
        Ok(model)
    }

    fn denominator(&self, point: &Vector3<f64>) -> (f64, f64) {
        let (x, y, z) = (point.x, point.y, point.z);
        let d = (self.beta * (x * x + y * y) + z * z).sqrt();
        (d, self.alpha * d + (1.0 - self.alpha) * z)
    }
}

impl CameraModel for Eucm {
    fn project_point(&self, point: &Vector3<f64>) -> Option<Point2<f64>> {
        let (_, den) = self.denominator(point);
        if !(den >= MIN_DENOMINATOR) {
            return None;
        }
        if self.alpha > 0.5 && point.z < den * (self.alpha - 1.0) / (2.0 * self.alpha - 1.0) {
            return None;
        }
        Some(Point2::new(
            self.fu * point.x / den + self.u0,
            self.fv * point.y / den + self.v0,
        ))
    }

    fn reconstruct_point(&self, pixel: &Point2<f64>) -> Option<Vector3<f64>> {
        let mx = (pixel.x - self.u0) / self.fu;
        let my = (pixel.y - self.v0) / self.fv;
        let r2 = mx * mx + my * my;
        let det = 1.0 - (2.0 * self.alpha - 1.0) * self.beta * r2;
        if det < 0.0 {
            return None;
        }
        let mz = (1.0 - self.alpha * self.alpha * self.beta * r2)
            / (self.alpha * det.sqrt() + 1.0 - self.alpha);
        Vector3::new(mx, my, mz).try_normalize(f64::EPSILON)
    }

    fn projection_jacobian(&self, point: &Vector3<f64>) -> Option<Matrix2x3<f64>> {
        let (d, den) = self.denominator(point);
        if !(den >= MIN_DENOMINATOR) || d <= 0.0 {
            return None;
        }
        let (x, y, z) = (point.x, point.y, point.z);
        let dden_dx = self.alpha * self.beta * x / d;
        let dden_dy = self.alpha * self.beta * y / d;
        let dden_dz = self.alpha * z / d + 1.0 - self.alpha;
        let den2 = den * den;
        Some(Matrix2x3::new(
            self.fu * (den - x * dden_dx) / den2,
            -self.fu * x * dden_dy / den2,
            -self.fu * x * dden_dz / den2,
            -self.fv * y * dden_dx / den2,
            self.fv * (den - y * dden_dy) / den2,
            -self.fv * y * dden_dz / den2,
        ))
    }

    fn params(&self) -> Vec<f64> {
        vec![self.alpha, self.beta, self.fu, self.fv, self.u0, self.v0]
    }
}

/// Pinhole camera, parameters `[u0, v0, f]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pinhole {
    pub u0: f64,
    pub v0: f64,
    pub f: f64,
}

impl Pinhole {
    pub fn new(u0: f64, v0: f64, f: f64) -> Self {
        Self { u0, v0, f }
    }
}

impl CameraModel for Pinhole {
    fn project_point(&self, point: &Vector3<f64>) -> Option<Point2<f64>> {
        if point.z < MIN_PINHOLE_DEPTH {
            return None;
        }
        Some(Point2::new(
            point.x * self.f / point.z + self.u0,
            point.y * self.f / point.z + self.v0,
        ))
    }

    fn reconstruct_point(&self, pixel: &Point2<f64>) -> Option<Vector3<f64>> {
        Vector3::new((pixel.x - self.u0) / self.f, (pixel.y - self.v0) / self.f, 1.0)
            .try_normalize(f64::EPSILON)
    }

    fn projection_jacobian(&self, point: &Vector3<f64>) -> Option<Matrix2x3<f64>> {
        if point.z < MIN_PINHOLE_DEPTH {
            return None;
        }
        let z = point.z;
        let zz = z * z;
        Some(Matrix2x3::new(
            self.f / z,
            0.0,
            -point.x * self.f / zz,
            0.0,
            self.f / z,
            -point.y * self.f / zz,
        ))
    }

    fn params(&self) -> Vec<f64> {
        vec![self.u0, self.v0, self.f]
    }
}

/// Any supported camera model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Camera {
    Eucm(Eucm),
    Pinhole(Pinhole),
}

impl From<Eucm> for Camera {
    fn from(model: Eucm) -> Self {
        Self::Eucm(model)
    }
}

impl From<Pinhole> for Camera {
    fn from(model: Pinhole) -> Self {
        Self::Pinhole(model)
    }
}

impl CameraModel for Camera {
    fn project_point(&self, point: &Vector3<f64>) -> Option<Point2<f64>> {
        match self {
            Self::Eucm(c) => c.project_point(point),
            Self::Pinhole(c) => c.project_point(point),
        }
    }

    fn reconstruct_point(&self, pixel: &Point2<f64>) -> Option<Vector3<f64>> {
        match self {
            Self::Eucm(c) => c.reconstruct_point(pixel),
            Self::Pinhole(c) => c.reconstruct_point(pixel),
        }
    }

    fn projection_jacobian(&self, point: &Vector3<f64>) -> Option<Matrix2x3<f64>> {
        match self {
            Self::Eucm(c) => c.projection_jacobian(point),
            Self::Pinhole(c) => c.projection_jacobian(point),
        }
    }

    fn params(&self) -> Vec<f64> {
        match self {
            Self::Eucm(c) => c.params(),
            Self::Pinhole(c) => c.params(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fisheye() -> Eucm {
        Eucm::new(0.6, 1.1, 250.0, 260.0, 320.0, 240.0)
    }

    #[test]
    fn test_eucm_round_trip_through_pixel() {
        let cam = fisheye();
        for &(u, v) in &[(320.0, 240.0), (10.0, 15.0), (600.0, 400.0), (100.0, 470.0)] {
            let ray = cam.reconstruct_point(&Point2::new(u, v)).unwrap();
            assert!((ray.norm() - 1.0).abs() < 1e-12);
            let px = cam.project_point(&(ray * 3.5)).unwrap();
            assert!((px.x - u).abs() < 1e-9, "u {} vs {}", px.x, u);
            assert!((px.y - v).abs() < 1e-9, "v {} vs {}", px.y, v);
        }
    }

    #[test]
    fn test_eucm_rejects_points_behind() {
        let cam = fisheye();
        assert!(cam.project_point(&Vector3::new(0.0, 0.0, -1.0)).is_none());
        // alpha = 0.5 keeps the whole sphere except the back pole
        let ucm = Eucm::new(0.5, 1.0, 100.0, 100.0, 80.0, 60.0);
        assert!(ucm.project_point(&Vector3::new(-1.0, 0.0, 0.0)).is_some());
        assert!(ucm.project_point(&Vector3::new(0.0, 0.0, -1.0)).is_none());
    }

    #[test]
    fn test_eucm_jacobian_matches_finite_differences() {
        let cam = fisheye();
        let p = Vector3::new(0.3, -0.2, 1.4);
        let jac = cam.projection_jacobian(&p).unwrap();
        let h = 1e-6;
        for k in 0..3 {
            let mut dp = Vector3::zeros();
            dp[k] = h;
            let plus = cam.project_point(&(p + dp)).unwrap();
            let minus = cam.project_point(&(p - dp)).unwrap();
            let du = (plus.x - minus.x) / (2.0 * h);
            let dv = (plus.y - minus.y) / (2.0 * h);
            assert!((jac[(0, k)] - du).abs() < 1e-4);
            assert!((jac[(1, k)] - dv).abs() < 1e-4);
        }
    }

    #[test]
    fn test_eucm_from_params_validation() {
        assert!(Eucm::from_params(&[0.5, 1.0, 250.0, 250.0, 320.0, 240.0]).is_ok());
        assert!(Eucm::from_params(&[0.5, 1.0, 250.0]).is_err());
        assert!(Eucm::from_params(&[1.5, 1.0, 250.0, 250.0, 320.0, 240.0]).is_err());
        assert!(Eucm::from_params(&[0.5, 0.0, 250.0, 250.0, 320.0, 240.0]).is_err());
        assert!(Eucm::from_params(&[0.5, 1.0, f64::NAN, 250.0, 320.0, 240.0]).is_err());
    }

    #[test]
    fn test_camera_enum_dispatch() {
        let cam: Camera = Pinhole::new(320.0, 240.0, 500.0).into();
        let px = cam.project_point(&Vector3::new(1.0, 1.0, 5.0)).unwrap();
        assert!((px.x - 420.0).abs() < 1e-9);
        assert!((px.y - 340.0).abs() < 1e-9);
        assert_eq!(cam.params(), vec![320.0, 240.0, 500.0]);
    }
}
