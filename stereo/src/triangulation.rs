//! Two-ray midpoint triangulation.

use crate::{Error, Result};
use gcam_core::{CameraModel, Transformation};
use nalgebra::{Point2, Vector3};
use rayon::prelude::*;

/// Below this the two rays are treated as parallel.
const MIN_DETERMINANT: f64 = 1e-10;

/// Midpoint of the closest approach between `v1 * l1` and `t + v2 * l2`.
///
/// `v2` must already be expressed in the frame of `v1`.
pub fn triangulate_rays(v1: &Vector3<f64>, v2: &Vector3<f64>, t: &Vector3<f64>) -> Result<Vector3<f64>> {
    let v1v2 = v1.dot(v2);
    let v1v1 = v1.dot(v1);
    let v2v2 = v2.dot(v2);
    let tv1 = t.dot(v1);
    let tv2 = t.dot(v2);
    let delta = -v1v1 * v2v2 + v1v2 * v1v2;
    if delta.abs() < MIN_DETERMINANT {
        return Err(Error::degenerate(format!(
            "rays are parallel (determinant {delta:e})"
        )));
    }
    let l1 = (-tv1 * v2v2 + tv2 * v1v2) / delta;
    let l2 = (tv2 * v1v1 - tv1 * v1v2) / delta;
    Ok((v1 * l1 + t + v2 * l2) * 0.5)
}

/// Triangulates pixel pairs of a calibrated camera pair.
#[derive(Debug, Clone)]
pub struct Triangulator<C1, C2> {
    cam1: C1,
    cam2: C2,
    transform: Transformation,
}

impl<C1: CameraModel, C2: CameraModel> Triangulator<C1, C2> {
    /// `transform` maps camera-2 coordinates into camera 1.
    pub fn new(cam1: C1, cam2: C2, transform: Transformation) -> Self {
        Self {
            cam1,
            cam2,
            transform,
        }
    }

    /// 3-D point in camera 1 seen at `p1` in image 1 and `p2` in image 2.
    pub fn triangulate(&self, p1: &Point2<f64>, p2: &Point2<f64>) -> Result<Vector3<f64>> {
        let v1 = self.cam1.reconstruct_point(p1).ok_or_else(|| {
            Error::ProjectionFailure(format!("({}, {}) does not back-project in image 1", p1.x, p1.y))
        })?;
        let v2 = self.cam2.reconstruct_point(p2).ok_or_else(|| {
            Error::ProjectionFailure(format!("({}, {}) does not back-project in image 2", p2.x, p2.y))
        })?;
        triangulate_rays(&v1, &self.transform.rotate(&v2), &self.transform.trans())
    }

    pub fn distance(&self, p1: &Point2<f64>, p2: &Point2<f64>) -> Result<f64> {
        self.triangulate(p1, p2).map(|x| x.norm())
    }

    /// Batch version; failures stay in place.
    pub fn triangulate_pairs(&self, pairs: &[(Point2<f64>, Point2<f64>)]) -> Vec<Result<Vector3<f64>>>
    where
        C1: Sync,
        C2: Sync,
    {
        pairs.par_iter().map(|(p1, p2)| self.triangulate(p1, p2)).collect()
    }

    pub fn transform(&self) -> &Transformation {
        &self.transform
    }
}
