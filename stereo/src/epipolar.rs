//! Analytic epipolar curves of an EUCM camera pair.
//!
//! Every plane through the baseline images to a conic in camera 2. The
//! planes are enumerated by a direction `X` orthogonal to the baseline,
//! swept over a half turn in `N` buckets: the first half parameterizes
//! `X = xBase + s * yBase` ("tangent"), the second `X = c * xBase + yBase`
//! ("cotangent") so that neither parameter blows up. Entry `N` repeats
//! entry 0, which lets lookups round up without wrapping.

use crate::rasterizer::Heading;
use crate::{Error, Result};
use gcam_core::{CameraModel, Eucm, Transformation};
use nalgebra::{Point2, Vector3};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Below this ratio the epipolar plane nearly contains the projection
/// center and the conic collapses to a straight line.
const LINE_RATIO_THRESHOLD: f64 = 0.5;

/// Rays closer than this to the baseline fall back to bucket 0.
const MIN_LOOKUP_NORM: f64 = 1e-4;

/// Implicit conic `kuu u² + kuv uv + kvv v² + ku u + kv v + k1 = 0`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Conic {
    pub kuu: f64,
    pub kuv: f64,
    pub kvv: f64,
    pub ku: f64,
    pub kv: f64,
    pub k1: f64,
}

impl Conic {
    /// Straight line `ku u + kv v + k1 = 0`.
    pub fn line(ku: f64, kv: f64, k1: f64) -> Self {
        Self {
            ku,
            kv,
            k1,
            ..Self::default()
        }
    }

    #[inline]
    pub fn eval(&self, u: f64, v: f64) -> f64 {
        self.kuu * u * u + self.kuv * u * v + self.kvv * v * v + self.ku * u + self.kv * v + self.k1
    }

    /// Partial derivatives `(dF/du, dF/dv)`.
    #[inline]
    pub fn gradient(&self, u: f64, v: f64) -> (f64, f64) {
        (
            2.0 * self.kuu * u + self.kuv * v + self.ku,
            self.kuv * u + 2.0 * self.kvv * v + self.kv,
        )
    }

    pub fn is_line(&self) -> bool {
        self.kuu == 0.0 && self.kuv == 0.0 && self.kvv == 0.0
    }

    /// Set `k1` so that the curve passes through `point`.
    pub fn pass_through(&mut self, point: &Point2<f64>) {
        self.k1 = 0.0;
        self.k1 = -self.eval(point.x, point.y);
    }
}

/// Circular table of epipolar conics in image 2 for a fixed relative pose.
#[derive(Debug, Clone)]
pub struct EpipolarCurves {
    x_base: Vector3<f64>,
    y_base: Vector3<f64>,
    z_base: Vector3<f64>,
    step: f64,
    num_buckets: usize,
    epipole: Point2<f64>,
    heading: Heading,
    curves: Vec<Conic>,
}

impl EpipolarCurves {
    /// `transform` maps camera-2 coordinates into camera 1 (`X1 = R X2 + t`).
    ///
    /// Only camera 2 enters the curves: they live in image 2 and the
    /// lookup works on rays already expressed in camera 1.
    pub fn new(transform: &Transformation, cam2: &Eucm, num_buckets: usize) -> Result<Self> {
        if num_buckets == 0 || num_buckets % 2 != 0 {
            return Err(Error::invalid_parameters(format!(
                "number of epipolar buckets must be even and positive, got {num_buckets}"
            )));
        }
        let z_base = -transform
            .trans()
            .try_normalize(f64::EPSILON)
            .ok_or_else(|| Error::degenerate("zero baseline has no epipolar geometry"))?;
        let x_base = least_aligned_axis(&z_base);
        let y_base = z_base.cross(&x_base);

        let r21 = transform.rotation_matrix_inv();
        let t21n = r21 * z_base;

        let (epipole, heading) = match cam2.project_point(&t21n) {
            Some(px) => (px, Heading::Toward),
            None => match cam2.project_point(&(-t21n)) {
                Some(px) => (px, Heading::Away),
                None => {
                    return Err(Error::degenerate(
                        "neither the epipole nor its antipode projects into camera 2",
                    ))
                }
            },
        };

        let step = 4.0 / num_buckets as f64;
        let half = num_buckets / 2;
        let mut curves = Vec::with_capacity(num_buckets + 1);
        for idx in 0..num_buckets {
            let x = r21 * bucket_plane_direction(&x_base, &y_base, step, half, idx);
            let normal = x.cross(&t21n);
            curves.push(conic_from_plane(&normal, cam2, &epipole));
        }
        curves.push(curves[0]);

        debug!(
            num_buckets,
            epipole_u = epipole.x,
            epipole_v = epipole.y,
            ?heading,
            "epipolar curves initialised"
        );

        Ok(Self {
            x_base,
            y_base,
            z_base,
            step,
            num_buckets,
            epipole,
            heading,
            curves,
        })
    }

    /// Bucket of a ray expressed in camera 1. Prefers the tangent branch on ties.
    pub fn index(&self, ray: &Vector3<f64>) -> usize {
        let c = ray.dot(&self.x_base);
        let s = ray.dot(&self.y_base);
        let (ac, as_) = (c.abs(), s.abs());
        if ac + as_ < MIN_LOOKUP_NORM {
            return 0;
        }
        let idx = if ac >= as_ {
            ((s / c + 1.0) / self.step).round()
        } else {
            ((1.0 - c / s) / self.step).round() + (self.num_buckets / 2) as f64
        };
        (idx.max(0.0) as usize).min(self.num_buckets)
    }

    pub fn curve(&self, idx: usize) -> &Conic {
        &self.curves[idx.min(self.num_buckets)]
    }

    pub fn curve_for_direction(&self, ray: &Vector3<f64>) -> &Conic {
        &self.curves[self.index(ray)]
    }

    /// Direction in camera 1 that generated bucket `idx`.
    pub fn bucket_direction(&self, idx: usize) -> Vector3<f64> {
        bucket_plane_direction(
            &self.x_base,
            &self.y_base,
            self.step,
            self.num_buckets / 2,
            idx % self.num_buckets,
        )
    }

    pub fn epipole(&self) -> Point2<f64> {
        self.epipole
    }

    pub fn epipole_px(&self) -> (i32, i32) {
        (self.epipole.x.round() as i32, self.epipole.y.round() as i32)
    }

    /// Which way disparity runs relative to the stored epipole.
    pub fn heading(&self) -> Heading {
        self.heading
    }

    pub fn bases(&self) -> (Vector3<f64>, Vector3<f64>, Vector3<f64>) {
        (self.x_base, self.y_base, self.z_base)
    }

    pub fn num_buckets(&self) -> usize {
        self.num_buckets
    }

    pub fn curves(&self) -> &[Conic] {
        &self.curves
    }
}

/// Coordinate axis least aligned with `z`, orthogonalized against it.
fn least_aligned_axis(z: &Vector3<f64>) -> Vector3<f64> {
    // ties resolve in the order z, x, y
    let mut axis = 2;
    for candidate in [0, 1] {
        if z[candidate].abs() < z[axis].abs() {
            axis = candidate;
        }
    }
    let mut x = Vector3::zeros();
    x[axis] = 1.0;
    (x - z * z.dot(&x)).normalize()
}

fn bucket_plane_direction(
    x_base: &Vector3<f64>,
    y_base: &Vector3<f64>,
    step: f64,
    half: usize,
    idx: usize,
) -> Vector3<f64> {
    if idx < half {
        let s = step * idx as f64 - 1.0;
        x_base + y_base * s
    } else {
        let c = step * (half as f64 - idx as f64) + 1.0;
        x_base * c + y_base
    }
}

/// Image of the plane through camera 2's center with the given normal.
fn conic_from_plane(normal: &Vector3<f64>, cam: &Eucm, epipole: &Point2<f64>) -> Conic {
    let (a, b, c) = (normal.x, normal.y, normal.z);
    let (fu, fv, u0, v0) = (cam.fu, cam.fv, cam.u0, cam.v0);
    let gamma = 1.0 - cam.alpha;
    let ag = cam.alpha - gamma;
    let a2b = cam.alpha * cam.alpha * cam.beta;

    let (aa, bb, cc) = (a * a, b * b, c * c);
    let fufv = fu * fv;
    let ccfufv = cc * fufv;

    let mut conic = if ccfufv / (aa + bb) < LINE_RATIO_THRESHOLD {
        Conic::line(a / fu, b / fv, 0.0)
    } else {
        Conic {
            kuu: (aa * ag + cc * a2b) / (cc * fu * fu),
            kuv: 2.0 * a * b * ag / ccfufv,
            kvv: (bb * ag + cc * a2b) / (cc * fv * fv),
            ku: 2.0 * (-(aa * fv * u0 + a * b * fu * v0) * ag - a * c * fufv * gamma - cc * a2b * fv * u0)
                / (ccfufv * fu),
            kv: 2.0 * (-(bb * fu * v0 + a * b * fv * u0) * ag - b * c * fufv * gamma - cc * a2b * fu * v0)
                / (ccfufv * fv),
            k1: 0.0,
        }
    };
    conic.pass_through(epipole);
    conic
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> Eucm {
        Eucm::new(0.6, 1.1, 250.0, 245.0, 320.0, 240.0)
    }

    fn oblique_pose() -> Transformation {
        Transformation::from_xyz_rotation_vector(0.3, 0.05, 0.02, 0.02, -0.1, 0.05)
    }

    fn residual(conic: &Conic, px: &Point2<f64>) -> f64 {
        let (gu, gv) = conic.gradient(px.x, px.y);
        conic.eval(px.x, px.y) / (gu * gu + gv * gv).sqrt().max(1e-12)
    }

    #[test]
    fn test_every_curve_passes_through_epipole() {
        let curves = EpipolarCurves::new(&oblique_pose(), &camera(), 200).unwrap();
        let e = curves.epipole();
        for conic in curves.curves() {
            let scale = conic.k1.abs().max(1.0);
            assert!(conic.eval(e.x, e.y).abs() < 1e-9 * scale);
        }
    }

    #[test]
    fn test_table_wraps_around() {
        let curves = EpipolarCurves::new(&oblique_pose(), &camera(), 100).unwrap();
        assert_eq!(curves.curves().len(), 101);
        assert_eq!(curves.curve(100), curves.curve(0));
    }

    #[test]
    fn test_bucket_direction_maps_back_to_its_bucket() {
        let curves = EpipolarCurves::new(&oblique_pose(), &camera(), 200).unwrap();
        for idx in 0..200 {
            let ray = curves.bucket_direction(idx);
            assert_eq!(curves.index(&ray), idx);
            // the opposite ray spans the same plane
            let back = curves.index(&(-ray));
            assert_eq!(back, idx);
        }
        // rays along the baseline have no plane of their own
        let (_, _, z) = curves.bases();
        assert_eq!(curves.index(&z), 0);
    }

    #[test]
    fn test_tie_prefers_tangent_branch() {
        let curves = EpipolarCurves::new(&oblique_pose(), &camera(), 200).unwrap();
        let (x, y, _) = curves.bases();
        assert_eq!(curves.index(&(x + y)), 100);
        assert_eq!(curves.index(&(x - y)), 0);
    }

    #[test]
    fn test_points_of_the_plane_lie_on_its_curve() {
        let pose = oblique_pose();
        let cam = camera();
        let curves = EpipolarCurves::new(&pose, &cam, 400).unwrap();
        let t = pose.trans();
        for idx in (0..400).step_by(37) {
            let dir = curves.bucket_direction(idx);
            let conic = curves.curve(idx);
            if conic.is_line() {
                continue;
            }
            for &(lambda, mu) in &[(1.0, 0.0), (2.0, 0.3), (5.0, -0.4), (0.7, 0.2)] {
                let point1 = dir * lambda + t.normalize() * mu;
                let point2 = pose.inverse_transform(&point1);
                if let Some(px) = cam.project_point(&point2) {
                    assert!(residual(conic, &px).abs() < 1e-6, "bucket {idx}");
                }
            }
        }
    }

    #[test]
    fn test_unified_model_gives_circles() {
        let cam = Eucm::new(0.5, 1.0, 200.0, 200.0, 320.0, 240.0);
        let pose = Transformation::from_translation(Vector3::new(0.2, 0.0, 0.0));
        let curves = EpipolarCurves::new(&pose, &cam, 100).unwrap();
        for conic in curves.curves().iter().filter(|c| !c.is_line()) {
            assert!(conic.kuv.abs() < 1e-12);
            assert!((conic.kuu - conic.kvv).abs() < 1e-12);
        }
        // the plane through the optical axis images to a line
        assert!(curves.curves().iter().any(|c| c.is_line()));
    }

    #[test]
    fn test_sideways_motion_heads_toward_epipole() {
        let cam = Eucm::new(0.5, 1.0, 100.0, 100.0, 80.0, 60.0);
        let pose = Transformation::from_translation(Vector3::new(0.2, 0.0, 0.0));
        let curves = EpipolarCurves::new(&pose, &cam, 100).unwrap();
        assert_eq!(curves.heading(), Heading::Toward);
        assert_eq!(curves.epipole_px(), (-120, 60));
    }

    #[test]
    fn test_forward_motion_uses_antipodal_epipole() {
        let cam = Eucm::new(0.6, 1.0, 100.0, 100.0, 80.0, 60.0);
        let pose = Transformation::from_translation(Vector3::new(0.0, 0.0, 0.5));
        let curves = EpipolarCurves::new(&pose, &cam, 100).unwrap();
        assert_eq!(curves.heading(), Heading::Away);
        assert_eq!(curves.epipole_px(), (80, 60));
    }

    #[test]
    fn test_degenerate_configurations() {
        let cam = camera();
        assert!(matches!(
            EpipolarCurves::new(&Transformation::identity(), &cam, 100),
            Err(Error::DegenerateGeometry(_))
        ));
        assert!(matches!(
            EpipolarCurves::new(&oblique_pose(), &cam, 101),
            Err(Error::InvalidParameters(_))
        ));
    }
}
