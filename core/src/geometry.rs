use nalgebra::{Matrix3, Matrix4, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Rigid transform mapping frame-2 coordinates into frame 1: `X1 = R * X2 + t`.
///
/// Used as the pose of camera 2 expressed in camera 1, so `trans()` is the
/// optical center of camera 2 seen from camera 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transformation {
    pub rotation: UnitQuaternion<f64>,
    pub translation: Vector3<f64>,
}

impl Transformation {
    pub fn new(rotation: UnitQuaternion<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// Translation followed by a rotation vector (axis times angle).
    pub fn from_xyz_rotation_vector(x: f64, y: f64, z: f64, rx: f64, ry: f64, rz: f64) -> Self {
        Self {
            rotation: UnitQuaternion::from_scaled_axis(Vector3::new(rx, ry, rz)),
            translation: Vector3::new(x, y, z),
        }
    }

    pub fn from_translation(translation: Vector3<f64>) -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            translation,
        }
    }

    pub fn identity() -> Self {
        Self::default()
    }

    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        *self.rotation.to_rotation_matrix().matrix()
    }

    pub fn rotation_matrix_inv(&self) -> Matrix3<f64> {
        self.rotation_matrix().transpose()
    }

    pub fn trans(&self) -> Vector3<f64> {
        self.translation
    }

    /// Translation of the inverse transform, `-R^T t`.
    pub fn trans_inv(&self) -> Vector3<f64> {
        -(self.rotation.inverse() * self.translation)
    }

    pub fn matrix(&self) -> Matrix4<f64> {
        let mut m = Matrix4::identity();
        m.fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&self.rotation_matrix());
        m.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.translation);
        m
    }

    pub fn inverse(&self) -> Self {
        let r_inv = self.rotation.inverse();
        Self {
            rotation: r_inv,
            translation: -(r_inv * self.translation),
        }
    }

    /// `self * other`: first apply `other`, then `self`.
    pub fn compose(&self, other: &Self) -> Self {
        Self {
            rotation: self.rotation * other.rotation,
            translation: self.rotation * other.translation + self.translation,
        }
    }

    /// `self^-1 * other`.
    pub fn inverse_compose(&self, other: &Self) -> Self {
        self.inverse().compose(other)
    }

    pub fn transform(&self, point: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * point + self.translation
    }

    pub fn inverse_transform(&self, point: &Vector3<f64>) -> Vector3<f64> {
        self.rotation.inverse() * (point - self.translation)
    }

    pub fn rotate(&self, vector: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * vector
    }

    pub fn inverse_rotate(&self, vector: &Vector3<f64>) -> Vector3<f64> {
        self.rotation.inverse() * vector
    }

    pub fn transform_points(&self, points: &[Vector3<f64>]) -> Vec<Vector3<f64>> {
        points.iter().map(|p| self.transform(p)).collect()
    }

    pub fn inverse_rotate_points(&self, vectors: &[Vector3<f64>]) -> Vec<Vector3<f64>> {
        let r_inv = self.rotation.inverse();
        vectors.iter().map(|v| r_inv * v).collect()
    }
}

impl Default for Transformation {
    fn default() -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            translation: Vector3::zeros(),
        }
    }
}
