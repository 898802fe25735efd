use nalgebra::{Matrix3, Matrix4, Vector3, Vector4};
use ndarray::Array2;

use crate::error::RegistrationError;

const RIGID_DET_EPSILON: f64 = 1e-4;

/// A 4x4 rigid transform `[R | t; 0 0 0 1]`.
///
/// Stored as a plain `Matrix4<f64>` rather than an `Isometry3` because the
/// core must be able to *fail* rigidity validation on arbitrary input
/// matrices (`invert_rigid` on a non-rigid matrix): an `Isometry3` cannot
/// represent that invalid state in the first place, so it can't surface the
/// failure mode spec'd for this component.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform(Matrix4<f64>);

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform {
    /// The identity transform: zero translation, identity rotation.
    pub fn identity() -> Self {
        Self(Matrix4::identity())
    }

    /// Builds a transform from rotation and translation parts, without
    /// validating rigidity. Use [`Transform::rotation_determinant`] or
    /// [`Transform::invert_rigid`] if validation is needed.
    pub fn from_rotation_translation(r: Matrix3<f64>, t: Vector3<f64>) -> Self {
        let mut m = Matrix4::identity();
        m.fixed_slice_mut::<3, 3>(0, 0).copy_from(&r);
        m.fixed_slice_mut::<3, 1>(0, 3).copy_from(&t);
        Self(m)
    }

    /// Builds a transform from a raw 4x4 matrix. The bottom row is forced to
    /// `[0,0,0,1]` — callers that need to detect a malformed bottom row
    /// should inspect the matrix themselves before calling this.
    pub fn from_matrix4(mut m: Matrix4<f64>) -> Self {
        m.set_row(3, &Vector4::new(0.0, 0.0, 0.0, 1.0).transpose());
        Self(m)
    }

    pub fn as_matrix4(&self) -> Matrix4<f64> {
        self.0
    }

    pub fn rotation(&self) -> Matrix3<f64> {
        self.0.fixed_slice::<3, 3>(0, 0).into_owned()
    }

    pub fn translation(&self) -> Vector3<f64> {
        self.0.fixed_slice::<3, 1>(0, 3).into_owned()
    }

    /// `det(R)`, used by rigidity checks and by the handedness-correction
    /// steps in PCA and Kabsch.
    pub fn rotation_determinant(&self) -> f64 {
        self.rotation().determinant()
    }

    /// `true` if every entry is finite.
    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }

    /// Composes two transforms: `self` applied after `rhs`, i.e.
    /// `compose(self, rhs).apply(p) == self.apply(rhs.apply(p))`.
    pub fn compose(&self, rhs: &Transform) -> Transform {
        Transform(self.0 * rhs.0)
    }

    /// Inverts a rigid transform: `[Rᵀ | -Rᵀt; 0 0 0 1]`.
    ///
    /// Fails with [`RegistrationError::NonRigidInput`] if
    /// `|det(R) - 1| > 1e-4`.
    pub fn invert_rigid(&self) -> Result<Transform, RegistrationError> {
        let det = self.rotation_determinant();
        let det_error = (det - 1.0).abs();
        if det_error > RIGID_DET_EPSILON {
            return Err(RegistrationError::NonRigidInput { det_error });
        }
        let r_t = self.rotation().transpose();
        let t = -(r_t * self.translation());
        Ok(Transform::from_rotation_translation(r_t, t))
    }

    /// `p' = R*p + t`.
    pub fn apply_to_point(&self, p: [f32; 3]) -> [f32; 3] {
        let p64 = Vector3::new(p[0] as f64, p[1] as f64, p[2] as f64);
        let out = self.rotation() * p64 + self.translation();
        [out[0] as f32, out[1] as f32, out[2] as f32]
    }

    /// Transforms an `(n, 3)` array into a newly allocated array.
    pub fn apply_to_cloud(&self, points: &Array2<f32>) -> Array2<f32> {
        let mut out = points.clone();
        self.apply_to_cloud_slice(
            points
                .as_slice()
                .expect("point arrays are always contiguous row-major"),
            out.as_slice_mut()
                .expect("point arrays are always contiguous row-major"),
        );
        out
    }

    /// Transforms the flat `(3*n)` buffer `src` into caller-owned `dst`.
    /// `dst.len()` must equal `src.len()`. Does not allocate.
    pub fn apply_to_cloud_slice(&self, src: &[f32], dst: &mut [f32]) {
        debug_assert_eq!(src.len(), dst.len());
        debug_assert_eq!(src.len() % 3, 0);
        let r = self.rotation();
        let t = self.translation();
        for (chunk_in, chunk_out) in src.chunks_exact(3).zip(dst.chunks_exact_mut(3)) {
            let p = Vector3::new(chunk_in[0] as f64, chunk_in[1] as f64, chunk_in[2] as f64);
            let out = r * p + t;
            chunk_out[0] = out[0] as f32;
            chunk_out[1] = out[1] as f32;
            chunk_out[2] = out[2] as f32;
        }
    }
}

impl std::ops::Mul<&Transform> for &Transform {
    type Output = Transform;

    /// `self * rhs`, i.e. `rhs` is applied first. Equivalent to
    /// [`Transform::compose`].
    fn mul(self, rhs: &Transform) -> Transform {
        self.compose(rhs)
    }
}

impl From<&Transform> for Matrix4<f64> {
    fn from(t: &Transform) -> Self {
        t.0
    }
}
