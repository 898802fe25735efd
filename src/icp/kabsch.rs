//! Closed-form optimal rigid transform between two paired point sets.

use nalgebra::{Matrix3, Vector3};

use crate::error::RegistrationError;
use crate::svd3::svd3;
use crate::transform::Transform;

const ROTATION_ENTRY_BOUND: f64 = 10.0;
const NEAR_IDENTITY_TOLERANCE: f64 = 0.5;
const WEAK_SIGNAL_RMSE_CEILING: f64 = 0.1;

/// Solves for the rigid transform minimizing `sum |R*s_i + t - t_i|^2` over
/// paired `source`/`target` points, via SVD of their cross-covariance.
///
/// `current_rmse` gates the translation-only fallback (spec'd for
/// partial-overlap cases where the rotational signal from a near-identity
/// `R` is noise rather than real structure): the fallback only fires while
/// residuals are still large enough that a wrong rotation would hurt more
/// than a missed one.
pub fn solve(
    paired_source: &[[f32; 3]],
    paired_target: &[[f32; 3]],
    current_rmse: f64,
) -> Result<Transform, RegistrationError> {
    debug_assert_eq!(paired_source.len(), paired_target.len());
    let n = paired_source.len() as f64;

    let mut centroid_s = Vector3::zeros();
    let mut centroid_t = Vector3::zeros();
    for (s, t) in paired_source.iter().zip(paired_target) {
        centroid_s += Vector3::new(s[0] as f64, s[1] as f64, s[2] as f64);
        centroid_t += Vector3::new(t[0] as f64, t[1] as f64, t[2] as f64);
    }
    centroid_s /= n;
    centroid_t /= n;

    let mut h = Matrix3::zeros();
    for (s, t) in paired_source.iter().zip(paired_target) {
        let sc = Vector3::new(s[0] as f64, s[1] as f64, s[2] as f64) - centroid_s;
        let tc = Vector3::new(t[0] as f64, t[1] as f64, t[2] as f64) - centroid_t;
        h += sc * tc.transpose();
    }

    let svd = svd3(&h)?;
    let mut v = svd.v;
    let mut r = v * svd.u.transpose();
    if r.determinant() < 0.0 {
        negate_last_column(&mut v);
        r = v * svd.u.transpose();
    }

    if should_fall_back_to_translation(&r, current_rmse) {
        let mut mean_offset = Vector3::zeros();
        for (s, t) in paired_source.iter().zip(paired_target) {
            let sc = Vector3::new(s[0] as f64, s[1] as f64, s[2] as f64);
            let tc = Vector3::new(t[0] as f64, t[1] as f64, t[2] as f64);
            mean_offset += tc - sc;
        }
        mean_offset /= n;
        return Ok(Transform::from_rotation_translation(
            Matrix3::identity(),
            mean_offset,
        ));
    }

    let t = centroid_t - r * centroid_s;
    Ok(Transform::from_rotation_translation(r, t))
}

fn negate_last_column(v: &mut Matrix3<f64>) {
    let mut col = v.column_mut(2);
    col *= -1.0;
}

fn should_fall_back_to_translation(r: &Matrix3<f64>, current_rmse: f64) -> bool {
    let out_of_bounds = r.iter().any(|x| x.abs() > ROTATION_ENTRY_BOUND);
    let near_identity = (0..3).all(|i| (r[(i, i)] - 1.0).abs() <= NEAR_IDENTITY_TOLERANCE)
        && (0..3).all(|i| {
            (0..3)
                .filter(|&j| j != i)
                .all(|j| r[(i, j)].abs() <= NEAR_IDENTITY_TOLERANCE)
        });
    out_of_bounds || (near_identity && current_rmse > WEAK_SIGNAL_RMSE_CEILING)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn rotate_z_90(p: [f32; 3]) -> [f32; 3] {
        [-p[1], p[0], p[2]]
    }

    #[test]
    fn recovers_exact_rotation() {
        let source = [[1.0f32, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0], [1.0, 1.0, 1.0]];
        let target: Vec<[f32; 3]> = source.iter().map(|p| rotate_z_90(*p)).collect();
        let transform = solve(&source, &target, 10.0).unwrap();
        for p in source {
            let got = transform.apply_to_point(p);
            let expected = rotate_z_90(p);
            assert_relative_eq!(got[0], expected[0], epsilon = 1e-4);
            assert_relative_eq!(got[1], expected[1], epsilon = 1e-4);
            assert_relative_eq!(got[2], expected[2], epsilon = 1e-4);
        }
    }

    #[test]
    fn recovers_pure_translation() {
        let source = [[0.0f32, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        let target: Vec<[f32; 3]> = source
            .iter()
            .map(|p| [p[0] + 2.0, p[1] - 1.0, p[2] + 0.5])
            .collect();
        let transform = solve(&source, &target, 10.0).unwrap();
        let t = transform.translation();
        assert_relative_eq!(t[0], 2.0, epsilon = 1e-4);
        assert_relative_eq!(t[1], -1.0, epsilon = 1e-4);
        assert_relative_eq!(t[2], 0.5, epsilon = 1e-4);
    }

    #[test]
    fn falls_back_to_translation_when_rotation_signal_is_weak_and_rmse_high() {
        let source = [[0.0f32, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        // Near-identity rotation plus a translation; with a high current
        // RMSE the weak rotational signal should be discarded.
        let target: Vec<[f32; 3]> = source
            .iter()
            .map(|p| [p[0] + 3.0, p[1] + 3.0, p[2] + 3.0])
            .collect();
        let transform = solve(&source, &target, 5.0).unwrap();
        assert_relative_eq!(transform.rotation(), Matrix3::identity(), epsilon = 1e-9);
    }
}
