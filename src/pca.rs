//! Coarse rigid alignment from the principal axes of both clouds.

use nalgebra::{Matrix3, Vector3};
use ndarray::ArrayView2;
use rand::rngs::SmallRng;
use rand::seq::index::sample;
use rand::SeedableRng;

use crate::error::RegistrationError;
use crate::svd3::svd3;
use crate::transform::Transform;

const FINITE_CHECK_SAMPLE_SIZE: usize = 32;
const FINITE_CHECK_SEED: u64 = 0x5a17_u64;
const ROTATION_ENTRY_BOUND: f64 = 10.0;
/// Below this ratio of smallest-to-largest covariance singular value, the
/// axis basis is considered too close to singular to trust: the Jacobi
/// sweep's choice of eigenvector within the near-null subspace is arbitrary,
/// so `R` would be a valid rotation that nonetheless isn't the true
/// principal-axes alignment.
const SINGULAR_VALUE_RATIO_FLOOR: f64 = 1e-4;

/// Computes the PCA-based coarse alignment described in
/// [`crate::registration::register`]'s first stage.
///
/// Falls back to a centroid-only translation (`R = I`) and reports that via
/// `degenerate_axes` rather than failing the pipeline, per the design's
/// "never fail on a merely unreliable coarse guess" policy.
pub fn align(
    source: ArrayView2<f32>,
    target: ArrayView2<f32>,
) -> Result<(Transform, bool), RegistrationError> {
    let (centroid_s, cov_s) = centroid_and_covariance(source);
    let (centroid_t, cov_t) = centroid_and_covariance(target);

    let svd_s = svd3(&cov_s)?;
    let svd_t = svd3(&cov_t)?;

    let mut v_t = svd_t.v;
    let mut r = v_t * svd_s.v.transpose();
    if r.determinant() < 0.0 {
        negate_last_column(&mut v_t);
        r = v_t * svd_s.v.transpose();
    }
    let t = centroid_t - r * centroid_s;

    let candidate = Transform::from_rotation_translation(r, t);

    let well_conditioned = is_well_conditioned(&r)
        && spectrum_is_well_conditioned(&svd_s.singular_values)
        && spectrum_is_well_conditioned(&svd_t.singular_values);

    if well_conditioned && samples_stay_finite(&candidate, source) {
        Ok((candidate, false))
    } else {
        log::debug!("PCA axes unreliable, falling back to centroid-only alignment");
        let fallback = Transform::from_rotation_translation(Matrix3::identity(), centroid_t - centroid_s);
        Ok((fallback, true))
    }
}

fn centroid_and_covariance(points: ArrayView2<f32>) -> (Vector3<f64>, Matrix3<f64>) {
    let n = points.nrows() as f64;
    let mut centroid = Vector3::zeros();
    for row in points.outer_iter() {
        centroid += Vector3::new(row[0] as f64, row[1] as f64, row[2] as f64);
    }
    centroid /= n;

    let mut cov = Matrix3::zeros();
    for row in points.outer_iter() {
        let p = Vector3::new(row[0] as f64, row[1] as f64, row[2] as f64) - centroid;
        cov += p * p.transpose();
    }
    cov /= n;

    (centroid, cov)
}

fn negate_last_column(v: &mut Matrix3<f64>) {
    let mut col = v.column_mut(2);
    col *= -1.0;
}

fn is_well_conditioned(r: &Matrix3<f64>) -> bool {
    r.iter().all(|x| x.abs() <= ROTATION_ENTRY_BOUND)
}

fn spectrum_is_well_conditioned(singular_values: &Vector3<f64>) -> bool {
    let largest = singular_values[0];
    if largest <= 1e-12 {
        return false;
    }
    singular_values[2] / largest >= SINGULAR_VALUE_RATIO_FLOOR
}

fn samples_stay_finite(candidate: &Transform, source: ArrayView2<f32>) -> bool {
    let n = source.nrows();
    let sample_size = FINITE_CHECK_SAMPLE_SIZE.min(n);
    let mut rng = SmallRng::seed_from_u64(FINITE_CHECK_SEED);
    let indices = sample(&mut rng, n, sample_size);

    indices.iter().all(|i| {
        let row = source.row(i);
        candidate
            .apply_to_point([row[0], row[1], row[2]])
            .iter()
            .all(|v| v.is_finite())
    })
}
