//! Residual statistics over a final alignment.

use ndarray::ArrayView2;

use crate::error::RegistrationError;
use crate::nn_index::NearestNeighborIndex;
use crate::select::median;
use crate::transform::Transform;

/// `{rmse, max, mean, median}` of nearest-neighbor residual distances
/// between a transformed source and a target's index structure.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Metrics {
    pub rmse: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
}

/// Transforms `source` by `transform` and measures each point's distance to
/// its nearest neighbor in `target_index`. Points whose query misses (an
/// approximate-grid miss, or a non-finite coordinate) are excluded from the
/// statistics; `metrics` never fails on that alone, only reports fewer
/// samples.
pub fn compute(
    source: ArrayView2<f32>,
    transform: &Transform,
    target_index: &NearestNeighborIndex,
) -> Result<Metrics, RegistrationError> {
    let mut distances: Vec<f64> = Vec::with_capacity(source.nrows());

    for row in source.outer_iter() {
        let p = transform.apply_to_point([row[0], row[1], row[2]]);
        if let Some((_, dist_sq)) = target_index.nearest(p)? {
            distances.push((dist_sq as f64).sqrt());
        }
    }

    if distances.is_empty() {
        return Ok(Metrics {
            rmse: 0.0,
            max: 0.0,
            mean: 0.0,
            median: 0.0,
        });
    }

    let sum_sq: f64 = distances.iter().map(|d| d * d).sum();
    let sum: f64 = distances.iter().sum();
    let count = distances.len() as f64;

    Ok(Metrics {
        rmse: (sum_sq / count).sqrt(),
        max: distances.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
        mean: sum / count,
        median: median(&distances),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn cloud(points: &[[f32; 3]]) -> Array2<f32> {
        let flat: Vec<f32> = points.iter().flat_map(|p| p.iter().copied()).collect();
        Array2::from_shape_vec((points.len(), 3), flat).unwrap()
    }

    #[test]
    fn identity_transform_over_identical_clouds_has_zero_error() {
        let points = cloud(&[[0., 0., 0.], [1., 0., 0.], [0., 1., 0.]]);
        let index = NearestNeighborIndex::build_exact(points.view()).unwrap();
        let metrics = compute(points.view(), &Transform::identity(), &index).unwrap();
        assert_eq!(metrics.rmse, 0.0);
        assert_eq!(metrics.max, 0.0);
        assert_eq!(metrics.mean, 0.0);
        assert_eq!(metrics.median, 0.0);
    }

    #[test]
    fn uniform_offset_reports_the_offset_distance() {
        let target = cloud(&[[0., 0., 0.], [10., 0., 0.], [0., 10., 0.]]);
        let source = cloud(&[[1., 0., 0.], [11., 0., 0.], [1., 10., 0.]]);
        let index = NearestNeighborIndex::build_exact(target.view()).unwrap();
        let metrics = compute(source.view(), &Transform::identity(), &index).unwrap();
        assert!((metrics.rmse - 1.0).abs() < 1e-5);
        assert!((metrics.max - 1.0).abs() < 1e-5);
    }
}
