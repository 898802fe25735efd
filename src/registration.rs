//! Orchestrates PCA coarse alignment, optional RANSAC filtering, ICP
//! refinement, and final metrics against one shared target index.

use crate::cancel::CancelToken;
use crate::diagnostics::{Diagnostics, Event, EventSink, NullEventSink};
use crate::error::RegistrationError;
use crate::icp::{IcpRefiner, IcpResult};
use crate::metrics::{self, Metrics};
use crate::nn_index::NearestNeighborIndex;
use crate::params::Params;
use crate::pca;
use crate::pointcloud::PointCloud;
use crate::ransac;
use crate::transform::Transform;

const MIN_POINTS: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RegistrationOutput {
    pub transform: Transform,
    pub icp_result: IcpResult,
    pub metrics: Metrics,
    pub diagnostics: Diagnostics,
}

/// Registers `source` onto `target`: PCA → (optional RANSAC) → ICP → Metrics,
/// sharing one target index structure across all three stages.
pub fn register(
    source: &PointCloud,
    target: &PointCloud,
    params: &Params,
) -> Result<RegistrationOutput, RegistrationError> {
    register_with(source, target, params, &CancelToken::new(), &NullEventSink)
}

/// As [`register`], with an explicit cancel token and event sink for callers
/// that need cooperative cancellation or structured progress events.
pub fn register_with(
    source: &PointCloud,
    target: &PointCloud,
    params: &Params,
    cancel: &CancelToken,
    sink: &dyn EventSink,
) -> Result<RegistrationOutput, RegistrationError> {
    source.require_at_least(MIN_POINTS)?;
    target.require_at_least(MIN_POINTS)?;
    if !source.is_finite() || !target.is_finite() {
        return Err(RegistrationError::NonFiniteInput);
    }

    let source = source.view();
    let target = target.view();
    let n_target = target.nrows();

    let use_approximate = params.force_approximate_nn || n_target >= params.kdtree_threshold;
    let target_index = if use_approximate {
        NearestNeighborIndex::build_approximate(target, &params.spatial_grid)?
    } else {
        NearestNeighborIndex::build_exact(target)?
    };

    let (m0, degenerate_axes) = pca::align(source, target)?;
    sink.on_event(Event::PcaCompleted { degenerate_axes });

    let mut ransac_exhausted = false;
    let m_r = if params.use_ransac {
        let ransac_result = ransac::filter(source, &target_index, &m0, &params.ransac, sink)?;
        ransac_exhausted = !ransac_result.reached_target_ratio;
        ransac_result.transform
    } else {
        m0
    };

    let refiner = IcpRefiner::new(&params.icp);
    let icp_result = refiner.run(source, &target_index, m_r, cancel, sink)?;

    let result_metrics = metrics::compute(source, &icp_result.transform, &target_index)?;

    let diagnostics = Diagnostics {
        degenerate_axes,
        ransac_exhausted,
        icp_hit_iteration_cap: icp_result.termination_reason
            == crate::icp::TerminationReason::MaxIterations,
        cancelled: icp_result.termination_reason == crate::icp::TerminationReason::UserCancelled,
    };

    Ok(RegistrationOutput {
        transform: icp_result.transform,
        icp_result,
        metrics: result_metrics,
        diagnostics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Matrix4;

    fn tetrahedron() -> PointCloud {
        PointCloud::from_flat(vec![0., 0., 0., 1., 0., 0., 0., 1., 0., 0., 0., 1.]).unwrap()
    }

    fn translate(cloud: &PointCloud, offset: [f32; 3]) -> PointCloud {
        let mut buf: Vec<f32> = cloud.view().iter().copied().collect();
        for chunk in buf.chunks_exact_mut(3) {
            chunk[0] += offset[0];
            chunk[1] += offset[1];
            chunk[2] += offset[2];
        }
        PointCloud::from_flat(buf).unwrap()
    }

    #[test]
    fn identity_scenario() {
        let cloud = tetrahedron();
        let params = Params::default();
        let output = register(&cloud, &cloud, &params).unwrap();
        assert_relative_eq!(
            output.transform.as_matrix4(),
            Matrix4::identity(),
            epsilon = 1e-4
        );
        assert!(output.metrics.rmse < 1e-6);
        assert!(output.icp_result.iterations >= 1);
        assert!(output.icp_result.converged);
    }

    #[test]
    fn pure_translation_scenario() {
        let source = tetrahedron();
        let target = translate(&source, [1.0, 1.0, 1.0]);
        let params = Params::default();
        let output = register(&source, &target, &params).unwrap();
        let t = output.transform.translation();
        assert_relative_eq!(t[0], 1.0, epsilon = 1e-3);
        assert_relative_eq!(t[1], 1.0, epsilon = 1e-3);
        assert_relative_eq!(t[2], 1.0, epsilon = 1e-3);
        assert!(output.metrics.rmse < 1e-6);
    }

    #[test]
    fn rotation_about_z_scenario() {
        let source = tetrahedron();
        let target = PointCloud::from_flat(vec![
            0., 0., 0., 0., 1., 0., -1., 0., 0., 0., 0., 1.,
        ])
        .unwrap();
        let params = Params::default();
        let output = register(&source, &target, &params).unwrap();
        assert!(output.metrics.rmse < 1e-5);
    }

    #[test]
    fn rejects_too_few_points() {
        let cloud = PointCloud::from_flat(vec![0., 0., 0., 1., 0., 0.]).unwrap();
        let params = Params::default();
        let result = register(&cloud, &cloud, &params);
        assert!(matches!(
            result,
            Err(RegistrationError::InsufficientPoints { .. })
        ));
    }

    #[test]
    fn congruent_triplets_succeed_at_the_minimum_size() {
        let source =
            PointCloud::from_flat(vec![0., 0., 0., 1., 0., 0., 0., 1., 0.]).unwrap();
        let target = source.clone();
        let params = Params::default();
        let output = register(&source, &target, &params).unwrap();
        assert!(output.metrics.rmse < 1e-5);
    }

    #[test]
    fn rejects_non_finite_input() {
        let cloud =
            PointCloud::from_flat(vec![0., 0., 0., f32::NAN, 0., 0., 0., 1., 0.]).unwrap();
        let params = Params::default();
        let result = register(&cloud, &cloud, &params);
        assert!(matches!(result, Err(RegistrationError::NonFiniteInput)));
    }

    #[test]
    fn degenerate_axes_scenario_reports_diagnostic_and_aligns_centroids() {
        let source = PointCloud::from_flat(vec![
            0., 0., 0., 1., 0., 0., 2., 0., 0., 3., 0., 0.,
        ])
        .unwrap();
        let target = translate(&source, [5.0, 0.0, 0.0]);
        let params = Params::default();
        let output = register(&source, &target, &params).unwrap();
        assert!(output.diagnostics.degenerate_axes);
    }
}
