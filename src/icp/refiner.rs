//! The ICP main loop: transform, downsample, correspond, solve, converge.

use ndarray::ArrayView2;
use rayon::prelude::*;

use crate::cancel::CancelToken;
use crate::diagnostics::{Event, EventSink};
use crate::error::RegistrationError;
use crate::icp::kabsch;
use crate::icp::{IcpResult, TerminationReason};
use crate::nn_index::NearestNeighborIndex;
use crate::params::IcpParams;
use crate::sampling::stride_indices;
use crate::transform::Transform;

const MIN_SOURCE_POINTS: usize = 3;

pub struct IcpRefiner<'a> {
    params: &'a IcpParams,
}

impl<'a> IcpRefiner<'a> {
    pub fn new(params: &'a IcpParams) -> Self {
        Self { params }
    }

    /// Runs the refinement loop. `source` and the cloud backing
    /// `target_index` must each have at least 3 points.
    pub fn run(
        &self,
        source: ArrayView2<f32>,
        target_index: &NearestNeighborIndex,
        initial: Transform,
        cancel: &CancelToken,
        sink: &dyn EventSink,
    ) -> Result<IcpResult, RegistrationError> {
        let n_source = source.nrows();
        if n_source < MIN_SOURCE_POINTS || target_index.len() < MIN_SOURCE_POINTS {
            return Err(RegistrationError::InsufficientPoints {
                found: n_source.min(target_index.len()),
                required: MIN_SOURCE_POINTS,
            });
        }

        let mut cumulative = initial;
        let mut last_good = cumulative;
        let mut transformed_source = vec![0.0f32; n_source * 3];
        let mut previous_rmse = f64::INFINITY;

        let source_flat = source
            .as_slice()
            .map(|s| s.to_vec())
            .unwrap_or_else(|| source.iter().copied().collect());

        for iteration in 0..self.params.max_iterations {
            log::trace!(
                "ICP iteration {iteration}/{}",
                self.params.max_iterations
            );

            if cancel.is_cancelled() {
                return Ok(IcpResult {
                    transform: last_good,
                    iterations: iteration,
                    final_rmse: previous_rmse,
                    converged: false,
                    termination_reason: TerminationReason::UserCancelled,
                });
            }

            cumulative.apply_to_cloud_slice(&source_flat, &mut transformed_source);
            if !transformed_source.iter().all(|v| v.is_finite()) {
                return Ok(IcpResult {
                    transform: last_good,
                    iterations: iteration,
                    final_rmse: previous_rmse,
                    converged: false,
                    termination_reason: TerminationReason::NumericalDivergence,
                });
            }

            let working_indices = self.working_set(n_source, iteration);
            let working_points: Vec<[f32; 3]> = working_indices
                .iter()
                .map(|&i| {
                    [
                        transformed_source[i * 3],
                        transformed_source[i * 3 + 1],
                        transformed_source[i * 3 + 2],
                    ]
                })
                .collect();

            let correspondences: Vec<Option<([f32; 3], [f32; 3])>> = working_points
                .par_iter()
                .map(|&p| match target_index.nearest(p) {
                    Ok(Some((target_idx, dist_sq))) => {
                        if dist_sq <= self.params.max_correspondence_distance.powi(2) {
                            target_point(target_index, target_idx).map(|t| (p, t))
                        } else {
                            None
                        }
                    }
                    _ => None,
                })
                .collect();

            let mut paired_source = Vec::with_capacity(correspondences.len());
            let mut paired_target = Vec::with_capacity(correspondences.len());
            for pair in correspondences.into_iter().flatten() {
                paired_source.push(pair.0);
                paired_target.push(pair.1);
            }

            if paired_source.len() < self.params.min_correspondences {
                return Ok(IcpResult {
                    transform: last_good,
                    iterations: iteration,
                    final_rmse: previous_rmse,
                    converged: false,
                    termination_reason: TerminationReason::InsufficientCorrespondences,
                });
            }

            let incremental = kabsch::solve(&paired_source, &paired_target, previous_rmse)?;
            cumulative = incremental.compose(&cumulative);
            last_good = cumulative;

            let rmse = rmse_over_pairs(&incremental, &paired_source, &paired_target);
            log::trace!("RMSE after iteration {iteration}: {rmse}");
            sink.on_event(Event::IcpIteration { iteration, rmse });

            let converged = rmse < self.params.target_rmse
                || ((previous_rmse - rmse).abs() < self.params.tolerance
                    && rmse < self.params.acceptable_rmse_ceiling);

            previous_rmse = rmse;

            if converged {
                log::debug!("Converged after {} iterations with RMSE {rmse}", iteration + 1);
                sink.on_event(Event::Converged {
                    iterations: iteration + 1,
                });
                return Ok(IcpResult {
                    transform: cumulative,
                    iterations: iteration + 1,
                    final_rmse: rmse,
                    converged: true,
                    termination_reason: TerminationReason::Converged,
                });
            }
        }

        Ok(IcpResult {
            transform: cumulative,
            iterations: self.params.max_iterations,
            final_rmse: previous_rmse,
            converged: false,
            termination_reason: TerminationReason::MaxIterations,
        })
    }

    /// The adaptive working-set indices for this iteration.
    fn working_set(&self, n_source: usize, iteration: usize) -> Vec<usize> {
        let p = self.params;
        if n_source > p.downsample_large_trigger {
            let target = if iteration < 2 {
                p.downsample_target_large_early
            } else {
                p.downsample_target_large_late
            };
            stride_indices(n_source, target)
        } else if n_source > p.downsample_trigger {
            let halfway = p.max_iterations / 2;
            let target = if iteration < halfway {
                p.downsample_target_moderate_early
            } else {
                p.downsample_target_moderate_late
            };
            stride_indices(n_source, target)
        } else {
            (0..n_source).collect()
        }
    }
}

fn target_point(index: &NearestNeighborIndex, target_idx: usize) -> Option<[f32; 3]> {
    match index {
        NearestNeighborIndex::Exact(tree) => Some(tree.point_unchecked(target_idx)),
        NearestNeighborIndex::Approximate(grid) => Some(grid.point_unchecked(target_idx)),
    }
}

fn rmse_over_pairs(incremental: &Transform, source: &[[f32; 3]], target: &[[f32; 3]]) -> f64 {
    let sum_sq: f64 = source
        .iter()
        .zip(target)
        .map(|(&s, &t)| {
            let p = incremental.apply_to_point(s);
            let dx = (p[0] - t[0]) as f64;
            let dy = (p[1] - t[1]) as f64;
            let dz = (p[2] - t[2]) as f64;
            dx * dx + dy * dy + dz * dz
        })
        .sum();
    (sum_sq / source.len() as f64).sqrt()
}
