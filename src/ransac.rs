//! Outlier-robust initial alignment via random sample consensus.

use ndarray::ArrayView2;
use rand::rngs::SmallRng;
use rand::seq::index::sample;
use rand::SeedableRng;

use crate::diagnostics::{Event, EventSink};
use crate::error::RegistrationError;
use crate::icp::kabsch;
use crate::nn_index::NearestNeighborIndex;
use crate::params::RansacParams;
use crate::select::median;
use crate::transform::Transform;

const MIN_SAMPLE_SIZE: usize = 3;

pub struct RansacResult {
    pub transform: Transform,
    pub inlier_indices: Vec<usize>,
    pub inlier_ratio: f32,
    /// `false` if `max_iterations` ran out before `target_inlier_ratio` was
    /// reached; the caller still gets the best hypothesis found.
    pub reached_target_ratio: bool,
}

/// Hypothesize/score/select: samples `params.sample_size` source points per
/// round, solves Kabsch on the sample, and keeps the hypothesis with the
/// most whole-cloud inliers under `initial` composed with that hypothesis.
pub fn filter(
    source: ArrayView2<f32>,
    target_index: &NearestNeighborIndex,
    initial: &Transform,
    params: &RansacParams,
    sink: &dyn EventSink,
) -> Result<RansacResult, RegistrationError> {
    let n_source = source.nrows();
    let sample_size = params.sample_size.min(n_source);
    if sample_size < MIN_SAMPLE_SIZE {
        return Err(RegistrationError::SampleTooSmall {
            requested: params.sample_size,
            available: n_source,
        });
    }

    let source_points: Vec<[f32; 3]> = source
        .outer_iter()
        .map(|row| initial.apply_to_point([row[0], row[1], row[2]]))
        .collect();

    let threshold = effective_threshold(&source_points, target_index, params.inlier_threshold)?;
    let threshold_sq = threshold * threshold;

    let mut rng = match params.seed {
        Some(seed) => SmallRng::seed_from_u64(seed),
        None => SmallRng::from_entropy(),
    };

    let mut best: Option<(Transform, Vec<usize>)> = None;
    let mut reached_target_ratio = false;

    'rounds: for iteration in 0..params.max_iterations {
        let sample_indices = sample(&mut rng, n_source, sample_size);

        let mut paired_source = Vec::with_capacity(sample_size);
        let mut paired_target = Vec::with_capacity(sample_size);
        for i in sample_indices.iter() {
            let p = source_points[i];
            match target_index.nearest(p)? {
                Some((target_idx, _)) => {
                    paired_source.push(p);
                    paired_target.push(target_point(target_index, target_idx));
                }
                None => continue 'rounds,
            }
        }
        if paired_source.len() < MIN_SAMPLE_SIZE {
            continue;
        }

        let hypothesis = kabsch::solve(&paired_source, &paired_target, f64::INFINITY)?;

        let mut inliers = Vec::new();
        for (i, &p) in source_points.iter().enumerate() {
            let predicted = hypothesis.apply_to_point(p);
            if let Some((_, dist_sq)) = target_index.nearest(predicted)? {
                if dist_sq <= threshold_sq {
                    inliers.push(i);
                }
            }
        }

        let is_better = best
            .as_ref()
            .map_or(true, |(_, best_inliers)| inliers.len() > best_inliers.len());
        if is_better {
            log::trace!("RANSAC found a better hypothesis with {} inliers", inliers.len());
            best = Some((hypothesis, inliers));
        }

        if let Some((_, inliers)) = &best {
            sink.on_event(Event::RansacIteration {
                iteration,
                inlier_count: inliers.len(),
            });
            if inliers.len() as f32 / n_source as f32 >= params.target_inlier_ratio {
                log::debug!("RANSAC reached target inlier ratio early");
                reached_target_ratio = true;
                break;
            }
        }
    }

    let (transform, inlier_indices) = best.unwrap_or_else(|| (Transform::identity(), Vec::new()));
    let inlier_ratio = inlier_indices.len() as f32 / n_source as f32;
    if !reached_target_ratio {
        log::debug!("RANSAC exhausted max_iterations without reaching target_inlier_ratio");
    }

    Ok(RansacResult {
        transform: initial_compose(&transform, initial),
        inlier_indices,
        inlier_ratio,
        reached_target_ratio,
    })
}

/// `filter`'s hypothesis already maps `initial`-transformed source points
/// onto the target, so composing it with `initial` yields the transform
/// from the *original* source frame, matching what `ICPRefiner` expects.
fn initial_compose(hypothesis: &Transform, initial: &Transform) -> Transform {
    hypothesis.compose(initial)
}

fn target_point(index: &NearestNeighborIndex, target_idx: usize) -> [f32; 3] {
    match index {
        NearestNeighborIndex::Exact(tree) => tree.point_unchecked(target_idx),
        NearestNeighborIndex::Approximate(grid) => grid.point_unchecked(target_idx),
    }
}

/// Scales `inlier_threshold` up when a quick sample of residuals under
/// `initial` suggests it is a poor starting guess.
fn effective_threshold(
    source_points: &[[f32; 3]],
    target_index: &NearestNeighborIndex,
    base_threshold: f32,
) -> Result<f32, RegistrationError> {
    const QUICK_SAMPLE_SIZE: usize = 32;
    let n = source_points.len();
    let sample_n = QUICK_SAMPLE_SIZE.min(n);

    let mut residuals = Vec::with_capacity(sample_n);
    let stride = (n / sample_n).max(1);
    for i in (0..n).step_by(stride).take(sample_n) {
        if let Some((_, dist_sq)) = target_index.nearest(source_points[i])? {
            residuals.push((dist_sq as f64).sqrt());
        }
    }
    if residuals.is_empty() {
        return Ok(base_threshold);
    }

    let median_residual = median(&residuals);
    if median_residual > base_threshold as f64 {
        Ok(base_threshold * (median_residual / base_threshold as f64) as f32)
    } else {
        Ok(base_threshold)
    }
}
