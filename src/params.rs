//! Tunables for every pipeline stage, serializable so callers can persist or
//! transmit a registration run's configuration alongside its result.

use serde_derive::{Deserialize, Serialize};

/// Top-level knobs for [`crate::registration::register`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Params {
    /// Run RANSAC outlier rejection between PCA and ICP.
    pub use_ransac: bool,
    pub ransac: RansacParams,
    pub icp: IcpParams,
    /// Target clouds at or above this size use `SpatialGrid` instead of
    /// `KDTree` by default.
    pub kdtree_threshold: usize,
    /// Forces the approximate grid substrate regardless of `kdtree_threshold`.
    pub force_approximate_nn: bool,
    pub spatial_grid: SpatialGridParams,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            use_ransac: false,
            ransac: RansacParams::default(),
            icp: IcpParams::default(),
            kdtree_threshold: 60_000,
            force_approximate_nn: false,
            spatial_grid: SpatialGridParams::default(),
        }
    }
}

impl Params {
    /// Parses `Params` from a JSON configuration document, the shape an
    /// external config-loading collaborator would hand the core.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Renders `Params` as pretty-printed JSON, for persisting or
    /// transmitting a run's configuration alongside its result.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RansacParams {
    pub max_iterations: usize,
    /// Points within this distance of the hypothesized transform's prediction
    /// are counted as inliers.
    pub inlier_threshold: f32,
    /// Minimum source points sampled per round, clamped down to `n_S` (never
    /// below 3) when the cloud is smaller than this.
    pub sample_size: usize,
    /// Stop early once this fraction of points are inliers.
    pub target_inlier_ratio: f32,
    /// `None` draws fresh entropy; `Some` reproduces a prior run exactly.
    pub seed: Option<u64>,
}

impl Default for RansacParams {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            inlier_threshold: 0.05,
            sample_size: 3,
            target_inlier_ratio: 0.95,
            seed: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IcpParams {
    pub max_iterations: usize,
    /// Stop once `|previous_rmse - rmse| < tolerance` (and the acceptable-
    /// RMSE ceiling below is satisfied).
    pub tolerance: f64,
    /// Stop as soon as RMSE drops below this value. `0.0` (the default)
    /// never triggers early on its own.
    pub target_rmse: f64,
    /// The tolerance-based convergence check only fires when RMSE is also
    /// below this ceiling. Defaults to an effectively-disabled check
    /// (any finite RMSE qualifies) per the design's choice to require
    /// callers to opt into a hard quality gate via `target_rmse` instead.
    pub acceptable_rmse_ceiling: f64,
    /// Correspondences farther apart than this are excluded from the Kabsch
    /// solve on that iteration.
    pub max_correspondence_distance: f32,
    /// Minimum number of surviving correspondences to attempt a Kabsch solve.
    pub min_correspondences: usize,
    pub downsample_trigger: usize,
    pub downsample_large_trigger: usize,
    pub downsample_target_moderate_early: usize,
    pub downsample_target_moderate_late: usize,
    pub downsample_target_large_early: usize,
    pub downsample_target_large_late: usize,
}

impl Default for IcpParams {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            tolerance: 1e-7,
            target_rmse: 0.0,
            acceptable_rmse_ceiling: f64::MAX,
            max_correspondence_distance: f32::MAX,
            min_correspondences: 3,
            downsample_trigger: 30_000,
            downsample_large_trigger: 100_000,
            downsample_target_moderate_early: 15_000,
            downsample_target_moderate_late: 25_000,
            downsample_target_large_early: 20_000,
            downsample_target_large_late: 40_000,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpatialGridParams {
    /// `None` derives the cell size from the target cloud's bounding box.
    pub cell_size: Option<f32>,
}

impl Default for SpatialGridParams {
    fn default() -> Self {
        Self { cell_size: None }
    }
}
