//! Builder for [`crate::params::IcpParams`], following the fluent
//! `with_*` construction style used throughout this crate's configuration
//! types rather than requiring callers to fill in every struct field.

use crate::params::IcpParams;

#[derive(Clone, Debug, Default)]
pub struct IcpParamsBuilder {
    params: IcpParams,
}

impl IcpParamsBuilder {
    pub fn new() -> Self {
        Self {
            params: IcpParams::default(),
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.params.max_iterations = max_iterations;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.params.tolerance = tolerance;
        self
    }

    pub fn with_target_rmse(mut self, target_rmse: f64) -> Self {
        self.params.target_rmse = target_rmse;
        self
    }

    pub fn with_max_correspondence_distance(mut self, distance: f32) -> Self {
        self.params.max_correspondence_distance = distance;
        self
    }

    pub fn with_min_correspondences(mut self, min_correspondences: usize) -> Self {
        self.params.min_correspondences = min_correspondences;
        self
    }

    pub fn build(self) -> IcpParams {
        self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let params = IcpParamsBuilder::new()
            .with_max_iterations(10)
            .with_tolerance(1e-3)
            .build();
        assert_eq!(params.max_iterations, 10);
        assert_eq!(params.tolerance, 1e-3);
    }
}
