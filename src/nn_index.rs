//! A nearest-neighbor index over a target cloud, exact or approximate.
//!
//! ICP's correspondence step only needs "find me the closest target
//! point" and does not care which substrate answers it, so the two
//! substrates are unified behind one enum rather than a trait object — there
//! are exactly two variants and no plugin point is spec'd for a third.

use ndarray::ArrayView2;

use crate::error::RegistrationError;
use crate::kdtree::KdTree;
use crate::params::SpatialGridParams;
use crate::spatial_grid::SpatialGrid;

pub enum NearestNeighborIndex {
    Exact(KdTree),
    Approximate(SpatialGrid),
}

impl NearestNeighborIndex {
    pub fn build_exact(points: ArrayView2<f32>) -> Result<Self, RegistrationError> {
        Ok(Self::Exact(KdTree::build(points)?))
    }

    pub fn build_approximate(
        points: ArrayView2<f32>,
        params: &SpatialGridParams,
    ) -> Result<Self, RegistrationError> {
        Ok(Self::Approximate(SpatialGrid::build(
            points,
            params.cell_size,
        )?))
    }

    /// Closest target point to `q`. `Ok(None)` only happens for the
    /// approximate substrate, when nothing is found within its search cap.
    pub fn nearest(&self, q: [f32; 3]) -> Result<Option<(usize, f32)>, RegistrationError> {
        match self {
            Self::Exact(tree) => tree.nearest(q).map(Some),
            Self::Approximate(grid) => grid.approximate_nearest(q),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Exact(tree) => tree.len(),
            Self::Approximate(grid) => grid.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
