//! Approximate nearest-neighbor search via uniform-grid bucket hashing.
//!
//! Constant expected-time queries for clouds whose size makes `KDTree`
//! queries the ICP bottleneck. Grounded on the same "coarse cell -> bucket
//! of candidates -> local refine" shape used one level up by the pack's
//! octree/search spatial-acceleration structures, specialized here to the
//! flat integer-packed-key scheme spec'd for this component.

use std::collections::HashMap;

use ndarray::ArrayView2;

use crate::error::RegistrationError;

const AXIS_BITS: i64 = 10;
const AXIS_RANGE: i32 = 512; // [-512, 511], i.e. 10 bits per axis.
const SEARCH_RADIUS_CAP: i32 = 8;

fn pack_key(ix: i32, iy: i32, iz: i32) -> Option<i64> {
    if !(-AXIS_RANGE..AXIS_RANGE).contains(&ix)
        || !(-AXIS_RANGE..AXIS_RANGE).contains(&iy)
        || !(-AXIS_RANGE..AXIS_RANGE).contains(&iz)
    {
        return None;
    }
    let mask = (1i64 << AXIS_BITS) - 1;
    let ux = (ix as i64) & mask;
    let uy = (iy as i64) & mask;
    let uz = (iz as i64) & mask;
    Some((ux << (2 * AXIS_BITS)) | (uy << AXIS_BITS) | uz)
}

/// A uniform spatial hash grid over a target cloud's points.
pub struct SpatialGrid {
    cell_size: f32,
    origin: [f32; 3],
    points: Vec<[f32; 3]>,
    packed_buckets: HashMap<i64, Vec<u32>>,
    overflow_buckets: HashMap<(i32, i32, i32), Vec<u32>>,
}

impl SpatialGrid {
    /// Builds a grid over `points`, deriving `cell_size` from the cloud's
    /// bounding-box volume to target ~75 points per occupied cell, unless
    /// `cell_size_override` is given.
    pub fn build(
        points: ArrayView2<f32>,
        cell_size_override: Option<f32>,
    ) -> Result<Self, RegistrationError> {
        let n = points.nrows();
        if n == 0 {
            return Err(RegistrationError::EmptyIndex);
        }

        let coords: Vec<[f32; 3]> = points
            .outer_iter()
            .map(|row| [row[0], row[1], row[2]])
            .collect();

        let mut min = coords[0];
        let mut max = coords[0];
        for p in &coords {
            for axis in 0..3 {
                min[axis] = min[axis].min(p[axis]);
                max[axis] = max[axis].max(p[axis]);
            }
        }

        let cell_size = cell_size_override.unwrap_or_else(|| default_cell_size(min, max, n));
        let cell_size = if cell_size.is_finite() && cell_size > 0.0 {
            cell_size
        } else {
            1.0
        };

        let mut packed_buckets: HashMap<i64, Vec<u32>> = HashMap::new();
        let mut overflow_buckets: HashMap<(i32, i32, i32), Vec<u32>> = HashMap::new();

        for (idx, p) in coords.iter().enumerate() {
            let (ix, iy, iz) = cell_of(*p, min, cell_size);
            match pack_key(ix, iy, iz) {
                Some(key) => packed_buckets.entry(key).or_default().push(idx as u32),
                None => overflow_buckets
                    .entry((ix, iy, iz))
                    .or_default()
                    .push(idx as u32),
            }
        }

        Ok(Self {
            cell_size,
            origin: min,
            points: coords,
            packed_buckets,
            overflow_buckets,
        })
    }

    fn bucket(&self, ix: i32, iy: i32, iz: i32) -> Option<&[u32]> {
        match pack_key(ix, iy, iz) {
            Some(key) => self.packed_buckets.get(&key).map(Vec::as_slice),
            None => self
                .overflow_buckets
                .get(&(ix, iy, iz))
                .map(Vec::as_slice),
        }
    }

    /// Approximate nearest neighbor. Searches the 27-cell shell around `q`
    /// first, then successively wider shells (capped at radius 8 cells) if
    /// nothing was found. Returns `None` (an `ApproximateMiss`) if no point
    /// is found within the cap.
    pub fn approximate_nearest(&self, q: [f32; 3]) -> Result<Option<(usize, f32)>, RegistrationError> {
        if !q.iter().all(|v| v.is_finite()) {
            return Err(RegistrationError::InvalidQuery);
        }

        let (qx, qy, qz) = cell_of(q, self.origin, self.cell_size);
        let mut best: Option<(usize, f32)> = None;

        for radius in 1..=SEARCH_RADIUS_CAP {
            for ix in (qx - radius)..=(qx + radius) {
                for iy in (qy - radius)..=(qy + radius) {
                    for iz in (qz - radius)..=(qz + radius) {
                        // Only scan the outer shell once radius > 1; the
                        // inner cells were already scanned at smaller radii.
                        if radius > 1
                            && (qx - radius + 1..qx + radius).contains(&ix)
                            && (qy - radius + 1..qy + radius).contains(&iy)
                            && (qz - radius + 1..qz + radius).contains(&iz)
                        {
                            continue;
                        }
                        if let Some(bucket) = self.bucket(ix, iy, iz) {
                            for &point_idx in bucket {
                                let p = self.points[point_idx as usize];
                                let d = squared_distance(q, p);
                                if best.map_or(true, |(_, best_d)| d < best_d) {
                                    best = Some((point_idx as usize, d));
                                }
                            }
                        }
                    }
                }
            }
            if best.is_some() {
                break;
            }
        }

        Ok(best)
    }

    /// The coordinates backing a point index returned by a prior query.
    pub fn point_unchecked(&self, index: usize) -> [f32; 3] {
        self.points[index]
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

fn cell_of(p: [f32; 3], origin: [f32; 3], cell_size: f32) -> (i32, i32, i32) {
    (
        ((p[0] - origin[0]) / cell_size).floor() as i32,
        ((p[1] - origin[1]) / cell_size).floor() as i32,
        ((p[2] - origin[2]) / cell_size).floor() as i32,
    )
}

fn default_cell_size(min: [f32; 3], max: [f32; 3], n: usize) -> f32 {
    let extents = [
        (max[0] - min[0]).max(1e-6),
        (max[1] - min[1]).max(1e-6),
        (max[2] - min[2]).max(1e-6),
    ];
    let volume = (extents[0] as f64) * (extents[1] as f64) * (extents[2] as f64);
    let target_cells = (n as f64 / 75.0).max(1.0);
    (volume / target_cells).cbrt() as f32
}

fn squared_distance(a: [f32; 3], b: [f32; 3]) -> f32 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    dx * dx + dy * dy + dz * dz
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use rand::rngs::SmallRng;
    use rand::Rng;
    use rand::SeedableRng;

    fn brute_force_nearest(points: &[[f32; 3]], q: [f32; 3]) -> (usize, f32) {
        points
            .iter()
            .enumerate()
            .map(|(i, p)| (i, squared_distance(q, *p)))
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap())
            .unwrap()
    }

    #[test]
    fn approximate_nearest_agrees_with_brute_force_for_most_queries() {
        let mut rng = SmallRng::from_seed([11; 32]);
        let mut flat = Vec::new();
        for _ in 0..2000 {
            flat.extend_from_slice(&[
                rng.gen_range(0.0..100.0),
                rng.gen_range(0.0..100.0),
                rng.gen_range(0.0..100.0),
            ]);
        }
        let points_arr = Array2::from_shape_vec((2000, 3), flat.clone()).unwrap();
        let points: Vec<[f32; 3]> = flat.chunks(3).map(|c| [c[0], c[1], c[2]]).collect();
        let grid = SpatialGrid::build(points_arr.view(), None).unwrap();

        let mut within_tolerance = 0;
        let total = 300;
        for _ in 0..total {
            let q = [
                rng.gen_range(0.0..100.0),
                rng.gen_range(0.0..100.0),
                rng.gen_range(0.0..100.0),
            ];
            let (_, expected_dist) = brute_force_nearest(&points, q);
            let (_, got_dist) = grid.approximate_nearest(q).unwrap().unwrap();
            if (got_dist.sqrt() - expected_dist.sqrt()).abs() <= grid.cell_size() {
                within_tolerance += 1;
            }
        }
        assert!(within_tolerance as f64 / total as f64 >= 0.95);
    }

    #[test]
    fn build_rejects_empty_cloud() {
        let points = Array2::<f32>::zeros((0, 3));
        assert!(matches!(
            SpatialGrid::build(points.view(), None),
            Err(RegistrationError::EmptyIndex)
        ));
    }

    #[test]
    fn query_rejects_non_finite_point() {
        let points = Array2::from_shape_vec((1, 3), vec![0., 0., 0.]).unwrap();
        let grid = SpatialGrid::build(points.view(), Some(1.0)).unwrap();
        assert!(matches!(
            grid.approximate_nearest([f32::NAN, 0.0, 0.0]),
            Err(RegistrationError::InvalidQuery)
        ));
    }

    #[test]
    fn finds_exact_nearest_when_within_one_cell() {
        let points = Array2::from_shape_vec(
            (3, 3),
            vec![0., 0., 0., 10., 10., 10., 0.5, 0.5, 0.5],
        )
        .unwrap();
        let grid = SpatialGrid::build(points.view(), Some(1.0)).unwrap();
        let (idx, _) = grid.approximate_nearest([0.1, 0.1, 0.1]).unwrap().unwrap();
        assert_eq!(idx, 0);
    }
}
