use ndarray::{Array2, ArrayView2};

use crate::error::RegistrationError;

/// A static 3D point cloud backed by a flat, contiguous `f32` buffer.
///
/// Coordinates for point `i` live at `buf[3*i]`, `buf[3*i+1]`, `buf[3*i+2]`.
/// This is the shape external readers (CSV/PLY parsers, an HTTP request body)
/// are expected to hand the core: `{points: flat f32 buffer, count}`. A
/// `PointCloud` is immutable once built; transformed clouds are new
/// allocations or caller-owned scratch buffers, never in-place edits of an
/// existing `PointCloud`.
#[derive(Clone, Debug)]
pub struct PointCloud {
    points: Array2<f32>,
}

impl PointCloud {
    /// Builds a point cloud from a flat `[x0,y0,z0,x1,y1,z1,...]` buffer.
    ///
    /// Fails with [`RegistrationError::InvalidPointCloud`] if `buf.len()` is
    /// not a positive multiple of 3.
    pub fn from_flat(buf: Vec<f32>) -> Result<Self, RegistrationError> {
        if buf.is_empty() || buf.len() % 3 != 0 {
            return Err(RegistrationError::InvalidPointCloud { len: buf.len() });
        }
        let n = buf.len() / 3;
        let points = Array2::from_shape_vec((n, 3), buf)
            .expect("buffer length is a verified multiple of 3");
        Ok(Self { points })
    }

    /// Builds a point cloud from a row-major `(n, 3)` array, which is
    /// exactly the flat-buffer layout viewed two-dimensionally.
    pub fn from_array(points: Array2<f32>) -> Result<Self, RegistrationError> {
        if points.ncols() != 3 || points.nrows() == 0 {
            return Err(RegistrationError::InvalidPointCloud {
                len: points.len(),
            });
        }
        Ok(Self { points })
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.points.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.points.nrows() == 0
    }

    /// Read-only `(n, 3)` view over the point coordinates.
    pub fn view(&self) -> ArrayView2<f32> {
        self.points.view()
    }

    /// A single point's coordinates as `[x, y, z]`.
    pub fn point(&self, index: usize) -> [f32; 3] {
        let row = self.points.row(index);
        [row[0], row[1], row[2]]
    }

    /// Flat `[x0,y0,z0,x1,...]` view of the underlying buffer, if the array
    /// is in standard (contiguous, row-major) layout — true for every
    /// `PointCloud` constructed through this type's own constructors.
    pub fn as_flat_slice(&self) -> Option<&[f32]> {
        self.points.as_slice()
    }

    /// `true` if every coordinate in the cloud is finite.
    pub fn is_finite(&self) -> bool {
        self.points.iter().all(|v| v.is_finite())
    }

    /// Validates the minimum-size precondition shared by every component
    /// that consumes a cloud as a "population" rather than a single query
    /// point.
    pub fn require_at_least(&self, required: usize) -> Result<(), RegistrationError> {
        if self.len() < required {
            Err(RegistrationError::InsufficientPoints {
                found: self.len(),
                required,
            })
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_flat_builds_expected_shape() {
        let cloud = PointCloud::from_flat(vec![1., 2., 3., 4., 5., 6.]).unwrap();
        assert_eq!(cloud.len(), 2);
        assert_eq!(cloud.point(0), [1., 2., 3.]);
        assert_eq!(cloud.point(1), [4., 5., 6.]);
    }

    #[test]
    fn from_flat_rejects_bad_length() {
        assert!(PointCloud::from_flat(vec![1., 2.]).is_err());
        assert!(PointCloud::from_flat(vec![]).is_err());
    }

    #[test]
    fn require_at_least_flags_small_clouds() {
        let cloud = PointCloud::from_flat(vec![0.; 6]).unwrap();
        assert!(cloud.require_at_least(3).is_err());
        assert!(cloud.require_at_least(2).is_ok());
    }

    #[test]
    fn detects_non_finite_coordinates() {
        let cloud = PointCloud::from_flat(vec![0., 0., 0., f32::NAN, 1., 1.]).unwrap();
        assert!(!cloud.is_finite());
    }
}
