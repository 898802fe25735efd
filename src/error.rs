use thiserror::Error;

/// Errors produced by the registration core.
///
/// Most variants are recovered locally and surfaced as a `termination_reason`
/// or a diagnostic flag rather than propagated — see [`crate::diagnostics`]
/// and [`crate::icp::TerminationReason`]. Only the entry-validation variants
/// (`InsufficientPoints`, `NonFiniteInput`, `NonRigidInput`,
/// `InvalidPointCloud`) are ever returned as a fatal `Err` from
/// [`crate::registration::register`] / [`crate::registration::register_with`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RegistrationError {
    /// Fewer than 3 points in a source or target cloud.
    #[error("point cloud has {found} points, at least {required} are required")]
    InsufficientPoints { found: usize, required: usize },

    /// The flat buffer length is not a multiple of 3, or is empty.
    #[error("point cloud buffer of length {len} is not a valid flattened (x,y,z) sequence")]
    InvalidPointCloud { len: usize },

    /// A coordinate (input or intermediate) is NaN or infinite.
    #[error("non-finite coordinate encountered")]
    NonFiniteInput,

    /// A supplied transform is not a proper rigid transform.
    #[error("transform is not rigid: |det(R) - 1| = {det_error}")]
    NonRigidInput { det_error: f64 },

    /// A nearest-neighbor structure was built over zero points.
    #[error("nearest-neighbor index built with an empty point set")]
    EmptyIndex,

    /// A query point has a non-finite coordinate. Internal: the caller
    /// drops the corresponding correspondence rather than propagating this.
    #[error("query point has a non-finite coordinate")]
    InvalidQuery,

    /// SVD or Kabsch produced non-finite values.
    #[error("numeric breakdown during {step}")]
    NumericBreakdown { step: &'static str },

    /// RANSAC cannot form a minimal sample (fewer than 3 points available).
    #[error("cannot draw a RANSAC sample of size {requested} from {available} points")]
    SampleTooSmall { requested: usize, available: usize },
}
