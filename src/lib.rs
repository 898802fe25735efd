pub mod cancel;
pub mod diagnostics;
pub mod error;
pub mod icp;
pub mod kdtree;
pub mod metrics;
pub mod nn_index;
pub mod params;
pub mod pca;
pub mod pointcloud;
pub mod ransac;
pub mod registration;
pub mod sampling;
pub mod select;
pub mod spatial_grid;
pub mod svd3;
pub mod transform;

pub use error::RegistrationError;
pub use params::Params;
pub use pointcloud::PointCloud;
pub use registration::{register, register_with, RegistrationOutput};
pub use transform::Transform;
