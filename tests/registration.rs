//! End-to-end properties of the full `register` pipeline, exercised as an
//! external caller would: through the public `PointCloud`/`Params` surface
//! only, never the internal per-stage modules.

use approx::assert_relative_eq;
use nalgebra::{Matrix3, Matrix4, Rotation3, Vector3};
use rand::rngs::SmallRng;
use rand::Rng;
use rand::SeedableRng;
use rigid_register::{register, register_with, Params, PointCloud, Transform};
use rigid_register::cancel::CancelToken;
use rigid_register::diagnostics::NullEventSink;

fn random_cloud(n: usize, seed: u64) -> PointCloud {
    let mut rng = SmallRng::seed_from_u64(seed);
    let flat: Vec<f32> = (0..n * 3).map(|_| rng.gen_range(-20.0..20.0)).collect();
    PointCloud::from_flat(flat).unwrap()
}

fn transform_cloud(cloud: &PointCloud, transform: &Transform) -> PointCloud {
    let flat: Vec<f32> = cloud
        .view()
        .outer_iter()
        .flat_map(|row| transform.apply_to_point([row[0], row[1], row[2]]))
        .collect();
    PointCloud::from_flat(flat).unwrap()
}

#[test]
fn self_registration_converges_to_identity_at_scale() {
    let cloud = random_cloud(5_000, 7);
    let output = register(&cloud, &cloud, &Params::default()).unwrap();
    assert_relative_eq!(
        output.transform.as_matrix4(),
        Matrix4::identity(),
        epsilon = 1e-3
    );
    assert!(output.metrics.rmse < 1e-6);
}

#[test]
fn recovers_a_known_rigid_transform_on_a_random_cloud() {
    let source = random_cloud(4_000, 11);
    let rotation: Matrix3<f64> = Rotation3::from_euler_angles(0.05, -0.1, 0.2).into_inner();
    let translation = Vector3::new(1.5, -0.75, 0.3);
    let applied = Transform::from_rotation_translation(rotation, translation);
    let target = transform_cloud(&source, &applied);

    let output = register(&source, &target, &Params::default()).unwrap();
    assert!(output.metrics.rmse < 1e-3);

    let recovered = output.transform.as_matrix4();
    let expected = applied.as_matrix4();
    assert_relative_eq!(recovered, expected, epsilon = 5e-2);
}

#[test]
fn ransac_filters_outliers_before_icp_refines() {
    let mut rng = SmallRng::seed_from_u64(42);
    let source = random_cloud(2_000, 21);
    let translation = Vector3::new(3.0, 0.0, 0.0);
    let applied = Transform::from_rotation_translation(Matrix3::identity(), translation);
    let mut target_flat: Vec<f32> = transform_cloud(&source, &applied)
        .view()
        .iter()
        .copied()
        .collect();

    // Corrupt 15% of target points with far-away noise so a naive PCA/ICP
    // run alone is pulled off course without RANSAC's rejection step.
    let n = target_flat.len() / 3;
    for i in 0..(n / 7) {
        let base = i * 3;
        target_flat[base] += rng.gen_range(500.0..1000.0);
    }
    let target = PointCloud::from_flat(target_flat).unwrap();

    let mut params = Params::default();
    params.use_ransac = true;
    params.ransac.seed = Some(99);
    params.ransac.max_iterations = 200;
    params.ransac.inlier_threshold = 0.5;

    let output = register(&source, &target, &params).unwrap();
    let t = output.transform.translation();
    assert!((t[0] - 3.0).abs() < 1.0);
}

#[test]
fn downsampling_does_not_change_the_converged_transform_much() {
    let source = random_cloud(40_000, 3);
    let translation = Vector3::new(0.4, -0.2, 0.1);
    let applied = Transform::from_rotation_translation(Matrix3::identity(), translation);
    let target = transform_cloud(&source, &applied);

    let mut downsampled_params = Params::default();
    downsampled_params.icp.downsample_trigger = 10_000;

    let mut full_params = Params::default();
    full_params.icp.downsample_trigger = 1_000_000;
    full_params.icp.downsample_large_trigger = 1_000_000;

    let with_downsampling = register(&source, &target, &downsampled_params).unwrap();
    let without_downsampling = register(&source, &target, &full_params).unwrap();

    assert!(with_downsampling.metrics.rmse < 1e-2);
    assert!(without_downsampling.metrics.rmse < 1e-2);
}

#[test]
fn invert_rigid_then_compose_is_identity_on_a_registration_result() {
    let source = random_cloud(500, 5);
    let translation = Vector3::new(2.0, 2.0, -1.0);
    let rotation: Matrix3<f64> = Rotation3::from_euler_angles(0.0, 0.0, 0.3).into_inner();
    let applied = Transform::from_rotation_translation(rotation, translation);
    let target = transform_cloud(&source, &applied);

    let output = register(&source, &target, &Params::default()).unwrap();
    let inverse = output.transform.invert_rigid().unwrap();
    let round_trip = output.transform.compose(&inverse);
    assert_relative_eq!(round_trip.as_matrix4(), Matrix4::identity(), epsilon = 1e-6);
}

#[test]
fn cancellation_mid_run_returns_the_last_good_transform() {
    let source = random_cloud(10_000, 13);
    let translation = Vector3::new(0.2, 0.2, 0.2);
    let applied = Transform::from_rotation_translation(Matrix3::identity(), translation);
    let target = transform_cloud(&source, &applied);

    let cancel = CancelToken::new();
    cancel.cancel();
    let output = register_with(
        &source,
        &target,
        &Params::default(),
        &cancel,
        &NullEventSink,
    )
    .unwrap();
    assert!(output.diagnostics.cancelled);
    assert_eq!(output.icp_result.iterations, 0);
}
