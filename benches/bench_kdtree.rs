use std::time::Instant;

use criterion::{criterion_group, criterion_main, Criterion};
use ndarray::Array;
use pprof::criterion::{Output, PProfProfiler};
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rigid_register::kdtree::KdTree;

fn kdtree_benchmark(c: &mut Criterion) {
    const N: usize = 500_000;

    let ordered_points =
        Array::from_shape_vec((N, 3), (0..N * 3).map(|x| x as f32).collect()).unwrap();

    let randomized_points = {
        let mut random_indices: Vec<usize> = (0..N).collect();
        random_indices.shuffle(&mut SmallRng::from_seed([5; 32]));

        let mut randomized_points = ordered_points.clone();
        for (dst, &src) in random_indices.iter().enumerate() {
            randomized_points
                .row_mut(dst)
                .assign(&ordered_points.row(src));
        }
        randomized_points
    };

    c.bench_function("kdtree build", |b| {
        b.iter(|| KdTree::build(randomized_points.view()).unwrap());
    });

    c.bench_function("kdtree nearest", |b| {
        let tree = KdTree::build(randomized_points.view()).unwrap();
        b.iter_custom(|iters| {
            let start = Instant::now();
            for _ in 0..iters {
                for row in ordered_points.outer_iter() {
                    tree.nearest([row[0], row[1], row[2]]).unwrap();
                }
            }
            start.elapsed()
        });
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default().with_profiler(PProfProfiler::new(100, Output::Flamegraph(None)));
    targets = kdtree_benchmark
}

criterion_main!(benches);
