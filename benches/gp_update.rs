//! Criterion benchmarks comparing incremental and batch surrogate updates.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use plume::builders::PlannerBuilder;
use plume::config::PlannerConfig;
use plume::field::GaussianBumpField;
use plume::gp::{OnlineGp, UpdateStrategy};
use plume::kernel::RbfKernel;
use plume::metrics::RunLog;
use plume::types::Extent;

fn random_batch(rng: &mut StdRng, rows: usize) -> (Array2<f64>, Array1<f64>) {
    let inputs = Array2::from_shape_fn((rows, 2), |_| rng.gen_range(-10.0..10.0));
    let values = Array1::from_shape_fn(rows, |_| rng.gen_range(-5.0..5.0));
    (inputs, values)
}

fn fitted_model(rng: &mut StdRng, rows: usize) -> OnlineGp {
    let mut gp = OnlineGp::new(RbfKernel::new(2.0, 10.0, 0.05).expect("valid kernel"));
    let (x, y) = random_batch(rng, rows);
    gp.initialize(x.view(), y.view()).expect("initial fit");
    gp
}

fn bench_incorporate(c: &mut Criterion) {
    let mut group = c.benchmark_group("incorporate_10_points");
    let mut rng = StdRng::seed_from_u64(7);

    for &existing in &[50usize, 200, 400] {
        let base = fitted_model(&mut rng, existing);
        let (x, y) = random_batch(&mut rng, 10);

        for (label, strategy) in [("incremental", UpdateStrategy::Incremental), ("batch", UpdateStrategy::Batch)] {
            group.bench_with_input(BenchmarkId::new(label, existing), &existing, |b, _| {
                b.iter(|| {
                    let mut gp = base.clone();
                    gp.incorporate(black_box(x.view()), black_box(y.view()), strategy)
                        .expect("update");
                    gp
                })
            });
        }
    }
    group.finish();
}

fn bench_predict(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(11);
    let gp = fitted_model(&mut rng, 300);
    let (query, _) = random_batch(&mut rng, 900);

    c.bench_function("predict_900_points", |b| {
        b.iter(|| gp.predict(black_box(query.view()), false).expect("predict"))
    });
}

fn bench_planner_epochs(c: &mut Criterion) {
    c.bench_function("planner_20_epochs", |b| {
        b.iter(|| {
            let config = PlannerConfig { grid_resolution: 15, ..Default::default() };
            let field = GaussianBumpField::random(Extent::default(), 3, 0.1, 3).expect("field");
            let mut planner = PlannerBuilder::from_config(config)
                .with_field(Box::new(field))
                .build()
                .expect("planner");
            let mut log = RunLog::in_memory();
            planner.run(black_box(20), &mut log).expect("run")
        })
    });
}

criterion_group!(benches, bench_incorporate, bench_predict, bench_planner_epochs);
criterion_main!(benches);
