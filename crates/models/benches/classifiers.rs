//! Benchmarks for classifier fitting and raster prediction

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use landslideml_core::{FeatureStack, GeoTransform, Raster};
use landslideml_models::{predict_map, Classifier, Estimator, ModelKind, Params};
use ndarray::Array2;

/// Samples with 6 covariates; the label depends on the first two
fn create_samples(n: usize) -> (Array2<f64>, Vec<i64>) {
    let mut state: u64 = 12345;
    let x = Array2::from_shape_fn((n, 6), |_| {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (state >> 33) as f64 / (1u64 << 31) as f64
    });
    let y = x
        .rows()
        .into_iter()
        .map(|r| i64::from(r[0] + 0.5 * r[1] > 0.75))
        .collect();
    (x, y)
}

fn create_stack(size: usize) -> FeatureStack {
    let mut stack = FeatureStack::new();
    for f in 0..6 {
        let mut layer = Raster::new(size, size);
        layer.set_transform(GeoTransform::new(0.0, size as f64, 1.0, -1.0));
        for row in 0..size {
            for col in 0..size {
                let v = ((row * 7 + col * 13 + f * 31) % 101) as f64 / 100.0;
                layer.set(row, col, v).unwrap();
            }
        }
        stack.push(format!("f{}", f), layer).unwrap();
    }
    stack
}

fn bench_fit(c: &mut Criterion) {
    let kinds = [
        (ModelKind::RandomForest, Params::new().with("n_estimators", 50)),
        (ModelKind::Gbm, Params::new().with("n_estimators", 50)),
        (ModelKind::Svm, Params::new()),
    ];
    for (kind, params) in kinds {
        let mut group = c.benchmark_group(format!("fit/{}", kind));
        group.sample_size(10);
        for n in [250, 1000] {
            let (x, y) = create_samples(n);
            group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
                b.iter(|| {
                    let mut model = Estimator::new(kind, &params).unwrap();
                    model.fit(black_box(x.view()), black_box(&y)).unwrap();
                    model
                })
            });
        }
        group.finish();
    }
}

fn bench_predict_map(c: &mut Criterion) {
    let (x, y) = create_samples(1000);
    let params = Params::new().with("n_estimators", 50);
    let mut model = Estimator::new(ModelKind::RandomForest, &params).unwrap();
    model.fit(x.view(), &y).unwrap();
    let features: Vec<String> = (0..6).map(|f| format!("f{}", f)).collect();

    let mut group = c.benchmark_group("predict_map/RandomForest");
    group.sample_size(10);
    for size in [64, 256] {
        let stack = create_stack(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| predict_map(&model, black_box(&stack), &features, 1).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_fit, bench_predict_map);
criterion_main!(benches);
