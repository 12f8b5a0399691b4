use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ai_engine::{
    BootstrapRule, ClassifierGate, ForestConfig, GateConfig, Model, RandomForestTrainer, Sample,
    Trainer,
};
use ultron_core::{FeatureVector, U256};

fn labeled(n: u128) -> Vec<Sample> {
    (0..n)
        .map(|i| Sample {
            features: FeatureVector {
                value: U256::from(i * 1_000_000_000),
                gas_price: 10_000_000_000 + (i % 13) * 1_000_000_000,
                gas_limit: 21_000 + (i % 5) as u64 * 10_000,
                max_fee_per_gas: if i % 2 == 0 { 0 } else { 40_000_000_000 },
            },
            label: i % 3 == 0,
        })
        .collect()
}

fn bench_feature_to_array(c: &mut Criterion) {
    let features = FeatureVector::default();

    c.bench_function("feature_to_array", |b| {
        b.iter(|| black_box(features.to_array()))
    });
}

fn bench_forest_predict(c: &mut Criterion) {
    let trainer = RandomForestTrainer::new(ForestConfig::default().with_seed(1));
    let model = trainer.fit(&labeled(800)).unwrap();
    let row = labeled(1)[0].features.to_array();

    c.bench_function("forest_predict", |b| {
        b.iter(|| black_box(model.predict(black_box(&row))))
    });
}

fn bench_gate_retrain(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let config = GateConfig::default()
        .with_seed(1)
        .with_forest(ForestConfig::default().with_trees(20).with_seed(1))
        .with_bootstrap(BootstrapRule {
            min_value_wei: 300_000_000_000,
            min_gas_price_wei: 0,
        });
    let gate = ClassifierGate::new(config);
    for sample in labeled(1000) {
        gate.predict(&sample.features);
    }

    let mut group = c.benchmark_group("gate");
    group.sample_size(10);
    group.bench_function("maybe_retrain_1000", |b| {
        b.iter(|| rt.block_on(gate.maybe_retrain()))
    });
    group.finish();
}

fn bench_forest_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("forest_fit");
    group.sample_size(10);

    let data = labeled(800);
    for trees in [10usize, 100] {
        let config = ForestConfig::default().with_trees(trees).with_seed(7);
        let trainer = RandomForestTrainer::new(config);
        group.bench_with_input(BenchmarkId::new("trees", trees), &data, |b, d| {
            b.iter(|| trainer.fit(black_box(d)))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_feature_to_array,
    bench_forest_predict,
    bench_gate_retrain,
    bench_forest_fit
);

criterion_main!(benches);
