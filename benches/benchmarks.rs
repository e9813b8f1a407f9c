use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use diffcorr::data::{ConditionAssignment, PairSet, SampleMatrix, SampleSubset};
use diffcorr::model::correlation::{correlate, pearson};
use diffcorr::model::Correlation;
use diffcorr::pipelines::{PipelineOptions, ZTestPipeline};
use diffcorr::BatchExecutor;
use std::hint::black_box;

fn synthetic_matrix(n_entities: usize, n_samples: usize) -> SampleMatrix {
    let mut state = 0x9e37_79b9_u32;
    let data = (0..n_entities * n_samples)
        .map(|_| {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (state >> 8) as f32 / (1u32 << 24) as f32
        })
        .collect();
    SampleMatrix::new(data, n_entities, n_samples).unwrap()
}

/// Single-pair Pearson kernel across sample counts
fn bench_pearson_kernel(c: &mut Criterion) {
    let mut group = c.benchmark_group("pearson_kernel");

    for n_samples in [16, 128, 1024] {
        group.throughput(Throughput::Elements(n_samples as u64));
        let matrix = synthetic_matrix(2, n_samples);
        let subset = SampleSubset::all(n_samples);

        group.bench_with_input(BenchmarkId::new("samples", n_samples), &n_samples, |b, _| {
            let view = matrix.view();
            b.iter(|| pearson(black_box(view.row(0)), black_box(view.row(1)), &subset))
        });
    }

    group.finish();
}

/// Exhaustive correlation vector, Pearson vs Spearman
fn bench_correlate_exhaustive(c: &mut Criterion) {
    let mut group = c.benchmark_group("correlate_exhaustive");
    group.sample_size(20);

    let n_entities = 200;
    let n_samples = 64;
    let matrix = synthetic_matrix(n_entities, n_samples);
    let pairs = PairSet::exhaustive(n_entities);
    let subset = SampleSubset::all(n_samples);
    let executor = BatchExecutor::new(4).unwrap();
    group.throughput(Throughput::Elements(pairs.len() as u64));

    for method in [Correlation::Pearson, Correlation::Spearman] {
        group.bench_function(method.as_str(), |b| {
            b.iter(|| correlate(matrix.view(), &pairs, method, &subset, &executor).unwrap())
        });
    }

    group.finish();
}

/// Small bootstrap z-test run end to end
fn bench_ztest_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("ztest_pipeline");
    group.sample_size(10);

    let matrix = synthetic_matrix(50, 40);
    let reference: Vec<usize> = (0..20).collect();
    let experimental: Vec<usize> = (20..40).collect();
    let conditions = ConditionAssignment::from_columns(&reference, &experimental);

    for repeats in [0, 50] {
        let options = PipelineOptions {
            correlation: Correlation::Spearman,
            repeats,
            process_num: 4,
            ..PipelineOptions::default()
        };
        group.bench_with_input(BenchmarkId::new("repeats", repeats), &options, |b, options| {
            b.iter(|| {
                ZTestPipeline::new(options.clone())
                    .run_exhaustive(black_box(&matrix), &conditions)
                    .unwrap()
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_pearson_kernel,
    bench_correlate_exhaustive,
    bench_ztest_pipeline
);
criterion_main!(benches);
