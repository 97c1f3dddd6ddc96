//! Benchmark suite for annex-core's exact and orchestrated search paths.
//!
//! Run with: `cargo bench --bench search_benchmark`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use annex_core::config::{CacheConfig, RerankConfig};
use annex_core::store::FindNearestOptions;
use annex_core::{DistanceMetric, OrchestratorSettings, PartitionManager, PartitionManagerParams, SearchOptions, SearchOrchestrator, VectorStore};

fn generate_random_vector(dim: usize) -> Vec<f32> {
    (0..dim).map(|i| (i as f32 * 0.1).sin()).collect()
}

/// Raw per-pair distance kernel cost, the innermost loop of every scan.
fn bench_vector_distance(c: &mut Criterion) {
    let dim = 768;
    let vec_a = generate_random_vector(dim);
    let vec_b = generate_random_vector(dim);

    let mut group = c.benchmark_group("distance_kernel_768d");
    for metric in [
        DistanceMetric::Cosine,
        DistanceMetric::Euclidean,
        DistanceMetric::Manhattan,
        DistanceMetric::InnerProduct,
    ] {
        group.bench_with_input(BenchmarkId::new("metric", format!("{metric:?}")), &metric, |b, metric| {
            b.iter(|| black_box(metric.calculate(&vec_a, &vec_b, 0.0)));
        });
    }
    group.finish();
}

fn store_of(dim: usize, count: usize) -> VectorStore {
    let mut store = VectorStore::new("bench", DistanceMetric::Cosine, 0.0);
    for i in 0..count {
        store.add(None, generate_random_vector(dim), None);
    }
    store
}

/// Exact linear-scan `find_nearest` at growing store sizes.
fn bench_exact_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("exact_scan");
    let dim = 256;
    let opts = FindNearestOptions::default();

    for count in [1_000usize, 10_000usize] {
        let store = store_of(dim, count);
        let query = generate_random_vector(dim);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("vectors", count), &count, |b, _| {
            b.iter(|| black_box(store.find_nearest(&query, 10, &opts)));
        });
    }

    group.finish();
}

/// End-to-end `SearchOrchestrator::find_nearest` against a single loaded
/// partition, including cache lookup and (disabled) reranking overhead.
fn bench_orchestrator_search(c: &mut Criterion) {
    let dim = 256;
    let temp_dir = tempfile::tempdir().expect("create temp dir");

    let params = PartitionManagerParams {
        data_dir: temp_dir.path().to_path_buf(),
        default_metric: DistanceMetric::Cosine,
        gap_penalty: 0.0,
        compress: false,
        default_capacity: 50_000,
        max_active_partitions: 4,
        auto_create_partitions: true,
        cluster_params: Default::default(),
        hnsw_params: Default::default(),
    };
    let partitions = PartitionManager::open(params).expect("open partition manager");
    let mut orchestrator = SearchOrchestrator::new(partitions, CacheConfig::default(), RerankConfig::default(), OrchestratorSettings::default());

    for _ in 0..10_000 {
        orchestrator
            .add_vector(None, generate_random_vector(dim), None)
            .expect("add vector");
    }

    let query = generate_random_vector(dim);

    let mut group = c.benchmark_group("orchestrator_search");
    group.bench_function("exact_skip_cache", |b| {
        b.iter(|| {
            let opts = SearchOptions {
                k: 10,
                use_hnsw: false,
                skip_cache: true,
                ..SearchOptions::default()
            };
            black_box(orchestrator.find_nearest(&query, &opts).expect("search"))
        });
    });

    group.bench_function("exact_cached", |b| {
        let opts = SearchOptions {
            k: 10,
            use_hnsw: false,
            ..SearchOptions::default()
        };
        orchestrator.find_nearest(&query, &opts).expect("warm cache");
        b.iter(|| black_box(orchestrator.find_nearest(&query, &opts).expect("search")));
    });
    group.finish();
}

criterion_group!(benches, bench_vector_distance, bench_exact_scan, bench_orchestrator_search);
criterion_main!(benches);
