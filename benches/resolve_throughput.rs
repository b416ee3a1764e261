//! Resolution throughput benchmarks.
//!
//! Measures the request path: lookup, admission and guard release.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use serving_core::models::{
    ArtifactLoader, ModelArtifact, ModelConfig, ModelRegistry, VersionPolicy, VersionSource,
};
use serving_core::reaper::LifecycleReaper;
use serving_core::resolver::get_model_instance_with_timeout;
use serving_core::ServingError;

const WAIT: Duration = Duration::from_millis(100);

#[derive(Debug)]
struct BenchArtifact;
impl ModelArtifact for BenchArtifact {}

struct FixedVersions(Vec<u64>);

impl VersionSource for FixedVersions {
    fn read_available_versions(&self, _: &ModelConfig) -> Result<Vec<u64>, ServingError> {
        Ok(self.0.clone())
    }
}

struct InstantLoader;

impl ArtifactLoader for InstantLoader {
    fn load(&self, _: &ModelConfig, _: u64) -> Result<Arc<dyn ModelArtifact>, String> {
        Ok(Arc::new(BenchArtifact))
    }
}

fn registry(version_count: u64) -> Arc<ModelRegistry> {
    let registry = Arc::new(ModelRegistry::new(
        Arc::new(LifecycleReaper::new()),
        Arc::new(FixedVersions((1..=version_count).collect())),
        Arc::new(InstantLoader),
    ));
    registry
        .reload_model_with_versions(
            &ModelConfig::new("bench", "/models/bench").with_policy(VersionPolicy::All),
        )
        .expect("bench model loads");
    registry
}

fn bench_resolve_single_thread(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve_single_thread");

    for versions in [1u64, 8, 64] {
        let registry = registry(versions);
        group.throughput(Throughput::Elements(1));
        group.bench_function(BenchmarkId::new("default_version", versions), |b| {
            b.iter(|| {
                let resolved = get_model_instance_with_timeout(&registry, "bench", 0, WAIT);
                black_box(resolved.is_ok())
            })
        });
        group.bench_function(BenchmarkId::new("exact_version", versions), |b| {
            b.iter(|| {
                let resolved = get_model_instance_with_timeout(&registry, "bench", 1, WAIT);
                black_box(resolved.is_ok())
            })
        });
    }

    group.finish();
}

fn bench_resolve_errors(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve_errors");
    let registry = registry(4);
    registry
        .retire_versions("bench", &[4])
        .expect("bench version retires");

    group.bench_function("name_missing", |b| {
        b.iter(|| black_box(get_model_instance_with_timeout(&registry, "other", 0, WAIT).is_err()))
    });
    group.bench_function("not_loaded_anymore", |b| {
        b.iter(|| black_box(get_model_instance_with_timeout(&registry, "bench", 4, WAIT).is_err()))
    });

    group.finish();
}

fn bench_resolve_contended(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve_contended");
    let per_thread = 200u64;

    for threads in [2u64, 4, 8] {
        let registry = registry(1);
        group.throughput(Throughput::Elements(threads * per_thread));
        group.bench_function(BenchmarkId::new("threads", threads), |b| {
            b.iter(|| {
                let workers: Vec<_> = (0..threads)
                    .map(|_| {
                        let registry = Arc::clone(&registry);
                        thread::spawn(move || {
                            for _ in 0..per_thread {
                                let resolved =
                                    get_model_instance_with_timeout(&registry, "bench", 1, WAIT);
                                black_box(resolved.is_ok());
                            }
                        })
                    })
                    .collect();
                for worker in workers {
                    let _ = worker.join();
                }
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_resolve_single_thread,
    bench_resolve_errors,
    bench_resolve_contended
);
criterion_main!(benches);
