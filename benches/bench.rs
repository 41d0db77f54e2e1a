use criterion::*;
use spectral_bench::backend::{ArrayBackend, BackendKind};
use spectral_bench::common::{BenchConfig, PadMode};
use spectral_bench::graph::{connected_components, img_to_graph};
use spectral_bench::pipeline::{set_graph_data, weighted_graph};
use spectral_bench::sample::coins;
use spectral_bench::spectral::{spectral_clustering, SpectralOptions};
use spectral_bench::transform::rescale;
use std::time::Duration;

fn bench_gaussian_filter(c: &mut Criterion) {
    sas::init();
    let image = coins();
    let mut group = c.benchmark_group("gaussian_filter");
    for kind in [BackendKind::Cpu, BackendKind::Rayon] {
        let backend = kind.create();
        group.bench_with_input(
            BenchmarkId::new("gaussian_filter", backend.name()),
            &backend,
            |b, backend| {
                b.iter(|| {
                    let _ = black_box(backend.gaussian_filter(&image, 2.0, PadMode::Reflect, 4.0));
                });
            },
        );
    }
}

fn bench_rescale(c: &mut Criterion) {
    sas::init();
    let image = coins();
    let mut group = c.benchmark_group("rescale");
    for scale in [0.1, 0.4, 0.8] {
        group.bench_with_input(BenchmarkId::new("rescale", scale), &scale, |b, &scale| {
            b.iter(|| {
                let _ = black_box(rescale(&image, scale, PadMode::Mirror, false));
            });
        });
    }
}

fn bench_img_to_graph(c: &mut Criterion) {
    sas::init();
    let image = coins();
    c.bench_function("img_to_graph", |b| {
        b.iter(|| {
            let _ = black_box(img_to_graph(&image).to_csr());
        });
    });
}

fn bench_set_graph_data(c: &mut Criterion) {
    sas::init();
    let graph = img_to_graph(&coins());
    let mut group = c.benchmark_group("set_graph_data");
    for kind in [BackendKind::Cpu, BackendKind::Rayon] {
        let backend = kind.create();
        group.bench_with_input(
            BenchmarkId::new("set_graph_data", backend.name()),
            &backend,
            |b, backend| {
                b.iter_batched(
                    || graph.clone(),
                    |mut graph| set_graph_data(backend.as_ref(), &mut graph, 10.0, 1e-6),
                    BatchSize::LargeInput,
                );
            },
        );
    }
}

fn bench_connected_components(c: &mut Criterion) {
    sas::init();
    let graph = img_to_graph(&coins()).to_csr();
    c.bench_function("connected_components", |b| {
        b.iter(|| {
            let _ = black_box(connected_components(&graph));
        });
    });
}

fn bench_spectral_clustering(c: &mut Criterion) {
    sas::init();
    let image = coins();
    let config = BenchConfig::default();
    let backend: Box<dyn ArrayBackend> = BackendKind::Rayon.create();
    let options = SpectralOptions::from(&config);
    let mut group = c.benchmark_group("spectral_clustering");
    group.sample_size(10);
    for proportion in [0.05, 0.1] {
        let (_, graph) = weighted_graph(backend.as_ref(), &image, &config, proportion).unwrap();
        group.bench_with_input(
            BenchmarkId::new("discretize", proportion),
            &graph,
            |b, graph| {
                b.iter(|| {
                    let _ = black_box(spectral_clustering(graph, &options));
                });
            },
        );
    }
}

criterion_group!(name = benches;
config = Criterion::default().measurement_time(Duration::from_secs(10)).warm_up_time(Duration::from_secs(3));
targets = bench_gaussian_filter, bench_rescale);
criterion_group!(name = benches1;
config = Criterion::default().measurement_time(Duration::from_secs(10)).warm_up_time(Duration::from_secs(3));
targets = bench_img_to_graph, bench_set_graph_data, bench_connected_components);
criterion_group!(name = benches2;
config = Criterion::default().measurement_time(Duration::from_secs(30)).warm_up_time(Duration::from_secs(5));
targets = bench_spectral_clustering);
criterion_main!(benches, benches1, benches2);
