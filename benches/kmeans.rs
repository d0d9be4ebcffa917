use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::prelude::*;
use unsupervised_lab::*;

fn random_samples<T: Primitive>(sample_cnt: usize, sample_dims: usize) -> Matrix<T> {
    let mut rnd = StdRng::seed_from_u64(1337);
    let samples = (0..sample_cnt * sample_dims).map(|_| rnd.gen_range(T::zero()..T::one())).collect();
    Matrix::new(samples, sample_cnt, sample_dims).unwrap()
}

fn lloyd<T: Primitive>(c: &mut Criterion, name: &str) {
    let mut group = c.benchmark_group(format!("lloyd_{name}"));
    // (samples, dims, k)
    for (sample_cnt, sample_dims, k) in [(200, 2000, 32), (2000, 200, 32), (10000, 8, 32)] {
        let kmean = KMeans::new(random_samples::<T>(sample_cnt, sample_dims));
        group.bench_with_input(BenchmarkId::from_parameter(format!("{sample_cnt}x{sample_dims}")), &kmean, |b, kmean| {
            let conf = KMeansConfig::build().random_generator(StdRng::seed_from_u64(1337)).build();
            b.iter(|| kmean.kmeans_lloyd(black_box(k), KMEANS_MAX_ITERATIONS, KMeans::init_kmeanplusplus, &conf))
        });
    }
    group.finish();
}

fn lloyd_f64(c: &mut Criterion) { lloyd::<f64>(c, "f64"); }
fn lloyd_f32(c: &mut Criterion) { lloyd::<f32>(c, "f32"); }

fn kmeanplusplus(c: &mut Criterion) {
    let kmean = KMeans::new(random_samples::<f64>(10000, 32));
    let conf = KMeansConfig::build().random_generator(StdRng::seed_from_u64(1337)).build();
    // Zero iterations: seeding only
    c.bench_function("kmeanplusplus_10000x32_k32", |b| {
        b.iter(|| kmean.kmeans_lloyd(black_box(32), 0, KMeans::init_kmeanplusplus, &conf))
    });
}

fn pca_projection(c: &mut Criterion) {
    let data = random_samples::<f64>(2000, 784);
    c.bench_function("pca_2000x784_10_components", |b| {
        b.iter(|| pca(&NalgebraBackend, black_box(&data), 10))
    });
}

criterion_group!(benches, lloyd_f64, lloyd_f32, kmeanplusplus, pca_projection);
criterion_main!(benches);
