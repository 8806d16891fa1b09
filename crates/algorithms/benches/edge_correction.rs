//! Benchmarks for the derivative + edge correction cycle

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use terraflux_algorithms::edge::{expand, grow, restore};
use terraflux_algorithms::terrain::{partial_derivatives, DerivativeParams};
use terraflux_core::{AnalysisRegion, GeoTransform, Raster};

fn create_dem(size: usize) -> Raster<f64> {
    let mut dem = Raster::new(size, size);
    dem.set_transform(GeoTransform::new(0.0, size as f64, 1.0, -1.0));

    for row in 0..size {
        for col in 0..size {
            let base = (row + col) as f64;
            let variation = ((row * 7 + col * 13) % 100) as f64 / 10.0;
            dem.set(row, col, base + variation).unwrap();
        }
    }
    dem
}

fn bench_grow(c: &mut Criterion) {
    let mut group = c.benchmark_group("grow_derivative_halo");

    for size in [128, 256, 512].iter() {
        let dem = create_dem(*size);
        let slope = partial_derivatives(&dem, DerivativeParams::default())
            .unwrap()
            .slope;

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| grow(black_box(&slope)).unwrap())
        });
    }

    group.finish();
}

fn bench_expand_restore(c: &mut Criterion) {
    let mut group = c.benchmark_group("expand_derive_restore");

    for size in [128, 256, 512].iter() {
        let dem = create_dem(*size);
        let region = AnalysisRegion::of(&dem).unwrap();
        let params = DerivativeParams::default();

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let halo = region.expand(params.halo());
                let grown = expand(black_box(&dem), &halo).unwrap();
                let d = partial_derivatives(&grown, params).unwrap();
                restore(&d.dxx, &halo).unwrap()
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_grow, bench_expand_restore);
criterion_main!(benches);
