//! Criterion benchmarks for the per-frame hot paths.
//!
//! - Scan resolution from a fresh solver
//! - Waveform generation at several image sizes
//! - Field shift search over realistic lag ranges
//!
//! Run with: cargo bench --bench scan_hotpaths

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use nalgebra::Vector2;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use raster_scan::decomb::find_best_shift;
use raster_scan::geometry::{RectScan, ScanGeometry};
use raster_scan::trajectory::{generate, AffineMapper};

fn scan(pixel_size: f64) -> RectScan {
    let mut scan = RectScan::new().unwrap();
    scan.set_corners(
        Vector2::new(0.0, 0.0),
        Vector2::new(1e-4, 0.0),
        Vector2::new(0.0, 1e-4),
    )
    .unwrap();
    scan.set_pixel_size(pixel_size).unwrap();
    scan.set_sample_rate(2e6).unwrap();
    scan.set_overscan_percent(70.0).unwrap();
    scan.set_bidirectional(true).unwrap();
    scan
}

fn geometry(pixel_size: f64) -> ScanGeometry {
    scan(pixel_size).resolve().unwrap()
}

fn resolve_geometry(c: &mut Criterion) {
    c.bench_function("resolve_rect_scan", |b| {
        b.iter(|| {
            let mut s = scan(black_box(2e-7));
            s.resolve().unwrap()
        });
    });
}

/// Waveform generation for square images of increasing size.
fn waveform_generation(c: &mut Criterion) {
    let mut group = c.benchmark_group("waveform");
    let mapper = AffineMapper::scale(5e4, 5e4);

    for pixels in [128usize, 512, 1024] {
        let g = geometry(1e-4 / pixels as f64);
        group.throughput(Throughput::Elements(g.samples_per_frame() as u64));
        group.bench_with_input(BenchmarkId::new("generate", pixels), &g, |b, g| {
            b.iter(|| generate(black_box(g), &mapper).unwrap());
        });
    }

    group.finish();
}

/// Shift search on a noisy 512x512 image for the lag ranges used in practice.
fn shift_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("decomb");
    let mut rng = StdRng::seed_from_u64(42);
    let image = Array2::from_shape_fn((512, 512), |_| rng.gen_range(0.0..1.0));

    for max_shift in [10i64, 50, 200] {
        group.bench_with_input(
            BenchmarkId::new("find_best_shift", max_shift),
            &max_shift,
            |b, &max_shift| {
                b.iter(|| find_best_shift(black_box(image.view()), 0, max_shift));
            },
        );
    }

    group.finish();
}

criterion_group!(benches, resolve_geometry, waveform_generation, shift_search);
criterion_main!(benches);
