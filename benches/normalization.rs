//! Cycle normalisation benchmarks
//!
//! CMC writes forces at 100-1000 Hz; every muscle of every trial goes
//! through a spline fit and a 101-point resample.
//!
//! Run with: cargo bench --bench normalization

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use osim_pipeline::results::group::mean_std;
use osim_pipeline::results::{normalize_cycle, CubicSpline, CYCLE_POINTS};

const SAMPLE_COUNTS: [usize; 3] = [100, 1_000, 10_000];

#[allow(clippy::cast_precision_loss)]
fn force_series(samples: usize) -> (Vec<f64>, Vec<f64>) {
    let time: Vec<f64> = (0..samples).map(|i| i as f64 / samples as f64).collect();
    let force = time
        .iter()
        .map(|t| 400.0 + 300.0 * (std::f64::consts::TAU * t).sin())
        .collect();
    (time, force)
}

/// Spline construction (tridiagonal solve)
fn bench_spline_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("spline_fit");
    for samples in SAMPLE_COUNTS {
        let (time, force) = force_series(samples);
        group.bench_with_input(BenchmarkId::from_parameter(samples), &(time, force), |b, (t, f)| {
            b.iter(|| CubicSpline::new(black_box(t), black_box(f)));
        });
    }
    group.finish();
}

/// Fit plus resample onto the percent-of-cycle axis
fn bench_normalize_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize_cycle");
    for samples in SAMPLE_COUNTS {
        let (time, force) = force_series(samples);
        group.bench_with_input(BenchmarkId::from_parameter(samples), &(time, force), |b, (t, f)| {
            b.iter(|| normalize_cycle(black_box(t), black_box(f), 0.1, 0.9));
        });
    }
    group.finish();
}

/// Cohort mean/std over normalised series
fn bench_mean_std(c: &mut Criterion) {
    let mut group = c.benchmark_group("mean_std");
    for members in [5, 20, 100] {
        let series: Vec<Vec<f64>> = (0..members)
            .map(|m| (0..CYCLE_POINTS).map(|i| (i * (m + 1)) as f64).collect())
            .collect();
        group.bench_with_input(BenchmarkId::from_parameter(members), &series, |b, series| {
            let refs: Vec<&[f64]> = series.iter().map(Vec::as_slice).collect();
            b.iter(|| mean_std(black_box(&refs)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_spline_fit, bench_normalize_cycle, bench_mean_std);
criterion_main!(benches);
