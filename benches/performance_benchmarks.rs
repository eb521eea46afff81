use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use lactrs::{build_summary, parse_import_rows, reconcile_points, Metrics, StagePoint, ThresholdEstimator};

/// Performance benchmarks for the threshold analysis pipeline
///
/// Real tests have a handful of stages; the larger sizes guard against
/// accidental quadratic behavior.

fn create_points(count: usize) -> Vec<StagePoint> {
    let now = Utc::now();
    (0..count)
        .map(|i| StagePoint {
            stage_index: i as u32,
            pace_seconds_per_km: 360.0 - i as f64 * 0.5,
            speed_kmh: None,
            lactate_mmol: 1.0 + (i as f64 * 0.05).powf(1.6),
            hr_bpm: Some(120 + (i % 80) as u16),
            rpe: None,
            comments: None,
            metrics: Metrics::new(),
            measured_at: now,
        })
        // Reverse order so the estimator has to sort
        .rev()
        .collect()
}

fn create_paste(rows: usize) -> String {
    let mut raw = String::from("Stage,Pace,Lactate,HR,Cadence\n");
    for i in 0..rows {
        let pace = 360 - (i % 120);
        raw.push_str(&format!(
            "{},{}:{:02},{:.1},{},{}\n",
            i,
            pace / 60,
            pace % 60,
            1.0 + i as f64 * 0.1,
            120 + i % 80,
            165 + i % 20
        ));
    }
    raw
}

fn bench_threshold_estimation(c: &mut Criterion) {
    let mut group = c.benchmark_group("Threshold Estimation");

    for &size in &[8, 100, 1000] {
        let points = create_points(size);

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("estimate", size), &points, |b, points| {
            b.iter(|| ThresholdEstimator::estimate(black_box(points)));
        });
    }

    group.finish();
}

fn bench_summary(c: &mut Criterion) {
    let points = create_points(12);
    let thresholds = ThresholdEstimator::estimate(&points);

    c.bench_function("build_summary", |b| {
        b.iter(|| {
            build_summary(
                black_box(&points),
                thresholds.lt1.as_ref(),
                thresholds.lt2.as_ref(),
            )
        });
    });
}

fn bench_paste_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("Paste Parsing");

    for &rows in &[10, 100, 1000] {
        let raw = create_paste(rows);

        group.throughput(Throughput::Bytes(raw.len() as u64));
        group.bench_with_input(BenchmarkId::new("parse_import_rows", rows), &raw, |b, raw| {
            b.iter(|| parse_import_rows(black_box(raw)));
        });
    }

    group.finish();
}

fn bench_reconcile(c: &mut Criterion) {
    let existing = create_points(100);
    let incoming = create_points(50);

    c.bench_function("reconcile_points", |b| {
        b.iter(|| reconcile_points(black_box(&existing), black_box(&incoming)));
    });
}

criterion_group!(
    benches,
    bench_threshold_estimation,
    bench_summary,
    bench_paste_parsing,
    bench_reconcile
);

criterion_main!(benches);
