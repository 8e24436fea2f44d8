//! Benchmarks for the analysis pipeline and chart pattern scan.

use chrono::{Duration, NaiveDate};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use trendstage::oscillators::Oscillators;
use trendstage::prelude::*;
use trendstage::swings::detect_swings;

/// Generate realistic bars
fn generate_series(n: usize) -> Series {
  let start = NaiveDate::from_ymd_opt(2015, 1, 1).unwrap();
  let mut bars = Vec::with_capacity(n);
  let mut price = 100.0;

  for i in 0..n {
    let change = ((i * 7 + 13) % 100) as f64 / 50.0 - 1.0; // Deterministic "random"
    let volatility = 2.0 + ((i * 3) % 10) as f64 / 5.0;

    let o = price;
    let c = price * (1.0 + change / 100.0);
    let h = o.max(c) * (1.0 + volatility / 200.0);
    let l = o.min(c) * (1.0 - volatility / 200.0);
    let v = 1_000_000.0 + ((i * 11) % 17) as f64 * 50_000.0;

    bars.push(Bar::new(start + Duration::days(i as i64), o, h, l, c, v));
    price = c;
  }

  Series::new(bars, TimeFrame::Daily).unwrap()
}

fn bench_oscillators(c: &mut Criterion) {
  let closes = generate_series(1000).closes();
  let cfg = OscillatorConfig::default();

  c.bench_function("oscillators_1000_bars", |b| {
    b.iter(|| {
      let _ = black_box(Oscillators::compute(black_box(&closes), &cfg));
    })
  });
}

fn bench_pattern_scan(c: &mut Criterion) {
  let series = generate_series(1000);
  let swings = detect_swings(series.bars(), &SwingConfig::default());
  let scanner = PatternScannerBuilder::new().with_all_defaults().build().unwrap();

  c.bench_function("scan_all_patterns_1000_bars", |b| {
    b.iter(|| {
      let _ = black_box(scanner.scan(black_box(&series), black_box(&swings.points)));
    })
  });
}

fn bench_analyze_scaling(c: &mut Criterion) {
  let analyzer = AnalyzerBuilder::new().build().unwrap();

  let mut group = c.benchmark_group("analyze");

  for size in [250, 1000, 5000].iter() {
    let series = generate_series(*size);
    let bench = generate_series(*size);

    group.bench_with_input(BenchmarkId::new("with_benchmark", size), size, |b, _| {
      b.iter(|| {
        let _ = black_box(analyzer.analyze(black_box(&series), Some(&bench)));
      })
    });
  }

  group.finish();
}

fn bench_parallel_scan(c: &mut Criterion) {
  let series: Vec<Series> = (0..4).map(|_| generate_series(1000)).collect();
  let bench = generate_series(1000);
  let analyzer = AnalyzerBuilder::new().build().unwrap();

  let instruments: Vec<(&str, &Series)> =
    vec![("SYM1", &series[0]), ("SYM2", &series[1]), ("SYM3", &series[2]), ("SYM4", &series[3])];

  c.bench_function("parallel_analyze_4_instruments", |b| {
    b.iter(|| {
      let _ = black_box(scan_parallel(black_box(&analyzer), instruments.clone(), Some(&bench)));
    })
  });
}

criterion_group!(
  benches,
  bench_oscillators,
  bench_pattern_scan,
  bench_analyze_scaling,
  bench_parallel_scan,
);

criterion_main!(benches);
