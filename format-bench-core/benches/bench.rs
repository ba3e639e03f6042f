use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use format_bench_core::{
  pattern::{choose_patterns, CandidatePatterns, MeasuredPattern},
  stats::{geometric_mean, LatencySummary},
};
use rand::{distributions::Alphanumeric, rngs::SmallRng, Rng, SeedableRng};
use rand_distr::{Distribution, LogNormal};

/// Benchmark group for deriving and choosing LIKE candidates from sampled values.
fn bench_like_candidates(criterion: &mut Criterion) {
  let mut rng = SmallRng::seed_from_u64(7);
  let values: Vec<String> = (0..50)
    .map(|_| {
      let len = rng.gen_range(4..40);
      (&mut rng)
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
    })
    .collect();

  let mut group = criterion.benchmark_group("LIKE candidates");
  for pattern_len in [2, 3, 5] {
    group.bench_with_input(
      BenchmarkId::new("derive", pattern_len),
      &(&values, pattern_len),
      |b, (values, pattern_len)| {
        b.iter(|| CandidatePatterns::from_values(values.iter().map(String::as_str), *pattern_len))
      },
    );
  }

  let measured: Vec<MeasuredPattern> = (0..150)
    .map(|idx| MeasuredPattern {
      pattern: format!("p{idx}%"),
      selectivity: rng.gen_range(0.0..1.0),
    })
    .collect();
  group.bench_function("choose", |b| {
    b.iter(|| choose_patterns(&measured, &[0.01, 0.1, 0.5]))
  });
  group.finish();
}

/// Benchmark group for reducing latency samples.
fn bench_latency_summary(criterion: &mut Criterion) {
  let rng = SmallRng::seed_from_u64(11);
  let dist = LogNormal::new(0.0, 0.5).unwrap();
  let samples: Vec<f64> = dist.sample_iter(rng).take(10_000).collect();

  let mut group = criterion.benchmark_group("Latency summary");
  for n in [7, 100, 10_000] {
    group.bench_with_input(BenchmarkId::new("summary", n), &samples[..n], |b, s| {
      b.iter(|| LatencySummary::from_samples(s))
    });
    group.bench_with_input(BenchmarkId::new("geomean", n), &samples[..n], |b, s| {
      b.iter(|| geometric_mean(s.iter().copied()))
    });
  }
  group.finish();
}

criterion_group!(benches, bench_like_candidates, bench_latency_summary);
criterion_main!(benches);
