/// Median and nearest-rank 95th percentile of a latency sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencySummary {
  pub median_ms: f64,
  pub p95_ms: f64,
  pub min_ms: f64,
  pub max_ms: f64,
}

impl LatencySummary {
  /// Returns `None` for an empty sample.
  ///
  /// The median averages the two middle values for even sizes; the p95 is the sorted
  /// sample at index `floor(0.95 * (n - 1))`.
  pub fn from_samples(samples: &[f64]) -> Option<LatencySummary> {
    if samples.is_empty() {
      return None;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);

    let n = sorted.len();
    let median_ms = if n % 2 == 1 {
      sorted[n / 2]
    } else {
      (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    };

    Some(LatencySummary {
      median_ms,
      p95_ms: sorted[p95_index(n)],
      min_ms: sorted[0],
      max_ms: sorted[n - 1],
    })
  }
}

/// Nearest-rank index of the 95th percentile in a sorted sample of size `n >= 1`.
pub fn p95_index(n: usize) -> usize {
  (0.95 * (n.saturating_sub(1)) as f64).floor() as usize
}

/// `exp(mean(ln v))` over the finite, strictly positive values; `None` when there are none.
pub fn geometric_mean<I>(values: I) -> Option<f64>
where
  I: IntoIterator<Item = f64>,
{
  let (sum, count) = values
    .into_iter()
    .filter(|v| v.is_finite() && *v > 0.0)
    .fold((0.0, 0usize), |(sum, count), v| (sum + v.ln(), count + 1));
  (count > 0).then(|| (sum / count as f64).exp())
}

#[cfg(test)]
mod tests {
  use rand::{rngs::SmallRng, Rng, SeedableRng};
  use rstest::rstest;

  use super::*;

  #[rstest]
  #[case(&[5.0], 5.0, 5.0)]
  #[case(&[3.0, 1.0, 2.0], 2.0, 2.0)]
  #[case(&[4.0, 1.0, 3.0, 2.0], 2.5, 3.0)]
  #[case(&[7.0, 1.0, 6.0, 2.0, 5.0, 3.0, 4.0], 4.0, 6.0)]
  fn test_summary(#[case] samples: &[f64], #[case] median: f64, #[case] p95: f64) {
    let summary = LatencySummary::from_samples(samples).unwrap();
    assert_eq!(median, summary.median_ms);
    assert_eq!(p95, summary.p95_ms);
  }

  #[rstest]
  #[case(1, 0)]
  #[case(2, 0)]
  #[case(7, 5)]
  #[case(20, 18)]
  #[case(21, 19)]
  #[case(100, 94)]
  fn test_p95_index(#[case] n: usize, #[case] expected: usize) {
    assert_eq!(expected, p95_index(n));
  }

  #[test]
  fn test_median_within_sample_bounds() {
    let mut rng = SmallRng::seed_from_u64(11);
    for n in 1..64 {
      let samples: Vec<f64> = (0..n).map(|_| rng.gen_range(0.1..50.0)).collect();
      let summary = LatencySummary::from_samples(&samples).unwrap();
      assert!(summary.min_ms <= summary.median_ms && summary.median_ms <= summary.max_ms);

      let mut sorted = samples.clone();
      sorted.sort_by(f64::total_cmp);
      assert_eq!(sorted[p95_index(n)], summary.p95_ms);
    }
  }

  #[test]
  fn test_empty_sample() {
    assert!(LatencySummary::from_samples(&[]).is_none());
  }

  #[test]
  fn test_geometric_mean() {
    let mean = geometric_mean([2.0, 8.0]).unwrap();
    assert!((mean - 4.0).abs() < 1e-12);
    let mean = geometric_mean([0.0, -1.0, f64::NAN, 9.0]).unwrap();
    assert!((mean - 9.0).abs() < 1e-12);
    assert_eq!(None, geometric_mean([0.0, -3.0]));
    assert_eq!(None, geometric_mean(Vec::new()));
  }
}
