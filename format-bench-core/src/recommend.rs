//! Cross-format recommendations for a single report, and geometric-mean roll-ups over
//! many reports.
//!
//! A format that lacks the metric an objective needs is left out of that objective; the
//! baseline table is never recommended.

use std::collections::{BTreeMap, BTreeSet};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{
  pattern::PatternKind,
  pick_min_by,
  report::{
    DatasetInfo, FormatResult, Report, FULL_SCAN, POINT_LOOKUP, RANDOM_ACCESS, SELECTIVE_PREDICATE,
  },
  stats::geometric_mean,
};

/// Read-latency queries in priority order; the first one a format reports is used.
pub const READ_LATENCY_QUERIES: [&str; 3] = [RANDOM_ACCESS, POINT_LOOKUP, SELECTIVE_PREDICATE];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
  StorageFirst,
  CompressionSpeedFirst,
  DecompressionSpeedFirst,
  ReadLatencyFirst,
  ScanFirst,
}

impl Objective {
  pub const ALL: [Objective; 5] = [
    Objective::StorageFirst,
    Objective::CompressionSpeedFirst,
    Objective::DecompressionSpeedFirst,
    Objective::ReadLatencyFirst,
    Objective::ScanFirst,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      Objective::StorageFirst => "storage_first",
      Objective::CompressionSpeedFirst => "compression_speed_first",
      Objective::DecompressionSpeedFirst => "decompression_speed_first",
      Objective::ReadLatencyFirst => "read_latency_first",
      Objective::ScanFirst => "scan_first",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
  pub format: String,
  pub reason: String,
}

pub type Recommendations = BTreeMap<Objective, Recommendation>;

/// The metrics the recommender compares. Implemented both for a single run's
/// [`FormatResult`] and for the cross-run [`FormatSummary`].
pub trait FormatMetrics {
  fn is_baseline(&self) -> bool;
  fn compression_ratio(&self) -> Option<f64>;
  fn compression_speed_mb_s(&self) -> Option<f64>;
  fn decompression_speed_mb_s(&self) -> Option<f64>;
  fn query_median_ms(&self, query: &str) -> Option<f64>;

  /// First available read-latency metric, with the query it came from.
  fn read_latency_ms(&self) -> Option<(&'static str, f64)> {
    READ_LATENCY_QUERIES
      .iter()
      .find_map(|&query| self.query_median_ms(query).map(|ms| (query, ms)))
  }
}

impl FormatMetrics for FormatResult {
  fn is_baseline(&self) -> bool {
    self.baseline
  }

  fn compression_ratio(&self) -> Option<f64> {
    self.compression_ratio
  }

  fn compression_speed_mb_s(&self) -> Option<f64> {
    self.write.as_ref().and_then(|w| w.compression_speed_mb_s)
  }

  fn decompression_speed_mb_s(&self) -> Option<f64> {
    self.write.as_ref().and_then(|w| w.decompression_speed_mb_s)
  }

  fn query_median_ms(&self, query: &str) -> Option<f64> {
    FormatResult::query_median_ms(self, query)
  }
}

/// Best format per objective. Ties keep the format seen first.
pub fn recommend_formats<'a, M, I>(formats: I) -> Recommendations
where
  M: FormatMetrics + 'a,
  I: IntoIterator<Item = (&'a str, &'a M)>,
{
  let candidates: Vec<(&str, &M)> = formats
    .into_iter()
    .filter(|(_, metrics)| !metrics.is_baseline())
    .collect();

  let mut out = Recommendations::new();
  for objective in Objective::ALL {
    // (score to minimize, human-readable reason)
    let metric = |metrics: &M| -> Option<(f64, String)> {
      match objective {
        Objective::StorageFirst => metrics
          .compression_ratio()
          .map(|r| (-r, format!("highest compression ratio ({r:.3})"))),
        Objective::CompressionSpeedFirst => metrics
          .compression_speed_mb_s()
          .map(|s| (-s, format!("highest compression speed ({s:.2} MB/s)"))),
        Objective::DecompressionSpeedFirst => metrics
          .decompression_speed_mb_s()
          .map(|s| (-s, format!("highest decompression speed ({s:.2} MB/s)"))),
        Objective::ReadLatencyFirst => metrics
          .read_latency_ms()
          .map(|(query, ms)| (ms, format!("lowest {query} median ({ms:.3} ms)"))),
        Objective::ScanFirst => metrics
          .query_median_ms(FULL_SCAN)
          .map(|ms| (ms, format!("lowest {FULL_SCAN} median ({ms:.3} ms)"))),
      }
    };

    let scored = candidates
      .iter()
      .filter_map(|(name, metrics)| metric(*metrics).map(|(score, reason)| (*name, score, reason)));
    if let Some((name, _, reason)) = pick_min_by(scored, |(_, score, _)| Some(*score)) {
      out.insert(
        objective,
        Recommendation {
          format: name.to_string(),
          reason,
        },
      );
    }
  }
  out
}

/// Recommendations over the successfully measured formats of one report.
pub fn recommend(report: &Report) -> Recommendations {
  recommend_formats(report.results())
}

/// Geometric means for one format across every report it succeeded in.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FormatSummary {
  pub datasets: usize,
  pub baseline: bool,
  pub compression_ratio_geomean: Option<f64>,
  pub compression_time_s_geomean: Option<f64>,
  pub compression_speed_mb_s_geomean: Option<f64>,
  pub decompression_time_s_geomean: Option<f64>,
  pub decompression_speed_mb_s_geomean: Option<f64>,
  pub output_size_bytes_geomean: Option<f64>,
  pub query_median_ms_geomean: IndexMap<String, Option<f64>>,
  pub like_median_ms_geomean: BTreeMap<PatternKind, Option<f64>>,
}

impl FormatMetrics for FormatSummary {
  fn is_baseline(&self) -> bool {
    self.baseline
  }

  fn compression_ratio(&self) -> Option<f64> {
    self.compression_ratio_geomean
  }

  fn compression_speed_mb_s(&self) -> Option<f64> {
    self.compression_speed_mb_s_geomean
  }

  fn decompression_speed_mb_s(&self) -> Option<f64> {
    self.decompression_speed_mb_s_geomean
  }

  fn query_median_ms(&self, query: &str) -> Option<f64> {
    self.query_median_ms_geomean.get(query).copied().flatten()
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
  pub dataset_count: usize,
  pub datasets: Vec<DatasetInfo>,
  pub formats: IndexMap<String, FormatSummary>,
  pub recommendations: Recommendations,
}

/// Mean LIKE median per pattern kind within one format result.
fn like_means(result: &FormatResult) -> BTreeMap<PatternKind, f64> {
  let mut buckets: BTreeMap<PatternKind, Vec<f64>> = BTreeMap::new();
  for point in result.like_by_col.values().flatten() {
    if let Some(kind) = point.spec.kind {
      buckets.entry(kind).or_default().push(point.measurement.median_ms);
    }
  }
  buckets
    .into_iter()
    .map(|(kind, values)| (kind, values.iter().sum::<f64>() / values.len() as f64))
    .collect()
}

/// Roll many reports up into per-format geometric means. Formats are listed by name;
/// metrics missing from a report are simply not contributed.
pub fn aggregate(reports: &[Report]) -> Summary {
  let names: BTreeSet<&str> = reports
    .iter()
    .flat_map(|report| report.results().map(|(name, _)| name))
    .collect();

  let mut formats = IndexMap::new();
  for name in names {
    let results: Vec<&FormatResult> = reports
      .iter()
      .filter_map(|report| report.formats.get(name).and_then(|entry| entry.result()))
      .collect();
    let writes = || results.iter().filter_map(|r| r.write.as_ref());

    let mut query_names: Vec<&str> = Vec::new();
    for result in &results {
      for query in result.queries.keys() {
        if !query_names.contains(&query.as_str()) {
          query_names.push(query);
        }
      }
    }
    let query_median_ms_geomean = query_names
      .into_iter()
      .map(|query| {
        let mean = geometric_mean(results.iter().filter_map(|r| r.query_median_ms(query)));
        (query.to_string(), mean)
      })
      .collect();

    let like: Vec<BTreeMap<PatternKind, f64>> = results.iter().map(|r| like_means(r)).collect();
    let like_median_ms_geomean = PatternKind::ALL
      .into_iter()
      .map(|kind| (kind, geometric_mean(like.iter().filter_map(|m| m.get(&kind).copied()))))
      .collect();

    let summary = FormatSummary {
      datasets: results.len(),
      baseline: results.iter().any(|r| r.baseline),
      compression_ratio_geomean: geometric_mean(results.iter().filter_map(|r| r.compression_ratio)),
      compression_time_s_geomean: geometric_mean(writes().map(|w| w.compression_time_s)),
      compression_speed_mb_s_geomean: geometric_mean(writes().filter_map(|w| w.compression_speed_mb_s)),
      decompression_time_s_geomean: geometric_mean(writes().filter_map(|w| w.decompression_time_s)),
      decompression_speed_mb_s_geomean: geometric_mean(
        writes().filter_map(|w| w.decompression_speed_mb_s),
      ),
      output_size_bytes_geomean: geometric_mean(writes().map(|w| w.output_size_bytes as f64)),
      query_median_ms_geomean,
      like_median_ms_geomean,
    };
    formats.insert(name.to_string(), summary);
  }

  let recommendations = recommend_formats(formats.iter().map(|(name, s)| (name.as_str(), s)));
  Summary {
    dataset_count: reports.len(),
    datasets: reports.iter().map(|r| r.dataset.clone()).collect(),
    formats,
    recommendations,
  }
}
