//! Row-scaling series: the same dataset benchmarked at increasing row limits, one run
//! directory (`rows_<n>`) per limit.

use std::{
  collections::BTreeMap,
  fs,
  path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use format_bench_core::report::{Report, FULL_SCAN, RANDOM_ACCESS, SELECTIVE_PREDICATE};
use indexmap::IndexMap;
use serde::Serialize;
use tracing::warn;

use crate::output::{read_json, report_files};

pub const SUMMARY_FILE: &str = "row_scaling_summary.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricInfo {
  pub key: &'static str,
  pub label: &'static str,
  pub unit: &'static str,
}

const fn metric(key: &'static str, label: &'static str, unit: &'static str) -> MetricInfo {
  MetricInfo { key, label, unit }
}

pub const METRICS: [MetricInfo; 12] = [
  metric("compression_ratio", "Compression ratio", "ratio"),
  metric("output_size", "Compressed size", "bytes"),
  metric("write_time", "Compression time", "s"),
  metric("compression_speed", "Compression speed", "MB/s"),
  metric("decompression_time", "Decompression time", "s"),
  metric("decompression_speed", "Decompression speed", "MB/s"),
  metric("full_scan", "Full scan median", "ms"),
  metric("selective", "Selective predicate median", "ms"),
  metric("random_access", "Random access median", "ms"),
  metric("cold_full_scan", "Cold full scan", "ms"),
  metric("cold_selective", "Cold selective predicate", "ms"),
  metric("cold_random_access", "Cold random access", "ms"),
];

/// Comma separated positive row counts; `_` separators are allowed. Sorted, deduplicated.
pub fn parse_row_counts(raw: &str) -> Result<Vec<u64>> {
  let mut counts = Vec::new();
  for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
    let value: u64 = part
      .replace('_', "")
      .parse()
      .with_context(|| format!("invalid row count {part:?}"))?;
    if value == 0 {
      bail!("row count must be positive: {part}");
    }
    counts.push(value);
  }
  counts.sort_unstable();
  counts.dedup();
  Ok(counts)
}

pub fn run_dir(out_root: &Path, rows: u64) -> PathBuf {
  out_root.join(format!("rows_{rows}"))
}

/// One metric of one format in one report; `None` when missing or the format failed.
pub fn extract_metric(report: &Report, format: &str, key: &str) -> Option<f64> {
  let result = report.formats.get(format)?.result()?;
  let write = result.write.as_ref();
  let median = |query: &str| result.queries.get(query).map(|m| m.median_ms);
  let cold = |query: &str| result.queries.get(query).and_then(|m| m.cold_ms);
  match key {
    "compression_ratio" => result.compression_ratio,
    "output_size" => write.map(|w| w.output_size_bytes as f64),
    "write_time" => write.map(|w| w.compression_time_s),
    "compression_speed" => write.and_then(|w| w.compression_speed_mb_s),
    "decompression_time" => write.and_then(|w| w.decompression_time_s),
    "decompression_speed" => write.and_then(|w| w.decompression_speed_mb_s),
    "full_scan" => median(FULL_SCAN),
    "selective" => median(SELECTIVE_PREDICATE),
    "random_access" => median(RANDOM_ACCESS),
    "cold_full_scan" => cold(FULL_SCAN),
    "cold_selective" => cold(SELECTIVE_PREDICATE),
    "cold_random_access" => cold(RANDOM_ACCESS),
    _ => None,
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowScalingSummary {
  pub dataset: String,
  pub row_counts: Vec<u64>,
  pub metrics: Vec<MetricInfo>,
  pub formats: Vec<String>,
  /// metric key -> format -> one value per row count.
  pub series: IndexMap<String, IndexMap<String, Vec<Option<f64>>>>,
  /// Row count -> report path relative to the output root.
  pub reports: BTreeMap<String, String>,
}

/// A benchmarked row count: its report and where it was loaded from.
#[derive(Debug, Clone)]
pub struct ScalingRun {
  pub report: Report,
  pub path: String,
}

pub fn build_summary(runs: &BTreeMap<u64, ScalingRun>, include_baseline: bool) -> RowScalingSummary {
  let mut formats: Vec<String> = Vec::new();
  for run in runs.values() {
    for (name, entry) in &run.report.formats {
      let baseline = entry.result().is_some_and(|r| r.baseline);
      if baseline && !include_baseline {
        continue;
      }
      if !formats.contains(name) {
        formats.push(name.clone());
      }
    }
  }

  let series = METRICS
    .iter()
    .map(|metric| {
      let per_format: IndexMap<String, Vec<Option<f64>>> = formats
        .iter()
        .map(|format| {
          let values: Vec<Option<f64>> = runs
            .values()
            .map(|run| extract_metric(&run.report, format, metric.key))
            .collect();
          (format.clone(), values)
        })
        .collect();
      (metric.key.to_string(), per_format)
    })
    .collect();

  RowScalingSummary {
    dataset: runs
      .values()
      .next()
      .map(|run| run.report.dataset.label.clone())
      .unwrap_or_default(),
    row_counts: runs.keys().copied().collect(),
    metrics: METRICS.to_vec(),
    formats,
    series,
    reports: runs
      .iter()
      .map(|(rows, run)| (rows.to_string(), run.path.clone()))
      .collect(),
  }
}

/// First `report_*.json` of a run directory.
pub fn load_run(out_root: &Path, rows: u64) -> Result<ScalingRun> {
  let dir = run_dir(out_root, rows);
  let Some(path) = report_files(&dir)?.into_iter().next() else {
    bail!("no report_*.json in {}", dir.display());
  };
  let report = read_json(&path)?;
  let relative = path.strip_prefix(out_root).unwrap_or(&path).display().to_string();
  Ok(ScalingRun {
    report,
    path: relative,
  })
}

/// Every `rows_<n>` directory below `out_root` holding a report.
pub fn load_existing_runs(out_root: &Path) -> Result<BTreeMap<u64, ScalingRun>> {
  let mut runs = BTreeMap::new();
  for entry in fs::read_dir(out_root).with_context(|| format!("failed to list {}", out_root.display()))? {
    let entry = entry?;
    let name = entry.file_name();
    let Some(rows) = name
      .to_str()
      .and_then(|n| n.strip_prefix("rows_"))
      .and_then(|n| n.parse::<u64>().ok())
    else {
      continue;
    };
    match load_run(out_root, rows) {
      Ok(run) => {
        runs.insert(rows, run);
      }
      Err(err) => warn!(rows, error = %err, "skipping run directory"),
    }
  }
  if runs.is_empty() {
    bail!("no rows_* reports found in {}", out_root.display());
  }
  Ok(runs)
}

#[cfg(test)]
mod tests {
  use rstest::rstest;

  use super::*;

  #[rstest]
  #[case("1000,10", vec![10, 1000])]
  #[case("1_000_000, 2_000_000,1000000", vec![1_000_000, 2_000_000])]
  #[case(" 5 ,,", vec![5])]
  fn test_parse_row_counts(#[case] raw: &str, #[case] expected: Vec<u64>) {
    assert_eq!(expected, parse_row_counts(raw).unwrap());
  }

  #[rstest]
  #[case("0")]
  #[case("10,abc")]
  #[case("-5")]
  fn test_parse_row_counts_rejects(#[case] raw: &str) {
    assert!(parse_row_counts(raw).is_err());
  }

  #[test]
  fn test_metric_keys_are_extractable() {
    let keys: Vec<&str> = METRICS.iter().map(|m| m.key).collect();
    assert_eq!(12, keys.len());
    assert!(keys.contains(&"cold_random_access"));
  }
}
