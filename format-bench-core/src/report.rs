//! The per-run report: dataset metadata, column choices, and one entry per format.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{
  calibrate::SelectivitySpec,
  measure::Measurement,
  profile::ColumnProfile,
  recommend::Recommendations,
  select::AutoSelection,
  types::TypeBucket,
};

pub const FULL_SCAN: &str = "full_scan_min";
pub const RANDOM_ACCESS: &str = "random_access";
pub const POINT_LOOKUP: &str = "point_lookup";
pub const SELECTIVE_PREDICATE: &str = "selective_predicate";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetInfo {
  pub label: String,
  pub input: String,
  pub input_type: String,
  pub rows: u64,
  /// Rows in the input before a row limit.
  #[serde(default)]
  pub input_rows: Option<u64>,
  #[serde(default)]
  pub dropped_rows: Option<u64>,
  /// Size of the ingested data. Under a row limit this is the input size scaled by
  /// `rows / input_rows`.
  #[serde(default)]
  pub input_size_bytes: Option<u64>,
  #[serde(default)]
  pub column_type_counts: BTreeMap<TypeBucket, usize>,
  /// Mean NDV ratio of the columns in each bucket.
  #[serde(default)]
  pub ndv_ratio_by_type: BTreeMap<TypeBucket, f64>,
}

impl DatasetInfo {
  pub fn new(
    label: impl Into<String>,
    input: impl Into<String>,
    input_type: impl Into<String>,
    rows: u64,
    input_size_bytes: Option<u64>,
    profiles: &[ColumnProfile],
  ) -> Self {
    let mut column_type_counts = BTreeMap::new();
    let mut ratios: BTreeMap<TypeBucket, Vec<f64>> = BTreeMap::new();
    for profile in profiles {
      *column_type_counts.entry(profile.bucket).or_default() += 1;
      if let Some(ratio) = profile.ndv_ratio {
        ratios.entry(profile.bucket).or_default().push(ratio);
      }
    }
    let ndv_ratio_by_type = ratios
      .into_iter()
      .map(|(bucket, values)| (bucket, values.iter().sum::<f64>() / values.len() as f64))
      .collect();

    DatasetInfo {
      label: label.into(),
      input: input.into(),
      input_type: input_type.into(),
      rows,
      input_rows: None,
      dropped_rows: None,
      input_size_bytes,
      column_type_counts,
      ndv_ratio_by_type,
    }
  }

  /// Record how many input rows the base table holds.
  pub fn with_input_rows(mut self, input_rows: Option<u64>) -> Self {
    self.input_rows = input_rows;
    self.dropped_rows = input_rows.map(|n| n.saturating_sub(self.rows));
    self
  }
}

/// The machine and engine a report was measured on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemInfo {
  pub os: String,
  pub arch: String,
  pub cpus: Option<usize>,
  #[serde(default)]
  pub engine_version: Option<String>,
  pub tool_version: String,
}

/// Literals calibrated on the base table, shared by every format.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
  pub selective: Option<SelectivitySpec>,
  #[serde(default)]
  pub range: IndexMap<String, Vec<SelectivitySpec>>,
  #[serde(default)]
  pub like: IndexMap<String, Vec<SelectivitySpec>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteMetadata {
  pub path: String,
  pub output_size_bytes: u64,
  pub compression_time_s: f64,
  #[serde(default)]
  pub compression_speed_mb_s: Option<f64>,
  #[serde(default)]
  pub decompression_time_s: Option<f64>,
  #[serde(default)]
  pub decompression_speed_mb_s: Option<f64>,
  /// Backend specific settings and file facts (codec, row groups, ...).
  #[serde(default)]
  pub details: BTreeMap<String, serde_json::Value>,
}

/// A measured predicate together with the spec that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectivityPoint {
  #[serde(flatten)]
  pub spec: SelectivitySpec,
  #[serde(flatten)]
  pub measurement: Measurement,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Validation {
  pub expected_rows: u64,
  pub actual_rows: u64,
  pub count_match: bool,
  pub min_match: bool,
}

impl Validation {
  pub fn passed(&self) -> bool {
    self.count_match && self.min_match
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatResult {
  pub format: String,
  /// The raw in-memory table; never recommended.
  #[serde(default)]
  pub baseline: bool,
  #[serde(default)]
  pub write: Option<WriteMetadata>,
  /// Input size over output size.
  #[serde(default)]
  pub compression_ratio: Option<f64>,
  #[serde(default)]
  pub queries: IndexMap<String, Measurement>,
  #[serde(default)]
  pub selectivity_by_col: IndexMap<String, Vec<SelectivityPoint>>,
  #[serde(default)]
  pub like_by_col: IndexMap<String, Vec<SelectivityPoint>>,
  #[serde(default)]
  pub best_select_col: Option<String>,
  #[serde(default)]
  pub best_select_col_avg_median_ms: Option<f64>,
  #[serde(default)]
  pub validation: Option<Validation>,
}

impl FormatResult {
  pub fn new(format: impl Into<String>, baseline: bool) -> Self {
    FormatResult {
      format: format.into(),
      baseline,
      write: None,
      compression_ratio: None,
      queries: IndexMap::new(),
      selectivity_by_col: IndexMap::new(),
      like_by_col: IndexMap::new(),
      best_select_col: None,
      best_select_col_avg_median_ms: None,
      validation: None,
    }
  }

  pub fn query_median_ms(&self, query: &str) -> Option<f64> {
    self.queries.get(query).map(|m| m.median_ms)
  }

  /// Record the range column whose sweep has the lowest mean median.
  pub fn finalize(&mut self) {
    let mut best: Option<(&String, f64)> = None;
    for (column, points) in &self.selectivity_by_col {
      if points.is_empty() {
        continue;
      }
      let mean = points.iter().map(|p| p.measurement.median_ms).sum::<f64>() / points.len() as f64;
      if best.map_or(true, |(_, b)| mean < b) {
        best = Some((column, mean));
      }
    }
    let (column, mean) = match best {
      Some((column, mean)) => (Some(column.clone()), Some(mean)),
      None => (None, None),
    };
    self.best_select_col = column;
    self.best_select_col_avg_median_ms = mean;
  }
}

/// Outcome of one format's benchmark.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FormatEntry {
  Ok(FormatResult),
  Failed { error: String },
}

impl FormatEntry {
  pub fn result(&self) -> Option<&FormatResult> {
    match self {
      FormatEntry::Ok(result) => Some(result),
      FormatEntry::Failed { .. } => None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
  #[serde(default)]
  pub system: SystemInfo,
  pub dataset: DatasetInfo,
  pub columns: AutoSelection,
  #[serde(default)]
  pub profiles: Vec<ColumnProfile>,
  #[serde(default)]
  pub calibration: Calibration,
  pub formats: IndexMap<String, FormatEntry>,
  #[serde(default)]
  pub recommendations: Recommendations,
}

impl Report {
  /// Successfully measured formats, in insertion order.
  pub fn results(&self) -> impl Iterator<Item = (&str, &FormatResult)> {
    self
      .formats
      .iter()
      .filter_map(|(name, entry)| entry.result().map(|r| (name.as_str(), r)))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_input_rows_and_dropped_rows() {
    let info = DatasetInfo::new("d", "d.csv", "csv", 100, Some(50), &[]);
    assert_eq!((None, None), (info.input_rows, info.dropped_rows));

    let limited = info.clone().with_input_rows(Some(1000));
    assert_eq!(Some(1000), limited.input_rows);
    assert_eq!(Some(900), limited.dropped_rows);

    // Reports written before these fields existed still load.
    let mut json = serde_json::to_value(&info).unwrap();
    json.as_object_mut().unwrap().remove("input_rows");
    json.as_object_mut().unwrap().remove("dropped_rows");
    let back: DatasetInfo = serde_json::from_value(json).unwrap();
    assert_eq!(info, back);
  }
}
