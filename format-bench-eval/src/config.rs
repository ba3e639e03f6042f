//! Benchmark configuration. Every field has a default, so a partial JSON file (or none
//! at all) is a valid configuration.

use std::{fs, path::Path};

use anyhow::{Context, Result};
use format_bench_core::{measure::MeasureOptions, select::SelectorConfig};
use serde::{Deserialize, Serialize};

use crate::ingest::CsvOptions;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
  /// Fractions swept on every range column.
  pub selectivities: Vec<f64>,
  /// Fraction used for the single `selective_predicate` query.
  pub selective_fraction: f64,
  pub like_selectivities: Vec<f64>,
  pub like_max_candidates: usize,
  pub like_pattern_len: usize,
  pub like_tests: bool,
  pub max_select_cols: usize,
  pub max_like_cols: usize,
}

impl Default for CalibrationConfig {
  fn default() -> Self {
    CalibrationConfig {
      selectivities: vec![0.01, 0.1, 0.25, 0.5, 0.9],
      selective_fraction: 0.01,
      like_selectivities: vec![0.01, 0.1, 0.5],
      like_max_candidates: 50,
      like_pattern_len: 3,
      like_tests: true,
      max_select_cols: 4,
      max_like_cols: 4,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatConfig {
  /// One Parquet variant is written per codec.
  pub parquet_codecs: Vec<String>,
  pub parquet_row_group_size: usize,
  pub parquet_compression_level: Option<i32>,
  pub vortex: bool,
  /// Benchmark the in-memory base table as a non-recommendable reference.
  pub baseline: bool,
}

impl Default for FormatConfig {
  fn default() -> Self {
    FormatConfig {
      parquet_codecs: vec!["zstd".to_string()],
      parquet_row_group_size: 128_000,
      parquet_compression_level: None,
      vortex: true,
      baseline: true,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
  /// Name of the ingested table.
  pub table: String,
  pub row_limit: Option<u64>,
  pub csv: CsvOptions,
  pub selector: SelectorConfig,
  pub calibration: CalibrationConfig,
  pub measurement: MeasureOptions,
  pub formats: FormatConfig,
  pub threads: Option<usize>,
  pub validate: bool,
  /// Named ad hoc queries; `{scan}` is replaced by each format's relation.
  pub queries: Vec<NamedQuery>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedQuery {
  pub name: String,
  pub sql: String,
}

impl Default for BenchConfig {
  fn default() -> Self {
    BenchConfig {
      table: "base_table".to_string(),
      row_limit: None,
      csv: CsvOptions::default(),
      selector: SelectorConfig::default(),
      calibration: CalibrationConfig::default(),
      measurement: MeasureOptions::default(),
      formats: FormatConfig::default(),
      threads: None,
      validate: true,
      queries: Vec::new(),
    }
  }
}

impl BenchConfig {
  pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    let text =
      fs::read_to_string(path).with_context(|| format!("failed to read config {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid config {}", path.display()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_partial_config_keeps_defaults() {
    let config: BenchConfig = serde_json::from_str(
      r#"{"selector": {"strict": true}, "measurement": {"repeats": 3}, "formats": {"vortex": false}}"#,
    )
    .unwrap();
    assert!(config.selector.strict);
    assert_eq!(1000, config.selector.target_ndv);
    assert_eq!(3, config.measurement.repeats);
    assert_eq!(1, config.measurement.warmup);
    assert!(!config.formats.vortex);
    assert_eq!(vec!["zstd".to_string()], config.formats.parquet_codecs);
    assert_eq!(vec![0.01, 0.1, 0.25, 0.5, 0.9], config.calibration.selectivities);
    assert!(config.validate);
  }

  #[test]
  fn test_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bench.json");
    std::fs::write(&path, r#"{"table": "t", "queries": [{"name": "n", "sql": "SELECT 1 FROM {scan}"}]}"#)
      .unwrap();
    let config = BenchConfig::from_file(&path).unwrap();
    assert_eq!("t", config.table);
    assert_eq!(1, config.queries.len());

    assert!(BenchConfig::from_file(dir.path().join("missing.json")).is_err());
  }
}
