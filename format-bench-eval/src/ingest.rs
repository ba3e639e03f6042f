//! Loading the input dataset into the base table.

use std::{
  fmt, fs,
  path::{Path, PathBuf},
  str::FromStr,
};

use anyhow::{bail, Context, Result};
use format_bench_core::{engine::row_count, sql::string_literal};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::engine::DuckDbEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputType {
  Csv,
  Parquet,
}

impl InputType {
  /// `.parquet` files, and directories holding any, are Parquet; everything else is CSV.
  pub fn infer(path: &Path) -> InputType {
    let is_parquet = |p: &Path| p.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("parquet"));
    if path.is_dir() {
      let has_parquet = fs::read_dir(path)
        .map(|entries| entries.flatten().any(|entry| is_parquet(&entry.path())))
        .unwrap_or(false);
      if has_parquet {
        return InputType::Parquet;
      }
      return InputType::Csv;
    }
    if is_parquet(path) {
      InputType::Parquet
    } else {
      InputType::Csv
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      InputType::Csv => "csv",
      InputType::Parquet => "parquet",
    }
  }
}

impl fmt::Display for InputType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for InputType {
  type Err = anyhow::Error;

  fn from_str(s: &str) -> Result<Self> {
    match s.to_ascii_lowercase().as_str() {
      "csv" => Ok(InputType::Csv),
      "parquet" => Ok(InputType::Parquet),
      other => bail!("unknown input type {other:?}, expected csv or parquet"),
    }
  }
}

/// Options forwarded to DuckDB's CSV sniffer. Unset options are auto-detected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvOptions {
  pub delimiter: Option<String>,
  pub header: Option<bool>,
  pub nullstr: Option<String>,
  pub sample_size: Option<i64>,
  pub ignore_errors: bool,
  pub all_varchar: bool,
}

impl CsvOptions {
  /// Named arguments for `read_csv_auto`, each prefixed with `, `.
  pub fn to_args(&self) -> String {
    let mut args = String::new();
    if let Some(delimiter) = &self.delimiter {
      args.push_str(&format!(", delim={}", string_literal(delimiter)));
    }
    if let Some(header) = self.header {
      args.push_str(&format!(", header={header}"));
    }
    if let Some(nullstr) = &self.nullstr {
      args.push_str(&format!(", nullstr={}", string_literal(nullstr)));
    }
    if let Some(sample_size) = self.sample_size {
      args.push_str(&format!(", sample_size={sample_size}"));
    }
    if self.ignore_errors {
      args.push_str(", ignore_errors=true");
    }
    if self.all_varchar {
      args.push_str(", all_varchar=true");
    }
    args
  }
}

#[derive(Debug, Clone)]
pub struct IngestOptions {
  pub input: PathBuf,
  pub input_type: InputType,
  pub table: String,
  pub csv: CsvOptions,
  pub row_limit: Option<u64>,
}

/// Table function reading the input. Directories are globbed recursively.
pub fn source_expr(options: &IngestOptions) -> String {
  let path = options.input.display().to_string();
  match options.input_type {
    InputType::Csv => {
      let target = if options.input.is_dir() {
        format!("{path}/**/*.csv")
      } else {
        path
      };
      format!("read_csv_auto({}{})", string_literal(&target), options.csv.to_args())
    }
    InputType::Parquet => {
      let target = if options.input.is_dir() {
        format!("{path}/**/*.parquet")
      } else {
        path
      };
      format!("read_parquet({})", string_literal(&target))
    }
  }
}

/// Row counts of an ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ingested {
  /// Rows in the base table.
  pub rows: u64,
  /// Rows the input holds. Differs from `rows` only under a row limit.
  pub input_rows: u64,
}

impl Ingested {
  pub fn dropped_rows(&self) -> u64 {
    self.input_rows.saturating_sub(self.rows)
  }

  /// The share of `total_bytes` attributable to the ingested rows.
  pub fn scale_bytes(&self, total_bytes: u64) -> Option<u64> {
    if self.input_rows == 0 {
      return None;
    }
    if self.rows >= self.input_rows {
      return Some(total_bytes);
    }
    let scaled = total_bytes as u128 * self.rows as u128 / self.input_rows as u128;
    Some(scaled as u64)
  }
}

/// Create (or replace) the base table from the input and count what was loaded.
pub fn ingest(engine: &DuckDbEngine, options: &IngestOptions) -> Result<Ingested> {
  if !options.input.exists() {
    bail!("input {} does not exist", options.input.display());
  }
  let limit = options
    .row_limit
    .map(|n| format!(" LIMIT {n}"))
    .unwrap_or_default();
  engine
    .execute_batch(&format!(
      "CREATE OR REPLACE TABLE {} AS SELECT * FROM {}{limit}",
      options.table,
      source_expr(options)
    ))
    .with_context(|| format!("failed to ingest {}", options.input.display()))?;

  let rows = row_count(engine, &options.table)?;
  let input_rows = match options.row_limit {
    Some(_) => row_count(engine, &source_expr(options))?,
    None => rows,
  };
  info!(input = %options.input.display(), input_type = %options.input_type, rows, input_rows, "ingested");
  Ok(Ingested { rows, input_rows })
}

/// Size of a file, or the total size of every file below a directory.
pub fn input_size_bytes(path: &Path) -> Result<u64> {
  let metadata = fs::metadata(path).with_context(|| format!("failed to stat {}", path.display()))?;
  if metadata.is_file() {
    return Ok(metadata.len());
  }
  let mut total = 0;
  for entry in fs::read_dir(path)? {
    total += input_size_bytes(&entry?.path())?;
  }
  Ok(total)
}

#[cfg(test)]
mod tests {
  use rstest::rstest;

  use super::*;

  #[rstest]
  #[case("data.parquet", InputType::Parquet)]
  #[case("DATA.PARQUET", InputType::Parquet)]
  #[case("data.csv", InputType::Csv)]
  #[case("data.tbl", InputType::Csv)]
  fn test_infer_file(#[case] name: &str, #[case] expected: InputType) {
    assert_eq!(expected, InputType::infer(Path::new(name)));
  }

  #[rstest]
  #[case(1000, 1000, 5000, Some(5000))]
  #[case(100, 1000, 5000, Some(500))]
  #[case(0, 1000, 5000, Some(0))]
  #[case(0, 0, 5000, None)]
  fn test_scale_bytes(
    #[case] rows: u64,
    #[case] input_rows: u64,
    #[case] total: u64,
    #[case] expected: Option<u64>,
  ) {
    let ingested = Ingested { rows, input_rows };
    assert_eq!(expected, ingested.scale_bytes(total));
    assert_eq!(input_rows.saturating_sub(rows), ingested.dropped_rows());
  }

  #[test]
  fn test_csv_args() {
    let options = CsvOptions {
      delimiter: Some("|".into()),
      header: Some(false),
      nullstr: Some("\\N".into()),
      sample_size: None,
      ignore_errors: true,
      all_varchar: false,
    };
    assert_eq!(
      ", delim='|', header=false, nullstr='\\N', ignore_errors=true",
      options.to_args()
    );
    assert_eq!("", CsvOptions::default().to_args());
  }

  #[test]
  fn test_input_size_of_directory() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.csv"), "abc").unwrap();
    fs::create_dir(dir.path().join("nested")).unwrap();
    fs::write(dir.path().join("nested").join("b.csv"), "defgh").unwrap();
    assert_eq!(8, input_size_bytes(dir.path()).unwrap());
    assert_eq!(3, input_size_bytes(&dir.path().join("a.csv")).unwrap());
    assert_eq!(InputType::Csv, InputType::infer(dir.path()));
  }
}
