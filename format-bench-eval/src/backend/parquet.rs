//! Parquet written by DuckDB's `COPY`, read back through `read_parquet`.
//!
//! Besides the query battery, each file is decoded once through the Arrow reader to get a
//! decompression time that does not depend on DuckDB's scan pipeline.

use std::{collections::BTreeMap, fs::File, path::Path, time::Instant};

use anyhow::{Context, Result};
use format_bench_core::{report::WriteMetadata, sql::string_literal};
use parquet::{
  arrow::arrow_reader::ParquetRecordBatchReaderBuilder,
  file::reader::{FileReader, SerializedFileReader},
};
use serde_json::json;
use tracing::debug;

use super::{file_size, prepare_dir, timed_copy, Backend, Written};
use crate::engine::DuckDbEngine;

#[derive(Debug, Clone)]
pub struct ParquetBackend {
  pub codec: String,
  pub row_group_size: usize,
  pub compression_level: Option<i32>,
}

/// Facts read from the Parquet footer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileFacts {
  pub rows: i64,
  pub row_groups: usize,
  pub compressed_bytes: i64,
  pub uncompressed_bytes: i64,
}

pub fn file_facts(path: &Path) -> Result<FileFacts> {
  let reader = SerializedFileReader::new(File::open(path)?)?;
  let metadata = reader.metadata();
  let row_groups = metadata.row_groups();
  Ok(FileFacts {
    rows: metadata.file_metadata().num_rows(),
    row_groups: row_groups.len(),
    compressed_bytes: row_groups.iter().map(|rg| rg.compressed_size()).sum(),
    uncompressed_bytes: row_groups.iter().map(|rg| rg.total_byte_size()).sum(),
  })
}

/// Decode every record batch and return `(rows, seconds)`.
pub fn decode(path: &Path) -> Result<(usize, f64)> {
  let start = Instant::now();
  let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(path)?)?
    .with_batch_size(8192)
    .build()?;
  let mut rows = 0;
  for batch in reader {
    rows += batch?.num_rows();
  }
  Ok((rows, start.elapsed().as_secs_f64()))
}

impl ParquetBackend {
  fn copy_sql(&self, table: &str, path: &Path) -> String {
    let level = self
      .compression_level
      .map(|level| format!(", COMPRESSION_LEVEL {level}"))
      .unwrap_or_default();
    format!(
      "COPY (SELECT * FROM {table}) TO {} (FORMAT PARQUET, COMPRESSION {}, ROW_GROUP_SIZE {}{level})",
      string_literal(&path.display().to_string()),
      string_literal(&self.codec),
      self.row_group_size,
    )
  }
}

impl Backend for ParquetBackend {
  fn name(&self) -> String {
    format!("parquet_{}", self.codec.to_ascii_lowercase())
  }

  fn write(&self, engine: &DuckDbEngine, table: &str, out_dir: &Path) -> Result<Written> {
    let dir = out_dir.join(self.name());
    prepare_dir(&dir)?;
    let path = dir.join(format!("{table}.parquet"));

    let compression_time_s = timed_copy(engine, &self.copy_sql(table, &path))?;
    let output_size_bytes = file_size(&path)?;
    let facts = file_facts(&path).with_context(|| format!("unreadable footer in {}", path.display()))?;
    let (decoded_rows, decompression_time_s) = decode(&path)?;
    debug!(path = %path.display(), ?facts, decoded_rows, "parquet written");

    let mut details = BTreeMap::new();
    details.insert("codec".to_string(), json!(self.codec));
    details.insert("row_group_size".to_string(), json!(self.row_group_size));
    details.insert("compression_level".to_string(), json!(self.compression_level));
    details.insert("row_groups".to_string(), json!(facts.row_groups));
    details.insert("uncompressed_bytes".to_string(), json!(facts.uncompressed_bytes));
    details.insert("decoded_rows".to_string(), json!(decoded_rows));

    let path = path.display().to_string();
    Ok(Written {
      scan: format!("read_parquet({})", string_literal(&path)),
      write: Some(WriteMetadata {
        path,
        output_size_bytes,
        compression_time_s,
        compression_speed_mb_s: None,
        decompression_time_s: Some(decompression_time_s),
        decompression_speed_mb_s: None,
        details,
      }),
    })
  }
}
