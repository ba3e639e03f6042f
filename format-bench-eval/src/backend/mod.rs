//! Storage formats under test. A backend materializes the base table in its format and
//! hands back a relation expression DuckDB can query.

mod parquet;
mod table;
mod vortex;

use std::{fs, path::Path, time::Instant};

use anyhow::{Context, Result};
use format_bench_core::report::WriteMetadata;

pub use self::{parquet::ParquetBackend, table::TableBackend, vortex::VortexBackend};
use crate::{config::FormatConfig, engine::DuckDbEngine};

pub const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// The result of writing one format.
#[derive(Debug, Clone)]
pub struct Written {
  /// `FROM`-clause expression reading the written data.
  pub scan: String,
  /// `None` for formats that are not written to disk.
  pub write: Option<WriteMetadata>,
}

pub trait Backend {
  /// Unique name in the report, e.g. `parquet_zstd`.
  fn name(&self) -> String;

  /// Baselines are measured but never recommended.
  fn is_baseline(&self) -> bool {
    false
  }

  /// Write `table` below `out_dir`.
  fn write(&self, engine: &DuckDbEngine, table: &str, out_dir: &Path) -> Result<Written>;
}

/// Backends enabled by the configuration, baseline first.
pub fn backends(config: &FormatConfig) -> Vec<Box<dyn Backend>> {
  let mut backends: Vec<Box<dyn Backend>> = Vec::new();
  if config.baseline {
    backends.push(Box::new(TableBackend));
  }
  for codec in &config.parquet_codecs {
    backends.push(Box::new(ParquetBackend {
      codec: codec.clone(),
      row_group_size: config.parquet_row_group_size,
      compression_level: config.parquet_compression_level,
    }));
  }
  if config.vortex {
    backends.push(Box::new(VortexBackend));
  }
  backends
}

/// Run a `COPY` statement and return its wall time in seconds.
pub(crate) fn timed_copy(engine: &DuckDbEngine, sql: &str) -> Result<f64> {
  let start = Instant::now();
  engine.execute_batch(sql)?;
  Ok(start.elapsed().as_secs_f64())
}

pub(crate) fn prepare_dir(dir: &Path) -> Result<()> {
  fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))
}

pub(crate) fn file_size(path: &Path) -> Result<u64> {
  Ok(
    fs::metadata(path)
      .with_context(|| format!("missing output {}", path.display()))?
      .len(),
  )
}
