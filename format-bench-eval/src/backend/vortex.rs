//! Vortex through the DuckDB `vortex` extension.

use std::{collections::BTreeMap, path::Path};

use anyhow::{Context, Result};
use format_bench_core::{report::WriteMetadata, sql::string_literal};
use serde_json::json;

use super::{file_size, prepare_dir, timed_copy, Backend, Written};
use crate::engine::DuckDbEngine;

#[derive(Debug, Clone, Copy, Default)]
pub struct VortexBackend;

impl Backend for VortexBackend {
  fn name(&self) -> String {
    "vortex_default".to_string()
  }

  fn write(&self, engine: &DuckDbEngine, table: &str, out_dir: &Path) -> Result<Written> {
    engine
      .execute_batch("INSTALL vortex; LOAD vortex;")
      .context("vortex extension is not available")?;

    let dir = out_dir.join(self.name());
    prepare_dir(&dir)?;
    let path = dir.join(format!("{table}.vortex"));
    let path_literal = string_literal(&path.display().to_string());

    let compression_time_s = timed_copy(
      engine,
      &format!("COPY (SELECT * FROM {table}) TO {path_literal} (FORMAT vortex)"),
    )?;
    let output_size_bytes = file_size(&path)?;

    let mut details = BTreeMap::new();
    details.insert("variant".to_string(), json!(self.name()));
    Ok(Written {
      scan: format!("read_vortex({path_literal})"),
      write: Some(WriteMetadata {
        path: path.display().to_string(),
        output_size_bytes,
        compression_time_s,
        compression_speed_mb_s: None,
        decompression_time_s: None,
        decompression_speed_mb_s: None,
        details,
      }),
    })
  }
}
