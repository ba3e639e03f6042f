use std::path::Path;

use anyhow::Result;

use super::{Backend, Written};
use crate::engine::DuckDbEngine;

/// The ingested DuckDB table itself, as a reference point.
#[derive(Debug, Clone, Copy, Default)]
pub struct TableBackend;

impl Backend for TableBackend {
  fn name(&self) -> String {
    "duckdb_table".to_string()
  }

  fn is_baseline(&self) -> bool {
    true
  }

  fn write(&self, _engine: &DuckDbEngine, table: &str, _out_dir: &Path) -> Result<Written> {
    Ok(Written {
      scan: table.to_string(),
      write: None,
    })
  }
}
