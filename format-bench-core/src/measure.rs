//! Repeated, warm-up-isolated latency measurement of a single SQL statement.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::{engine::QueryEngine, stats::LatencySummary, value::Scalar, Error, Result};

/// How much of a result is retrieved inside the timed interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchMode {
  /// Stop the clock once the first row is available.
  #[default]
  FirstRow,
  /// Materialize every row. Used for ad hoc user queries.
  AllRows,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasureOptions {
  pub repeats: usize,
  pub warmup: usize,
  pub include_cold: bool,
  pub fetch: FetchMode,
}

impl Default for MeasureOptions {
  fn default() -> Self {
    MeasureOptions {
      repeats: 7,
      warmup: 1,
      include_cold: false,
      fetch: FetchMode::FirstRow,
    }
  }
}

impl MeasureOptions {
  pub fn with_fetch(&self, fetch: FetchMode) -> MeasureOptions {
    MeasureOptions {
      fetch,
      ..self.clone()
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
  pub median_ms: f64,
  pub p95_ms: f64,
  /// Latency of the first execution, taken before any warm-up.
  #[serde(skip_serializing_if = "Option::is_none", default)]
  pub cold_ms: Option<f64>,
  pub runs: usize,
  /// First column of the first row of the last timed execution.
  pub result_value: Scalar,
}

fn execute_once<E: QueryEngine + ?Sized>(
  engine: &E,
  sql: &str,
  fetch: FetchMode,
) -> Result<(f64, Scalar)> {
  let start = Instant::now();
  let first_row = match fetch {
    FetchMode::FirstRow => engine.fetch_one(sql)?,
    FetchMode::AllRows => engine.fetch_all(sql)?.into_iter().next(),
  };
  let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
  let value = first_row
    .and_then(|row| row.into_iter().next())
    .unwrap_or_default();
  Ok((elapsed_ms, value))
}

/// Measure `sql`: one optional cold execution, `warmup` discarded executions, then
/// `repeats` timed executions reduced to median and p95.
///
/// Engine errors are returned as-is; there is no retry.
pub fn timed<E: QueryEngine + ?Sized>(
  engine: &E,
  sql: &str,
  options: &MeasureOptions,
) -> Result<Measurement> {
  if options.repeats == 0 {
    return Err(Error::InvalidArgument("repeats must be at least 1".to_string()));
  }

  let mut result_value = Scalar::Null;
  let cold_ms = if options.include_cold {
    let (elapsed_ms, value) = execute_once(engine, sql, options.fetch)?;
    result_value = value;
    Some(elapsed_ms)
  } else {
    None
  };

  for _ in 0..options.warmup {
    execute_once(engine, sql, options.fetch)?;
  }

  let mut samples = Vec::with_capacity(options.repeats);
  for _ in 0..options.repeats {
    let (elapsed_ms, value) = execute_once(engine, sql, options.fetch)?;
    samples.push(elapsed_ms);
    result_value = value;
  }

  let summary = LatencySummary::from_samples(&samples)
    .ok_or_else(|| Error::InvalidArgument("no latency samples".to_string()))?;
  trace!(sql, median_ms = summary.median_ms, "measured query");

  Ok(Measurement {
    median_ms: summary.median_ms,
    p95_ms: summary.p95_ms,
    cold_ms,
    runs: options.repeats,
    result_value,
  })
}
