//! End-to-end benchmark of one dataset: profile and calibrate on the base table once,
//! then write and measure every format against the same literals.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use format_bench_core::{
  calibrate::{threshold_specs, SelectivitySpec},
  engine::{fetch_value, row_count},
  measure::{timed, FetchMode, Measurement},
  pattern::like_pattern_specs,
  profile::{profile, ColumnProfile},
  recommend::recommend,
  report::{
    Calibration, DatasetInfo, FormatEntry, FormatResult, Report, SelectivityPoint, SystemInfo, Validation,
    WriteMetadata, FULL_SCAN, POINT_LOOKUP, RANDOM_ACCESS, SELECTIVE_PREDICATE,
  },
  select::{auto_select, AutoSelection},
  sql::{eq_predicate, le_predicate, like_predicate, quote_ident},
  value::Scalar,
};
use tracing::{info, warn};

use crate::{
  backend::{backends, Backend, BYTES_PER_MB},
  config::BenchConfig,
  engine::DuckDbEngine,
  ingest::{ingest, input_size_bytes, InputType, IngestOptions},
};

/// Where a dataset comes from and where its artifacts go.
#[derive(Debug, Clone)]
pub struct RunOptions {
  pub input: PathBuf,
  pub input_type: Option<InputType>,
  /// Defaults to the input's file stem.
  pub label: Option<String>,
  pub out_dir: PathBuf,
}

impl RunOptions {
  pub fn label(&self) -> String {
    self.label.clone().unwrap_or_else(|| {
      let stem = self
        .input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
      // `trips.csv.bz2` -> `trips`
      stem.split('.').next().unwrap_or_default().to_string()
    })
  }
}

/// Ingest the input and benchmark every configured format.
pub fn run(options: &RunOptions, config: &BenchConfig) -> Result<Report> {
  let engine = DuckDbEngine::open_in_memory()?;
  if let Some(threads) = config.threads {
    engine.set_threads(threads)?;
  }

  let input_type = options
    .input_type
    .unwrap_or_else(|| InputType::infer(&options.input));
  let ingested = ingest(
    &engine,
    &IngestOptions {
      input: options.input.clone(),
      input_type,
      table: config.table.clone(),
      csv: config.csv.clone(),
      row_limit: config.row_limit,
    },
  )?;

  // Under a row limit only the ingested share of the input counts.
  let input_size = match input_size_bytes(&options.input) {
    Ok(size) => ingested.scale_bytes(size),
    Err(err) => {
      warn!(error = %err, "input size unavailable, compression ratios disabled");
      None
    }
  };

  let source = DatasetSource {
    label: options.label(),
    input: options.input.display().to_string(),
    input_type: input_type.as_str().to_string(),
    input_size_bytes: input_size,
    input_rows: Some(ingested.input_rows),
  };
  benchmark(&engine, &source, config, &backends(&config.formats), &options.out_dir)
}

/// Descriptive facts about the dataset that the engine cannot provide.
#[derive(Debug, Clone)]
pub struct DatasetSource {
  pub label: String,
  pub input: String,
  pub input_type: String,
  pub input_size_bytes: Option<u64>,
  /// Rows in the input, when known; used to report rows dropped by a row limit.
  pub input_rows: Option<u64>,
}

/// The running machine and the DuckDB version.
pub fn system_info(engine: &DuckDbEngine) -> SystemInfo {
  let engine_version = match fetch_value(engine, "SELECT version()") {
    Ok(Scalar::Text(version)) => Some(version),
    Ok(_) => None,
    Err(err) => {
      warn!(error = %err, "engine version unavailable");
      None
    }
  };
  SystemInfo {
    os: std::env::consts::OS.to_string(),
    arch: std::env::consts::ARCH.to_string(),
    cpus: std::thread::available_parallelism().map(usize::from).ok(),
    engine_version,
    tool_version: env!("CARGO_PKG_VERSION").to_string(),
  }
}

/// Benchmark the already ingested `config.table`.
///
/// Profiling, selection and calibration errors abort the run. A failing backend only
/// turns its own entry into [`FormatEntry::Failed`].
pub fn benchmark(
  engine: &DuckDbEngine,
  source: &DatasetSource,
  config: &BenchConfig,
  backends: &[Box<dyn Backend>],
  out_dir: &Path,
) -> Result<Report> {
  let table = config.table.as_str();
  let rowcount = row_count(engine, table)?;
  let profiles = profile(engine, table, rowcount)?;
  info!(rows = rowcount, columns = profiles.len(), "profiled base table");

  let selection = auto_select(engine, table, &profiles, rowcount, &config.selector)?;
  let calibration = calibrate(engine, table, &profiles, &selection, rowcount, config)?;

  let ctx = MeasureContext {
    engine,
    config,
    selection: &selection,
    calibration: &calibration,
    out_dir,
    input_size_bytes: source.input_size_bytes,
    expected: Expected {
      rows: rowcount,
      min: fetch_value(engine, &full_scan_sql(table, &selection.min_column))?,
    },
  };

  let mut report = Report {
    system: system_info(engine),
    dataset: DatasetInfo::new(
      &source.label,
      &source.input,
      &source.input_type,
      rowcount,
      source.input_size_bytes,
      &profiles,
    )
    .with_input_rows(source.input_rows),
    columns: selection.clone(),
    profiles: profiles.clone(),
    calibration: calibration.clone(),
    formats: Default::default(),
    recommendations: Default::default(),
  };

  for backend in backends {
    let name = backend.name();
    info!(format = %name, "benchmarking format");
    let entry = match ctx.measure_format(backend.as_ref()) {
      Ok(result) => FormatEntry::Ok(result),
      Err(err) => {
        let error = format!("{err:#}");
        warn!(format = %name, %error, "format failed");
        FormatEntry::Failed { error }
      }
    };
    report.formats.insert(name, entry);
  }

  report.recommendations = recommend(&report);
  for (objective, rec) in &report.recommendations {
    info!(objective = objective.as_str(), format = %rec.format, reason = %rec.reason, "recommendation");
  }
  Ok(report)
}

fn find<'a>(profiles: &'a [ColumnProfile], name: &str) -> Option<&'a ColumnProfile> {
  profiles.iter().find(|p| p.name == name)
}

/// Thresholds and patterns computed on the base table, reused by every format.
fn calibrate(
  engine: &DuckDbEngine,
  table: &str,
  profiles: &[ColumnProfile],
  selection: &AutoSelection,
  rowcount: u64,
  config: &BenchConfig,
) -> Result<Calibration> {
  let cal = &config.calibration;
  let mut calibration = Calibration::default();

  if let Some(primary) = selection.primary_range_column.as_deref().and_then(|c| find(profiles, c)) {
    calibration.selective = threshold_specs(engine, table, primary, &[cal.selective_fraction], rowcount)?
      .into_iter()
      .next();
  }

  // Primary range column first, then the rest in schema order.
  let mut sweep: Vec<&str> = selection.primary_range_column.iter().map(String::as_str).collect();
  for column in &selection.range_columns {
    if !sweep.contains(&column.as_str()) {
      sweep.push(column);
    }
  }
  for column in sweep.into_iter().take(cal.max_select_cols) {
    let Some(profile) = find(profiles, column) else {
      continue;
    };
    let specs = threshold_specs(engine, table, profile, &cal.selectivities, rowcount)?;
    calibration.range.insert(column.to_string(), specs);
  }

  if cal.like_tests {
    for column in selection.like_columns.iter().take(cal.max_like_cols) {
      let specs = like_pattern_specs(
        engine,
        table,
        column,
        &cal.like_selectivities,
        rowcount,
        cal.like_max_candidates,
        cal.like_pattern_len,
      )?;
      if !specs.is_empty() {
        calibration.like.insert(column.clone(), specs);
      }
    }
  }

  info!(
    range_columns = calibration.range.len(),
    like_columns = calibration.like.len(),
    "calibrated predicates"
  );
  Ok(calibration)
}

fn full_scan_sql(relation: &str, min_column: &str) -> String {
  format!("SELECT MIN({}) FROM {relation}", quote_ident(min_column))
}

struct Expected {
  rows: u64,
  min: Scalar,
}

struct MeasureContext<'a> {
  engine: &'a DuckDbEngine,
  config: &'a BenchConfig,
  selection: &'a AutoSelection,
  calibration: &'a Calibration,
  out_dir: &'a Path,
  input_size_bytes: Option<u64>,
  expected: Expected,
}

impl MeasureContext<'_> {
  fn measure(&self, format: &str, query: &str, sql: &str, fetch: FetchMode) -> Result<Measurement> {
    let options = self.config.measurement.with_fetch(fetch);
    let measurement = timed(self.engine, sql, &options).with_context(|| format!("{query} failed on {format}"))?;
    info!(format, query, median_ms = measurement.median_ms, p95_ms = measurement.p95_ms, "measured");
    Ok(measurement)
  }

  fn measure_format(&self, backend: &dyn Backend) -> Result<FormatResult> {
    let name = backend.name();
    let written = backend.write(self.engine, &self.config.table, self.out_dir)?;

    let view = quote_ident(&format!("bench_{name}"));
    self
      .engine
      .execute_batch(&format!("CREATE OR REPLACE TEMP VIEW {view} AS SELECT * FROM {}", written.scan))?;

    // The view goes away whether or not the battery completes.
    let measured = self.measure_written(&name, backend.is_baseline(), written.write, &view);
    let dropped = self.engine.execute_batch(&format!("DROP VIEW IF EXISTS {view}"));
    let result = measured?;
    dropped?;
    Ok(result)
  }

  fn measure_written(
    &self,
    name: &str,
    baseline: bool,
    write: Option<WriteMetadata>,
    view: &str,
  ) -> Result<FormatResult> {
    let mut result = FormatResult::new(name, baseline);
    if let Some(mut write) = write {
      if let Some(input) = self.input_size_bytes.filter(|&size| size > 0) {
        let input_mb = input as f64 / BYTES_PER_MB;
        if write.output_size_bytes > 0 {
          result.compression_ratio = Some(input as f64 / write.output_size_bytes as f64);
        }
        if write.compression_time_s > 0.0 {
          write.compression_speed_mb_s = Some(input_mb / write.compression_time_s);
        }
        write.decompression_speed_mb_s = write
          .decompression_time_s
          .filter(|&t| t > 0.0)
          .map(|t| input_mb / t);
      }
      info!(
        format = %name,
        output_size_bytes = write.output_size_bytes,
        compression_time_s = write.compression_time_s,
        "written"
      );
      result.write = Some(write);
    }

    if self.config.validate {
      let validation = self.validate(view)?;
      if !validation.passed() {
        warn!(format = %name, ?validation, "validation failed");
      }
      result.validation = Some(validation);
    }

    self.measure_battery(name, view, &mut result)?;
    result.finalize();
    Ok(result)
  }

  fn validate(&self, relation: &str) -> Result<Validation> {
    let actual_rows = row_count(self.engine, relation)?;
    let min = fetch_value(self.engine, &full_scan_sql(relation, &self.selection.min_column))?;
    Ok(Validation {
      expected_rows: self.expected.rows,
      actual_rows,
      count_match: actual_rows == self.expected.rows,
      min_match: min == self.expected.min,
    })
  }

  fn measure_battery(&self, format: &str, relation: &str, result: &mut FormatResult) -> Result<()> {
    let selection = self.selection;
    let min = quote_ident(&selection.min_column);
    let aggregate_where = |predicate: &str| format!("SELECT MIN({min}) FROM {relation} WHERE {predicate}");

    let sql = full_scan_sql(relation, &selection.min_column);
    let m = self.measure(format, FULL_SCAN, &sql, FetchMode::FirstRow)?;
    result.queries.insert(FULL_SCAN.to_string(), m);

    let sql = aggregate_where(&eq_predicate(&selection.filter_column, &selection.filter_value.value));
    let m = self.measure(format, RANDOM_ACCESS, &sql, FetchMode::FirstRow)?;
    result.queries.insert(RANDOM_ACCESS.to_string(), m);

    if let (Some(column), Some(value)) = (&selection.point_lookup_column, &selection.point_lookup_value) {
      let sql = format!("SELECT * FROM {relation} WHERE {}", eq_predicate(column, value));
      let m = self.measure(format, POINT_LOOKUP, &sql, FetchMode::FirstRow)?;
      result.queries.insert(POINT_LOOKUP.to_string(), m);
    }

    if let Some(spec) = self.calibration.selective.as_ref().filter(|s| !s.literal.is_null()) {
      let sql = aggregate_where(&le_predicate(&spec.column, &spec.literal));
      let m = self.measure(format, SELECTIVE_PREDICATE, &sql, FetchMode::FirstRow)?;
      result.queries.insert(SELECTIVE_PREDICATE.to_string(), m);
    }

    for (column, specs) in &self.calibration.range {
      let points = self.sweep(format, specs, |spec| {
        (!spec.literal.is_null()).then(|| aggregate_where(&le_predicate(column, &spec.literal)))
      })?;
      result.selectivity_by_col.insert(column.clone(), points);
    }

    for (column, specs) in &self.calibration.like {
      let points = self.sweep(format, specs, |spec| {
        spec
          .pattern()
          .map(|pattern| format!("SELECT COUNT(*) FROM {relation} WHERE {}", like_predicate(column, pattern)))
      })?;
      result.like_by_col.insert(column.clone(), points);
    }

    for query in &self.config.queries {
      let sql = query.sql.replace("{scan}", relation);
      let m = self.measure(format, &query.name, &sql, FetchMode::AllRows)?;
      result.queries.insert(query.name.clone(), m);
    }
    Ok(())
  }

  fn sweep<F>(&self, format: &str, specs: &[SelectivitySpec], sql_for: F) -> Result<Vec<SelectivityPoint>>
  where
    F: Fn(&SelectivitySpec) -> Option<String>,
  {
    let mut points = Vec::with_capacity(specs.len());
    for spec in specs {
      let Some(sql) = sql_for(spec) else {
        continue;
      };
      let measurement = self.measure(format, &spec.column, &sql, FetchMode::FirstRow)?;
      points.push(SelectivityPoint {
        spec: spec.clone(),
        measurement,
      });
    }
    Ok(points)
  }
}
