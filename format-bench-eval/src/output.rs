//! JSON and Markdown artifacts for reports and cross-dataset summaries.

use std::{
  fmt::Write as _,
  fs,
  path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use format_bench_core::{
  measure::Measurement,
  recommend::{Objective, Recommendations, Summary},
  report::{FormatEntry, FormatResult, Report, SelectivityPoint, FULL_SCAN, RANDOM_ACCESS, SELECTIVE_PREDICATE},
};
use serde::{de::DeserializeOwned, Serialize};

use crate::backend::BYTES_PER_MB;

pub const SUMMARY_JSON: &str = "overall_summary.json";
pub const SUMMARY_MD: &str = "overall_summary.md";

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
  let text = serde_json::to_string_pretty(value)?;
  fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
  let text = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
  serde_json::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
}

fn write_text(path: &Path, text: &str) -> Result<()> {
  fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))
}

/// Paths of the artifacts written for one report.
#[derive(Debug, Clone)]
pub struct ReportFiles {
  pub json: PathBuf,
  pub markdown: PathBuf,
  pub csv: PathBuf,
}

/// Write `report_<label>.json`, `report_<label>.md` and `results_<label>.csv`.
pub fn write_report(report: &Report, out_dir: &Path) -> Result<ReportFiles> {
  fs::create_dir_all(out_dir)?;
  let label = &report.dataset.label;
  let files = ReportFiles {
    json: out_dir.join(format!("report_{label}.json")),
    markdown: out_dir.join(format!("report_{label}.md")),
    csv: out_dir.join(format!("results_{label}.csv")),
  };
  write_json(&files.json, report)?;
  write_text(&files.markdown, &report_markdown(report))?;
  write_results_csv(report, &files.csv)?;
  Ok(files)
}

/// One measured query of one format, flattened for spreadsheets.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultRow {
  pub format: String,
  pub status: &'static str,
  pub query_name: String,
  pub column: Option<String>,
  pub selectivity: Option<f64>,
  pub achieved_selectivity: Option<f64>,
  pub pattern: Option<String>,
  pub rows: u64,
  pub compression_time_s: Option<f64>,
  pub compressed_size_bytes: Option<u64>,
  pub compression_ratio: Option<f64>,
  pub time_ms_median: Option<f64>,
  pub time_ms_p95: Option<f64>,
  pub time_ms_cold: Option<f64>,
  pub runs: Option<usize>,
  pub result_value: Option<String>,
  pub error: Option<String>,
}

fn result_row(format: &str, rows: u64, body: &FormatResult, query: &str, m: &Measurement) -> ResultRow {
  let write = body.write.as_ref();
  ResultRow {
    format: format.to_string(),
    status: "ok",
    query_name: query.to_string(),
    rows,
    compression_time_s: write.map(|w| w.compression_time_s),
    compressed_size_bytes: write.map(|w| w.output_size_bytes),
    compression_ratio: body.compression_ratio,
    time_ms_median: Some(m.median_ms),
    time_ms_p95: Some(m.p95_ms),
    time_ms_cold: m.cold_ms,
    runs: Some(m.runs),
    result_value: Some(m.result_value.to_string()),
    ..Default::default()
  }
}

fn sweep_rows(
  out: &mut Vec<ResultRow>,
  format: &str,
  rows: u64,
  body: &FormatResult,
  column: &str,
  points: &[SelectivityPoint],
) {
  for point in points {
    let spec = &point.spec;
    let query = match spec.kind {
      Some(kind) => format!("like_{kind}"),
      None => "selectivity".to_string(),
    };
    for &target in &spec.targets {
      out.push(ResultRow {
        column: Some(column.to_string()),
        selectivity: Some(target),
        achieved_selectivity: spec.achieved,
        pattern: spec.pattern().map(str::to_string),
        ..result_row(format, rows, body, &query, &point.measurement)
      });
    }
  }
}

/// Every measurement of the report as a flat row, plus one row per failed format.
pub fn result_rows(report: &Report) -> Vec<ResultRow> {
  let rows = report.dataset.rows;
  let mut out = Vec::new();
  for (format, entry) in &report.formats {
    let body = match entry {
      FormatEntry::Ok(body) => body,
      FormatEntry::Failed { error } => {
        out.push(ResultRow {
          format: format.clone(),
          status: "failed",
          rows,
          error: Some(error.clone()),
          ..Default::default()
        });
        continue;
      }
    };
    for (query, m) in &body.queries {
      out.push(result_row(format, rows, body, query, m));
    }
    for (column, points) in &body.selectivity_by_col {
      sweep_rows(&mut out, format, rows, body, column, points);
    }
    for (column, points) in &body.like_by_col {
      sweep_rows(&mut out, format, rows, body, column, points);
    }
  }
  out
}

pub fn write_results_csv(report: &Report, path: &Path) -> Result<()> {
  let mut writer = csv::Writer::from_path(path).with_context(|| format!("failed to create {}", path.display()))?;
  for row in result_rows(report) {
    writer.serialize(row)?;
  }
  writer.flush()?;
  Ok(())
}

/// `report_*.json` files directly inside `dir`, sorted by name.
pub fn report_files(dir: &Path) -> Result<Vec<PathBuf>> {
  let mut files = Vec::new();
  for entry in fs::read_dir(dir).with_context(|| format!("failed to list {}", dir.display()))? {
    let path = entry?.path();
    let is_report = path
      .file_name()
      .and_then(|name| name.to_str())
      .is_some_and(|name| name.starts_with("report_") && name.ends_with(".json"));
    if is_report {
      files.push(path);
    }
  }
  files.sort();
  Ok(files)
}

pub fn load_reports(dir: &Path) -> Result<Vec<Report>> {
  report_files(dir)?.iter().map(|path| read_json(path)).collect()
}

pub fn write_summary(summary: &Summary, out_dir: &Path) -> Result<(PathBuf, PathBuf)> {
  fs::create_dir_all(out_dir)?;
  let json_path = out_dir.join(SUMMARY_JSON);
  let md_path = out_dir.join(SUMMARY_MD);
  write_json(&json_path, summary)?;
  write_text(&md_path, &summary_markdown(summary))?;
  Ok((json_path, md_path))
}

fn float(value: Option<f64>) -> String {
  value.map_or_else(|| "-".to_string(), |v| format!("{v:.3}"))
}

fn recommendation_lines(out: &mut String, recommendations: &Recommendations) {
  if recommendations.is_empty() {
    return;
  }
  out.push_str("- recommendations:\n");
  for objective in Objective::ALL {
    if let Some(rec) = recommendations.get(&objective) {
      let _ = writeln!(out, "  - {}: `{}` ({})", objective.as_str(), rec.format, rec.reason);
    }
  }
}

pub fn report_markdown(report: &Report) -> String {
  let mut out = String::new();
  let ds = &report.dataset;
  let cols = &report.columns;
  let _ = writeln!(out, "# Benchmark Report: {}\n", ds.label);
  let _ = writeln!(out, "- Input: `{}` ({})", ds.input, ds.input_type);
  let _ = writeln!(out, "- Rows: **{}**", ds.rows);
  if let (Some(input_rows), Some(dropped)) = (ds.input_rows, ds.dropped_rows) {
    let _ = writeln!(out, "- Input rows: **{input_rows}** (dropped {dropped})");
  }
  if let Some(size) = ds.input_size_bytes {
    let _ = writeln!(out, "- Input size: **{:.2} MB**", size as f64 / BYTES_PER_MB);
  }
  let _ = writeln!(out, "- min_col: `{}`", cols.min_column);
  let _ = writeln!(out, "- filter_col: `{}` = `{}`", cols.filter_column, cols.filter_value.value);
  let _ = writeln!(out, "- select_cols: `{}`", cols.range_columns.join(", "));
  if !cols.like_columns.is_empty() {
    let _ = writeln!(out, "- like_cols: `{}`", cols.like_columns.join(", "));
  }
  recommendation_lines(&mut out, &report.recommendations);
  let sys = &report.system;
  let _ = writeln!(
    out,
    "- system: {} {}, {} cpus, engine {}",
    sys.os,
    sys.arch,
    sys.cpus.map_or_else(|| "?".to_string(), |n| n.to_string()),
    sys.engine_version.as_deref().unwrap_or("?")
  );
  out.push('\n');

  for (name, entry) in &report.formats {
    let _ = writeln!(out, "## {name}");
    let body = match entry {
      FormatEntry::Ok(body) => body,
      FormatEntry::Failed { error } => {
        let _ = writeln!(out, "- failed: {error}\n");
        continue;
      }
    };
    if let Some(write) = &body.write {
      let _ = writeln!(out, "- size_bytes: **{}**", write.output_size_bytes);
      let _ = writeln!(out, "- compression_time_s: **{:.3}**", write.compression_time_s);
    }
    if let Some(ratio) = body.compression_ratio {
      let _ = writeln!(out, "- compression_ratio: **{ratio:.3}**");
    }
    for (query, m) in &body.queries {
      let _ = writeln!(out, "- {query} median_ms: **{:.2}** (p95 {:.2})", m.median_ms, m.p95_ms);
    }
    if let (Some(column), Some(avg)) = (&body.best_select_col, body.best_select_col_avg_median_ms) {
      let _ = writeln!(out, "- best_select_col: `{column}` (avg median_ms **{avg:.2}**)");
    }
    if let Some(validation) = &body.validation {
      let _ = writeln!(out, "- validation_pass: **{}**", validation.passed());
    }
    if !body.selectivity_by_col.is_empty() {
      out.push_str("- selectivity:\n");
      for (column, points) in &body.selectivity_by_col {
        let parts: Vec<String> = points
          .iter()
          .flat_map(|p| {
            p.spec
              .targets
              .iter()
              .map(|t| format!("{:.0}%: {:.2}ms", t * 100.0, p.measurement.median_ms))
          })
          .collect();
        let _ = writeln!(out, "  - {column}: {}", parts.join(", "));
      }
    }
    if !body.like_by_col.is_empty() {
      out.push_str("- like:\n");
      for (column, points) in &body.like_by_col {
        let parts: Vec<String> = points
          .iter()
          .map(|p| {
            format!(
              "`{}` ({:.3}): {:.2}ms",
              p.spec.literal,
              p.spec.achieved.unwrap_or_default(),
              p.measurement.median_ms
            )
          })
          .collect();
        let _ = writeln!(out, "  - {column}: {}", parts.join(", "));
      }
    }
    out.push('\n');
  }
  out
}

pub fn summary_markdown(summary: &Summary) -> String {
  let mut out = String::new();
  let _ = writeln!(out, "# Overall Summary\n");
  let _ = writeln!(out, "- datasets: **{}**", summary.dataset_count);
  recommendation_lines(&mut out, &summary.recommendations);

  out.push_str(
    "\n## Datasets\nname | rows | input_rows | dropped_rows | input_size_mb\n--- | --- | --- | --- | ---\n",
  );
  let int = |v: Option<u64>| v.map_or_else(|| "-".to_string(), |v| v.to_string());
  for ds in &summary.datasets {
    let size = ds.input_size_bytes.map(|b| b as f64 / BYTES_PER_MB);
    let _ = writeln!(
      out,
      "{} | {} | {} | {} | {}",
      ds.label,
      ds.rows,
      int(ds.input_rows),
      int(ds.dropped_rows),
      float(size)
    );
  }

  out.push_str(
    "\n## Formats (Geomean)\n\
     format | datasets | comp_ratio | comp_time_s | comp_speed_mb_s | decomp_time_s | decomp_speed_mb_s | \
     size_mb | full_scan_ms | selective_pred_ms | random_access_ms\n\
     --- | --- | --- | --- | --- | --- | --- | --- | --- | --- | ---\n",
  );
  for (name, body) in &summary.formats {
    let query = |q: &str| body.query_median_ms_geomean.get(q).copied().flatten();
    let _ = writeln!(
      out,
      "{name} | {} | {} | {} | {} | {} | {} | {} | {} | {} | {}",
      body.datasets,
      float(body.compression_ratio_geomean),
      float(body.compression_time_s_geomean),
      float(body.compression_speed_mb_s_geomean),
      float(body.decompression_time_s_geomean),
      float(body.decompression_speed_mb_s_geomean),
      float(body.output_size_bytes_geomean.map(|b| b / BYTES_PER_MB)),
      float(query(FULL_SCAN)),
      float(query(SELECTIVE_PREDICATE)),
      float(query(RANDOM_ACCESS)),
    );
  }
  out
}
