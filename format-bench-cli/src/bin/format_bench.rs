//! Benchmark storage formats on a dataset, summarize many runs, or sweep row counts.

use std::{
  collections::BTreeMap,
  path::{Path, PathBuf},
  process::Command,
};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use format_bench_core::recommend::aggregate;
use format_bench_eval::{
  config::NamedQuery,
  ingest::InputType,
  output::{load_reports, write_json, write_report, write_summary},
  run,
  scaling::{self, build_summary, load_existing_runs, load_run, parse_row_counts, run_dir},
  BenchConfig, RunOptions,
};
use tracing::{info, Level};

#[derive(Parser, Debug)]
#[command(name = "format-bench", version, about = "Columnar storage format benchmark")]
struct Cli {
  /// Log level used when RUST_LOG is not set
  #[arg(long, global = true, default_value = "info")]
  log_level: Level,
  /// Emit logs as JSON lines
  #[arg(long, global = true)]
  log_json: bool,
  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
  /// Benchmark every configured format on one dataset
  Run {
    /// CSV or Parquet file, or a directory of them
    #[arg(long)]
    input: PathBuf,
    /// Input type; inferred from the extension when omitted
    #[arg(long)]
    input_type: Option<InputType>,
    /// Dataset label used in output file names; defaults to the input file stem
    #[arg(long)]
    label: Option<String>,
    /// Output directory
    #[arg(long, short)]
    out: PathBuf,
    #[command(flatten)]
    overrides: Overrides,
  },
  /// Aggregate every report_*.json in a directory
  Summarize {
    /// Directory holding the reports
    #[arg(long)]
    reports: PathBuf,
    /// Output directory; defaults to the reports directory
    #[arg(long, short)]
    out: Option<PathBuf>,
  },
  /// Benchmark one CSV input at several row limits
  Scale {
    #[arg(long)]
    input: PathBuf,
    #[arg(long)]
    out_root: PathBuf,
    /// Comma separated row counts
    #[arg(long, default_value = "1000000,2000000,4000000,6000000,8000000,10000000")]
    row_counts: String,
    #[arg(long)]
    label: Option<String>,
    /// Keep the duckdb_table baseline in the series
    #[arg(long)]
    include_baseline: bool,
    /// Rebuild the summary from existing rows_* directories without benchmarking
    #[arg(long)]
    rebuild_summary_only: bool,
    #[command(flatten)]
    overrides: Overrides,
  },
}

/// Settings shared by `run` and `scale`. Flags override the config file.
#[derive(Args, Debug, Default)]
struct Overrides {
  /// JSON configuration file
  #[arg(long)]
  config: Option<PathBuf>,
  #[arg(long)]
  row_limit: Option<u64>,
  #[arg(long)]
  threads: Option<usize>,
  #[arg(long)]
  repeats: Option<usize>,
  #[arg(long)]
  warmup: Option<usize>,
  /// Time one execution before warm-up
  #[arg(long)]
  include_cold: bool,
  #[arg(long, value_delimiter = ',')]
  selectivities: Option<Vec<f64>>,
  #[arg(long, value_delimiter = ',')]
  like_selectivities: Option<Vec<f64>>,
  #[arg(long)]
  no_like_tests: bool,
  #[arg(long, value_delimiter = ',')]
  parquet_codecs: Option<Vec<String>>,
  #[arg(long)]
  parquet_row_group_size: Option<usize>,
  #[arg(long)]
  no_vortex: bool,
  #[arg(long)]
  no_baseline: bool,
  #[arg(long)]
  no_validate: bool,
  /// Fail instead of falling back when no filter column qualifies
  #[arg(long)]
  strict: bool,
  #[arg(long)]
  target_ndv: Option<u64>,
  #[arg(long)]
  csv_delimiter: Option<String>,
  #[arg(long)]
  csv_header: Option<bool>,
  #[arg(long)]
  csv_nullstr: Option<String>,
  #[arg(long)]
  csv_sample_size: Option<i64>,
  #[arg(long)]
  csv_ignore_errors: bool,
  #[arg(long)]
  csv_all_varchar: bool,
  /// Extra query as NAME=SQL; `{scan}` is replaced by each format's relation
  #[arg(long = "query", value_parser = parse_query)]
  queries: Vec<NamedQuery>,
}

fn parse_query(raw: &str) -> Result<NamedQuery, String> {
  match raw.split_once('=') {
    Some((name, sql)) if !name.trim().is_empty() && sql.contains("{scan}") => Ok(NamedQuery {
      name: name.trim().to_string(),
      sql: sql.to_string(),
    }),
    _ => Err(format!("expected NAME=SQL with a {{scan}} placeholder, got {raw:?}")),
  }
}

impl Overrides {
  fn resolve(&self) -> Result<BenchConfig> {
    let mut config = match &self.config {
      Some(path) => BenchConfig::from_file(path)?,
      None => BenchConfig::default(),
    };

    if self.row_limit.is_some() {
      config.row_limit = self.row_limit;
    }
    if self.threads.is_some() {
      config.threads = self.threads;
    }
    if let Some(repeats) = self.repeats {
      config.measurement.repeats = repeats;
    }
    if let Some(warmup) = self.warmup {
      config.measurement.warmup = warmup;
    }
    config.measurement.include_cold |= self.include_cold;
    if let Some(selectivities) = &self.selectivities {
      config.calibration.selectivities = selectivities.clone();
    }
    if let Some(selectivities) = &self.like_selectivities {
      config.calibration.like_selectivities = selectivities.clone();
    }
    config.calibration.like_tests &= !self.no_like_tests;
    if let Some(codecs) = &self.parquet_codecs {
      config.formats.parquet_codecs = codecs.clone();
    }
    if let Some(size) = self.parquet_row_group_size {
      config.formats.parquet_row_group_size = size;
    }
    config.formats.vortex &= !self.no_vortex;
    config.formats.baseline &= !self.no_baseline;
    config.validate &= !self.no_validate;
    config.selector.strict |= self.strict;
    if let Some(target) = self.target_ndv {
      config.selector.target_ndv = target;
    }

    let csv = &mut config.csv;
    if self.csv_delimiter.is_some() {
      csv.delimiter = self.csv_delimiter.clone();
    }
    if self.csv_header.is_some() {
      csv.header = self.csv_header;
    }
    if self.csv_nullstr.is_some() {
      csv.nullstr = self.csv_nullstr.clone();
    }
    if self.csv_sample_size.is_some() {
      csv.sample_size = self.csv_sample_size;
    }
    csv.ignore_errors |= self.csv_ignore_errors;
    csv.all_varchar |= self.csv_all_varchar;

    config.queries.extend(self.queries.iter().cloned());
    Ok(config)
  }
}

fn run_one(options: RunOptions, config: &BenchConfig) -> Result<()> {
  let report = run(&options, config)?;
  let files = write_report(&report, &options.out_dir)?;
  info!(
    json = %files.json.display(),
    markdown = %files.markdown.display(),
    csv = %files.csv.display(),
    "report written"
  );
  Ok(())
}

fn summarize(reports: &Path, out: &Path) -> Result<()> {
  let loaded = load_reports(reports)?;
  if loaded.is_empty() {
    bail!("no report_*.json found in {}", reports.display());
  }
  let summary = aggregate(&loaded);
  let (json, md) = write_summary(&summary, out)?;
  info!(datasets = summary.dataset_count, json = %json.display(), markdown = %md.display(), "summary written");
  Ok(())
}

/// Benchmark each row count in a child process so runs do not share engine state.
fn scale(
  input: &Path,
  out_root: &Path,
  row_counts: &[u64],
  label: Option<&str>,
  config: &BenchConfig,
) -> Result<BTreeMap<u64, scaling::ScalingRun>> {
  std::fs::create_dir_all(out_root)?;
  let config_path = out_root.join("bench_config.json");
  write_json(&config_path, config)?;
  let exe = std::env::current_exe().context("cannot locate the format-bench binary")?;

  let mut runs = BTreeMap::new();
  for &rows in row_counts {
    let dir = run_dir(out_root, rows);
    info!(rows, dir = %dir.display(), "scaling run");
    let mut cmd = Command::new(&exe);
    cmd
      .arg("run")
      .arg("--input")
      .arg(input)
      .arg("--input-type")
      .arg("csv")
      .arg("--out")
      .arg(&dir)
      .arg("--config")
      .arg(&config_path)
      .arg("--row-limit")
      .arg(rows.to_string());
    if let Some(label) = label {
      cmd.arg("--label").arg(label);
    }
    let status = cmd.status().context("failed to spawn benchmark run")?;
    if !status.success() {
      bail!("benchmark run for {rows} rows failed with {status}");
    }
    runs.insert(rows, load_run(out_root, rows)?);
  }
  Ok(runs)
}

fn main() -> Result<()> {
  let cli = Cli::parse();
  format_bench_eval::logging::init_logging(cli.log_level, cli.log_json)?;

  match cli.command {
    Commands::Run {
      input,
      input_type,
      label,
      out,
      overrides,
    } => {
      let config = overrides.resolve()?;
      run_one(
        RunOptions {
          input,
          input_type,
          label,
          out_dir: out,
        },
        &config,
      )
    }
    Commands::Summarize { reports, out } => {
      let out = out.unwrap_or_else(|| reports.clone());
      summarize(&reports, &out)
    }
    Commands::Scale {
      input,
      out_root,
      row_counts,
      label,
      include_baseline,
      rebuild_summary_only,
      overrides,
    } => {
      let runs = if rebuild_summary_only {
        load_existing_runs(&out_root)?
      } else {
        if !input.exists() {
          bail!("input {} does not exist", input.display());
        }
        let config = overrides.resolve()?;
        let counts = parse_row_counts(&row_counts)?;
        if counts.is_empty() {
          bail!("no row counts given");
        }
        scale(&input, &out_root, &counts, label.as_deref(), &config)?
      };
      let summary = build_summary(&runs, include_baseline);
      let path = out_root.join(scaling::SUMMARY_FILE);
      write_json(&path, &summary)?;
      info!(path = %path.display(), row_counts = summary.row_counts.len(), "row scaling summary written");
      Ok(())
    }
  }
}

#[cfg(test)]
mod tests {
  use clap::CommandFactory;

  use super::*;

  #[test]
  fn test_cli_definition() {
    Cli::command().debug_assert();
  }

  #[test]
  fn test_overrides_apply_on_defaults() {
    let cli = Cli::parse_from([
      "format-bench",
      "run",
      "--input",
      "data.csv",
      "--out",
      "out",
      "--repeats",
      "3",
      "--selectivities",
      "0.1,0.2",
      "--no-vortex",
      "--strict",
      "--csv-delimiter",
      "|",
      "--query",
      "all={scan}",
    ]);
    let Commands::Run { overrides, .. } = cli.command else {
      panic!("expected run");
    };
    assert_eq!("all", overrides.queries[0].name);
    let config = overrides.resolve().unwrap();
    assert_eq!(3, config.measurement.repeats);
    assert_eq!(vec![0.1, 0.2], config.calibration.selectivities);
    assert!(!config.formats.vortex);
    assert!(config.formats.baseline);
    assert!(config.selector.strict);
    assert_eq!(Some("|".to_string()), config.csv.delimiter);
  }

  #[test]
  fn test_parse_query() {
    assert_eq!("q", parse_query("q=SELECT COUNT(*) FROM {scan}").unwrap().name);
    assert!(parse_query("SELECT 1").is_err());
    assert!(parse_query("q=SELECT 1").is_err());
  }
}
