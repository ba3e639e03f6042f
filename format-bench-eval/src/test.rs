use std::path::Path;

use anyhow::{bail, Result};
use format_bench_core::{
  calibrate::{threshold_specs, thresholds},
  engine::{row_count, QueryEngine},
  error::{Error, Exhaustion},
  pattern::{like_pattern_specs, measure_pattern, PatternKind},
  profile::profile,
  recommend::{aggregate, Objective},
  report::{FormatEntry, FULL_SCAN, POINT_LOOKUP, RANDOM_ACCESS, SELECTIVE_PREDICATE},
  select::{auto_select, pick_filter_column, pick_filter_value, SelectorConfig},
  sql::eq_predicate,
  types::TypeBucket,
  value::Scalar,
};
use rstest::rstest;

use crate::{
  backend::{Backend, ParquetBackend, TableBackend, Written},
  config::{BenchConfig, NamedQuery},
  engine::DuckDbEngine,
  output::{load_reports, write_report, write_summary},
  runner::{benchmark, run, DatasetSource, RunOptions},
  util::create_synthetic_table,
};

fn engine_with(sql: &str) -> DuckDbEngine {
  let engine = DuckDbEngine::open_in_memory().unwrap();
  engine.execute_batch(sql).unwrap();
  engine
}

fn fast_config() -> BenchConfig {
  let mut config = BenchConfig::default();
  config.measurement.repeats = 2;
  config.measurement.warmup = 0;
  config.formats.vortex = false;
  config.calibration.like_max_candidates = 10;
  config
}

#[test]
fn test_describe_and_classify() {
  let engine = engine_with(
    "CREATE TABLE t (a INTEGER, b DECIMAL(10, 2), c VARCHAR, d DATE, e BOOLEAN, f TIMESTAMP, g INTEGER[])",
  );
  let buckets: Vec<TypeBucket> = engine
    .describe("t")
    .unwrap()
    .iter()
    .map(|c| c.bucket())
    .collect();
  assert_eq!(
    vec![
      TypeBucket::Numeric,
      TypeBucket::Numeric,
      TypeBucket::Text,
      TypeBucket::Date,
      TypeBucket::Bool,
      TypeBucket::Date,
      TypeBucket::Other,
    ],
    buckets
  );
}

#[test]
fn test_temporal_values_render_as_literals() {
  let engine = engine_with(
    "CREATE TABLE events AS SELECT DATE '2024-01-01' AS d, TIMESTAMP '2024-01-01 12:30:00.25' AS ts, \
     TIME '01:02:03' AS t",
  );
  let row = engine.fetch_one("SELECT d, ts, t FROM events").unwrap().unwrap();
  assert_eq!(
    vec![
      Scalar::Text("2024-01-01".into()),
      Scalar::Text("2024-01-01 12:30:00.250".into()),
      Scalar::Text("01:02:03".into()),
    ],
    row
  );

  for (column, value) in ["d", "ts", "t"].into_iter().zip(row) {
    let sql = format!("SELECT COUNT(*) FROM events WHERE {}", eq_predicate(column, &value));
    assert_eq!(Scalar::Int(1), engine.fetch_one(&sql).unwrap().unwrap()[0], "{sql}");
  }
}

#[test]
fn test_filter_value_closest_to_target() {
  let engine = engine_with(
    "CREATE TABLE fruit AS SELECT CASE WHEN i < 40 THEN 'apple' WHEN i < 80 THEN 'banana' ELSE 'cherry' END \
     AS fruit, i FROM range(100) t(i)",
  );
  let profiles = profile(&engine, "fruit", 100).unwrap();
  let config = SelectorConfig {
    filter_selectivity: 0.4,
    ..SelectorConfig::default()
  };
  let value = pick_filter_value(&engine, "fruit", &profiles[0], 100, &config).unwrap();
  assert_eq!(Scalar::Text("apple".into()), value.value);
  assert_eq!(Some(40), value.count);
  assert_eq!(Some(0.4), value.achieved);
}

#[test]
fn test_quantile_thresholds_preserve_order() {
  let engine = engine_with("CREATE TABLE nums AS SELECT i AS v FROM range(1, 1001) t(i)");
  let profiles = profile(&engine, "nums", 1000).unwrap();

  let median = thresholds(&engine, "nums", &profiles[0], &[0.5]).unwrap();
  let t = median[0].1.as_f64().unwrap();
  assert!((499.0..=501.0).contains(&t), "{t}");

  let fractions = [0.9, 0.1, 0.5];
  let out = thresholds(&engine, "nums", &profiles[0], &fractions).unwrap();
  assert_eq!(fractions.to_vec(), out.iter().map(|(p, _)| *p).collect::<Vec<_>>());
  let values: Vec<f64> = out.iter().map(|(_, v)| v.as_f64().unwrap()).collect();
  assert!(values[1] < values[2] && values[2] < values[0]);

  assert!(thresholds(&engine, "nums", &profiles[0], &[]).unwrap().is_empty());
  assert!(matches!(
    thresholds(&engine, "nums", &profiles[0], &[1.5]),
    Err(Error::InvalidArgument(_))
  ));
}

#[rstest]
#[case(0.01)]
#[case(0.25)]
#[case(0.9)]
fn test_threshold_specs_achieve_target(#[case] p: f64) {
  let engine = engine_with("CREATE TABLE nums AS SELECT i AS v FROM range(1, 1001) t(i)");
  let profiles = profile(&engine, "nums", 1000).unwrap();
  let specs = threshold_specs(&engine, "nums", &profiles[0], &[p], 1000).unwrap();
  let achieved = specs[0].achieved.unwrap();
  assert!((achieved - p).abs() <= 0.002, "{achieved} vs {p}");
}

#[test]
fn test_date_thresholds_are_dates() {
  let engine = engine_with("CREATE TABLE days AS SELECT DATE '2024-01-01' + CAST(i AS INTEGER) AS d FROM range(100) t(i)");
  let profiles = profile(&engine, "days", 100).unwrap();
  assert_eq!(TypeBucket::Date, profiles[0].bucket);
  assert_eq!(Scalar::Text("2024-01-01".into()), profiles[0].min);

  let specs = threshold_specs(&engine, "days", &profiles[0], &[0.5], 100).unwrap();
  let literal = specs[0].literal.as_str().unwrap();
  assert!(literal.starts_with("2024-02-"), "{literal}");
  assert!(specs[0].achieved.unwrap() > 0.4);
}

#[test]
fn test_like_calibration_matches_measurement() {
  let engine = DuckDbEngine::open_in_memory().unwrap();
  create_synthetic_table(&engine, "items", 2000, 7).unwrap();
  let targets = [0.01, 0.1, 0.5];
  let specs = like_pattern_specs(&engine, "items", "sku", &targets, 2000, 20, 3).unwrap();

  assert!(!specs.is_empty());
  for spec in &specs {
    assert!(spec.kind.is_some());
    assert!(spec.targets.iter().all(|t| targets.contains(t)));
    let pattern = spec.pattern().unwrap();
    let measured = measure_pattern(&engine, "items", "sku", pattern, 2000).unwrap();
    assert_eq!(spec.achieved, Some(measured));
  }
  for kind in PatternKind::ALL {
    let served: usize = specs
      .iter()
      .filter(|s| s.kind == Some(kind))
      .map(|s| s.targets.len())
      .sum();
    assert!(served == 0 || served == targets.len(), "{kind}: {served}");
  }
}

#[test]
fn test_like_calibration_escapes_wildcards() {
  // Unescaped, `a_b%` would also match every `axb` row.
  let engine = engine_with(
    "CREATE TABLE w AS SELECT CASE WHEN i % 2 = 0 THEN 'a_b' ELSE 'axb' END AS s FROM range(10) t(i)",
  );
  let specs = like_pattern_specs(&engine, "w", "s", &[0.5], 10, 10, 3).unwrap();
  assert!(!specs.is_empty());
  for spec in specs {
    assert_eq!(Some(0.5), spec.achieved, "{:?}", spec.literal);
  }
}

#[rstest]
#[case::no_rows("CREATE TABLE t (s VARCHAR)")]
#[case::all_null("CREATE TABLE t AS SELECT CAST(NULL AS VARCHAR) AS s FROM range(20)")]
#[case::all_empty("CREATE TABLE t AS SELECT '' AS s FROM range(20)")]
#[case::null_and_empty("CREATE TABLE t AS SELECT CASE WHEN i % 2 = 0 THEN '' END AS s FROM range(20) r(i)")]
fn test_like_calibration_without_values(#[case] ddl: &str) {
  let engine = engine_with(ddl);
  let rows = row_count(&engine, "t").unwrap();
  let specs = like_pattern_specs(&engine, "t", "s", &[0.01, 0.1, 0.5], rows, 50, 3).unwrap();
  assert!(specs.is_empty(), "{specs:?}");
}

#[test]
fn test_selection_is_deterministic() {
  let engine = DuckDbEngine::open_in_memory().unwrap();
  create_synthetic_table(&engine, "items", 2000, 3).unwrap();
  let rows = row_count(&engine, "items").unwrap();
  let profiles = profile(&engine, "items", rows).unwrap();
  let config = SelectorConfig::default();

  let first = auto_select(&engine, "items", &profiles, rows, &config).unwrap();
  let second = auto_select(&engine, "items", &profiles, rows, &config).unwrap();
  assert_eq!(first, second);
  assert_eq!(Some("id".to_string()), first.point_lookup_column);
  assert_eq!(Some("id".to_string()), first.primary_range_column);
  assert!(first.like_columns.contains(&"sku".to_string()));
}

#[test]
fn test_zero_rows() {
  let engine = engine_with("CREATE TABLE empty (a INTEGER, b VARCHAR)");
  let profiles = profile(&engine, "empty", 0).unwrap();
  assert!(profiles.iter().all(|p| p.ndv_ratio.is_none() && p.ndv == 0));

  let strict = SelectorConfig {
    strict: true,
    ..SelectorConfig::default()
  };
  assert!(matches!(
    pick_filter_column(&profiles, &strict),
    Err(Error::NoSuitableColumn {
      exhaustion: Exhaustion::Rejected(_),
      ..
    })
  ));

  let selection = auto_select(&engine, "empty", &profiles, 0, &SelectorConfig::default()).unwrap();
  assert_eq!("b", selection.filter_column);
  assert_eq!(Scalar::Null, selection.filter_value.value);
  assert_eq!(None, selection.primary_range_column);
}

struct BrokenBackend;

impl Backend for BrokenBackend {
  fn name(&self) -> String {
    "broken".to_string()
  }

  fn write(&self, _engine: &DuckDbEngine, _table: &str, _out_dir: &Path) -> Result<Written> {
    bail!("disk full")
  }
}

#[test]
fn test_benchmark_isolates_failing_format() {
  let dir = tempfile::tempdir().unwrap();
  let config = fast_config();
  let engine = DuckDbEngine::open_in_memory().unwrap();
  create_synthetic_table(&engine, &config.table, 3000, 11).unwrap();

  let source = DatasetSource {
    label: "synthetic".into(),
    input: "memory".into(),
    input_type: "csv".into(),
    input_size_bytes: Some(4 * 1024 * 1024),
    input_rows: None,
  };
  let backends: Vec<Box<dyn Backend>> = vec![
    Box::new(TableBackend),
    Box::new(BrokenBackend),
    Box::new(ParquetBackend {
      codec: "zstd".into(),
      row_group_size: 1024,
      compression_level: None,
    }),
  ];
  let report = benchmark(&engine, &source, &config, &backends, dir.path()).unwrap();

  assert_eq!(vec!["duckdb_table", "broken", "parquet_zstd"], report.formats.keys().collect::<Vec<_>>());
  match &report.formats["broken"] {
    FormatEntry::Failed { error } => assert!(error.contains("disk full"), "{error}"),
    other => panic!("expected failure, got {other:?}"),
  }

  let parquet = report.formats["parquet_zstd"].result().unwrap();
  assert!(parquet.validation.as_ref().unwrap().passed());
  for query in [FULL_SCAN, RANDOM_ACCESS, POINT_LOOKUP, SELECTIVE_PREDICATE] {
    assert!(parquet.queries.contains_key(query), "missing {query}");
    assert_eq!(2, parquet.queries[query].runs);
  }
  assert!(parquet.compression_ratio.unwrap() > 0.0);
  assert!(parquet.write.as_ref().unwrap().decompression_speed_mb_s.is_some());
  assert!(!parquet.selectivity_by_col.is_empty());
  assert!(parquet.best_select_col.is_some());
  assert_eq!(Scalar::Int(0), parquet.queries[FULL_SCAN].result_value);

  let baseline = report.formats["duckdb_table"].result().unwrap();
  assert!(baseline.baseline);
  assert!(baseline.write.is_none());

  assert_eq!("parquet_zstd", report.recommendations[&Objective::StorageFirst].format);
  assert_eq!("parquet_zstd", report.recommendations[&Objective::ScanFirst].format);

  assert!(report.system.engine_version.is_some());
  assert_eq!(None, report.dataset.dropped_rows);

  let files = write_report(&report, dir.path()).unwrap();
  assert!(files.json.ends_with("report_synthetic.json"));
  let markdown = std::fs::read_to_string(&files.markdown).unwrap();
  assert!(markdown.contains("## parquet_zstd"));
  assert!(markdown.contains("- failed: disk full"));

  let mut reader = csv::Reader::from_path(&files.csv).unwrap();
  let headers = reader.headers().unwrap().clone();
  let column = |name: &str| headers.iter().position(|h| h == name).unwrap();
  let records: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
  let failed: Vec<_> = records.iter().filter(|r| &r[column("status")] == "failed").collect();
  assert_eq!(1, failed.len());
  assert_eq!("broken", &failed[0][column("format")]);
  assert_eq!("disk full", &failed[0][column("error")]);
  assert!(records
    .iter()
    .any(|r| &r[column("format")] == "parquet_zstd" && &r[column("query_name")] == "selectivity"));

  let loaded = load_reports(dir.path()).unwrap();
  assert_eq!(1, loaded.len());
  assert_eq!(report.columns, loaded[0].columns);
  assert_eq!(report.recommendations, loaded[0].recommendations);
  assert_eq!(
    report.formats.keys().collect::<Vec<_>>(),
    loaded[0].formats.keys().collect::<Vec<_>>()
  );

  let summary = aggregate(&loaded);
  assert_eq!(1, summary.dataset_count);
  assert!(!summary.formats.contains_key("broken"));
  assert_eq!("parquet_zstd", summary.recommendations[&Objective::StorageFirst].format);
  write_summary(&summary, dir.path()).unwrap();
  assert!(dir.path().join("overall_summary.md").exists());
}

#[test]
fn test_run_from_csv() {
  let dir = tempfile::tempdir().unwrap();
  let csv = dir.path().join("items.csv");
  let engine = DuckDbEngine::open_in_memory().unwrap();
  create_synthetic_table(&engine, "items", 1000, 5).unwrap();
  engine
    .execute_batch(&format!("COPY items TO '{}' (HEADER, DELIMITER ',')", csv.display()))
    .unwrap();

  let mut config = fast_config();
  config.formats.baseline = false;
  config.calibration.like_tests = false;
  let options = RunOptions {
    input: csv.clone(),
    input_type: None,
    label: None,
    out_dir: dir.path().join("out"),
  };
  let report = run(&options, &config).unwrap();

  assert_eq!("items", report.dataset.label);
  assert_eq!("csv", report.dataset.input_type);
  assert_eq!(1000, report.dataset.rows);
  assert_eq!(std::fs::metadata(&csv).unwrap().len(), report.dataset.input_size_bytes.unwrap());
  assert_eq!(Some(&2), report.dataset.column_type_counts.get(&TypeBucket::Text));
  assert!(report.calibration.like.is_empty());
  assert_eq!(vec!["parquet_zstd"], report.formats.keys().collect::<Vec<_>>());

  assert_eq!(Some(1000), report.dataset.input_rows);
  assert_eq!(Some(0), report.dataset.dropped_rows);

  config.row_limit = Some(100);
  let limited = run(&options, &config).unwrap();
  let csv_size = std::fs::metadata(&csv).unwrap().len();
  assert_eq!(100, limited.dataset.rows);
  assert_eq!(Some(1000), limited.dataset.input_rows);
  assert_eq!(Some(900), limited.dataset.dropped_rows);
  assert_eq!(Some(csv_size / 10), limited.dataset.input_size_bytes);

  let parquet = limited.formats["parquet_zstd"].result().unwrap();
  let write = parquet.write.as_ref().unwrap();
  assert!(parquet.compression_ratio.is_some());
  assert!(write.compression_speed_mb_s.is_some());
  assert!(write.decompression_speed_mb_s.is_some());
  assert_eq!("parquet_zstd", limited.recommendations[&Objective::StorageFirst].format);
}

#[test]
fn test_failed_format_drops_its_view() {
  let dir = tempfile::tempdir().unwrap();
  let mut config = fast_config();
  config.calibration.like_tests = false;
  config.queries.push(NamedQuery {
    name: "missing_column".into(),
    sql: "SELECT no_such_column FROM {scan}".into(),
  });
  let engine = DuckDbEngine::open_in_memory().unwrap();
  create_synthetic_table(&engine, &config.table, 500, 2).unwrap();

  let source = DatasetSource {
    label: "views".into(),
    input: "memory".into(),
    input_type: "csv".into(),
    input_size_bytes: None,
    input_rows: None,
  };
  let backends: Vec<Box<dyn Backend>> = vec![Box::new(TableBackend)];
  let report = benchmark(&engine, &source, &config, &backends, dir.path()).unwrap();

  match &report.formats["duckdb_table"] {
    FormatEntry::Failed { error } => assert!(error.contains("missing_column"), "{error}"),
    other => panic!("expected failure, got {other:?}"),
  }
  let views = engine
    .fetch_one("SELECT COUNT(*) FROM duckdb_views() WHERE view_name LIKE 'bench_%'")
    .unwrap()
    .unwrap();
  assert_eq!(Scalar::Int(0), views[0]);
}
