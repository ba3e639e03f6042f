//! [`QueryEngine`] over an embedded DuckDB connection.

use anyhow::{Context, Result};
use chrono::{DateTime, Days, NaiveDate, NaiveTime};
use duckdb::{
  types::{TimeUnit, Value},
  Connection,
};
use format_bench_core::{
  engine::{ColumnDescriptor, QueryEngine},
  value::{Row, Scalar},
};
use tracing::debug;

pub struct DuckDbEngine {
  conn: Connection,
}

impl DuckDbEngine {
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory().context("failed to open in-memory DuckDB")?;
    Ok(DuckDbEngine { conn })
  }

  pub fn execute_batch(&self, sql: &str) -> Result<()> {
    debug!(sql, "execute");
    self
      .conn
      .execute_batch(sql)
      .with_context(|| format!("failed to execute `{sql}`"))
  }

  pub fn set_threads(&self, threads: usize) -> Result<()> {
    self.execute_batch(&format!("PRAGMA threads={threads}"))
  }

  /// The underlying connection, for bulk loading through an appender.
  pub fn connection(&self) -> &Connection {
    &self.conn
  }

  fn query(&self, sql: &str, limit: Option<usize>) -> Result<Vec<Row>> {
    let mut stmt = self
      .conn
      .prepare(sql)
      .with_context(|| format!("failed to prepare `{sql}`"))?;
    let mut rows = stmt.query([])?;

    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
      let width = row.as_ref().column_count();
      let values = (0..width)
        .map(|idx| row.get::<_, Value>(idx).map(to_scalar))
        .collect::<duckdb::Result<Row>>()?;
      out.push(values);
      if limit.is_some_and(|limit| out.len() >= limit) {
        break;
      }
    }
    Ok(out)
  }
}

impl QueryEngine for DuckDbEngine {
  fn describe(&self, relation: &str) -> Result<Vec<ColumnDescriptor>> {
    let rows = self.query(&format!("DESCRIBE {relation}"), None)?;
    rows
      .into_iter()
      .map(|row| {
        let mut fields = row.into_iter();
        match (fields.next(), fields.next()) {
          (Some(Scalar::Text(name)), Some(Scalar::Text(type_name))) => {
            Ok(ColumnDescriptor::new(name, type_name))
          }
          other => anyhow::bail!("unexpected DESCRIBE row for {relation}: {other:?}"),
        }
      })
      .collect()
  }

  fn fetch_one(&self, sql: &str) -> Result<Option<Row>> {
    Ok(self.query(sql, Some(1))?.into_iter().next())
  }

  fn fetch_all(&self, sql: &str) -> Result<Vec<Row>> {
    self.query(sql, None)
  }
}

/// Integers become [`Scalar::Int`] when they fit. Dates, timestamps and times become
/// ISO-8601 text that DuckDB casts back to the column type in a literal. Other values
/// without a natural scalar form are rendered as text.
pub fn to_scalar(value: Value) -> Scalar {
  match value {
    Value::Null => Scalar::Null,
    Value::Boolean(b) => Scalar::Bool(b),
    Value::TinyInt(v) => Scalar::Int(v.into()),
    Value::SmallInt(v) => Scalar::Int(v.into()),
    Value::Int(v) => Scalar::Int(v.into()),
    Value::BigInt(v) => Scalar::Int(v),
    Value::UTinyInt(v) => Scalar::Int(v.into()),
    Value::USmallInt(v) => Scalar::Int(v.into()),
    Value::UInt(v) => Scalar::Int(v.into()),
    Value::UBigInt(v) => i64::try_from(v).map_or(Scalar::Float(v as f64), Scalar::Int),
    Value::HugeInt(v) => i64::try_from(v).map_or(Scalar::Float(v as f64), Scalar::Int),
    Value::Float(v) => Scalar::Float(v.into()),
    Value::Double(v) => Scalar::Float(v),
    Value::Decimal(d) => d
      .to_string()
      .parse::<f64>()
      .map_or_else(|_| Scalar::Text(d.to_string()), Scalar::Float),
    Value::Text(s) => Scalar::Text(s),
    // Out of chrono's range: keep the raw count.
    Value::Date32(days) => format_date(days).map_or(Scalar::Int(days.into()), Scalar::Text),
    Value::Timestamp(unit, v) => format_timestamp(&unit, v).map_or(Scalar::Int(v), Scalar::Text),
    Value::Time64(unit, v) => format_time(&unit, v).map_or(Scalar::Int(v), Scalar::Text),
    other => Scalar::Text(format!("{other:?}")),
  }
}

fn to_micros(unit: &TimeUnit, v: i64) -> i64 {
  match unit {
    TimeUnit::Second => v.saturating_mul(1_000_000),
    TimeUnit::Millisecond => v.saturating_mul(1_000),
    TimeUnit::Microsecond => v,
    TimeUnit::Nanosecond => v / 1_000,
  }
}

fn format_date(days: i32) -> Option<String> {
  let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)?;
  let date = if days >= 0 {
    epoch.checked_add_days(Days::new(days as u64))?
  } else {
    epoch.checked_sub_days(Days::new(days.unsigned_abs() as u64))?
  };
  Some(date.format("%Y-%m-%d").to_string())
}

fn format_timestamp(unit: &TimeUnit, v: i64) -> Option<String> {
  let ts = DateTime::from_timestamp_micros(to_micros(unit, v))?.naive_utc();
  Some(ts.format("%Y-%m-%d %H:%M:%S%.f").to_string())
}

fn format_time(unit: &TimeUnit, v: i64) -> Option<String> {
  let micros = to_micros(unit, v);
  let secs = u32::try_from(micros.div_euclid(1_000_000)).ok()?;
  let nanos = u32::try_from(micros.rem_euclid(1_000_000) * 1_000).ok()?;
  let time = NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos)?;
  Some(time.format("%H:%M:%S%.f").to_string())
}
