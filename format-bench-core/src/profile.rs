//! Per-column statistics gathered once per relation, before any selection or calibration.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
  engine::{ColumnDescriptor, QueryEngine},
  sql::quote_ident,
  types::TypeBucket,
  value::Scalar,
  Result,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnProfile {
  pub name: String,
  pub type_name: String,
  pub bucket: TypeBucket,
  /// Number of distinct non-null values.
  pub ndv: u64,
  /// `ndv / rowcount`; absent for an empty relation.
  pub ndv_ratio: Option<f64>,
  pub null_count: u64,
  pub non_null_count: u64,
  /// Only collected for numeric, date and text columns. Date bounds are carried as text.
  pub min: Scalar,
  pub max: Scalar,
  /// Mean string length, text columns only.
  pub avg_len: Option<f64>,
}

impl ColumnProfile {
  /// A column is usable for range predicates when it has values and `min != max`.
  pub fn has_range(&self) -> bool {
    self.non_null_count > 0 && !self.min.is_null() && !self.max.is_null() && self.min != self.max
  }
}

/// Describe `relation` and profile every column.
pub fn profile<E: QueryEngine + ?Sized>(
  engine: &E,
  relation: &str,
  rowcount: u64,
) -> Result<Vec<ColumnProfile>> {
  let columns = engine.describe(relation)?;
  profile_columns(engine, relation, &columns, rowcount)
}

/// Issues one aggregate query per column.
pub fn profile_columns<E: QueryEngine + ?Sized>(
  engine: &E,
  relation: &str,
  columns: &[ColumnDescriptor],
  rowcount: u64,
) -> Result<Vec<ColumnProfile>> {
  columns
    .iter()
    .map(|column| profile_column(engine, relation, column, rowcount))
    .collect()
}

fn profile_column<E: QueryEngine + ?Sized>(
  engine: &E,
  relation: &str,
  column: &ColumnDescriptor,
  rowcount: u64,
) -> Result<ColumnProfile> {
  let bucket = column.bucket();
  let qcol = quote_ident(&column.name);

  let select_list = match bucket {
    TypeBucket::Numeric => format!("COUNT(DISTINCT {qcol}), COUNT({qcol}), MIN({qcol}), MAX({qcol})"),
    TypeBucket::Date => format!(
      "COUNT(DISTINCT {qcol}), COUNT({qcol}), CAST(MIN({qcol}) AS VARCHAR), CAST(MAX({qcol}) AS VARCHAR)"
    ),
    TypeBucket::Text => format!(
      "COUNT(DISTINCT {qcol}), COUNT({qcol}), MIN({qcol}), MAX({qcol}), AVG(LENGTH({qcol}))"
    ),
    TypeBucket::Bool | TypeBucket::Other => format!("COUNT(DISTINCT {qcol}), COUNT({qcol})"),
  };

  let row = engine
    .fetch_one(&format!("SELECT {select_list} FROM {relation}"))?
    .unwrap_or_default();
  let mut values = row.into_iter();
  let mut next = || values.next().unwrap_or_default();

  let ndv = next().as_u64().unwrap_or(0);
  let non_null_count = next().as_u64().unwrap_or(0);
  let (min, max) = match bucket {
    TypeBucket::Numeric | TypeBucket::Date | TypeBucket::Text => (next(), next()),
    TypeBucket::Bool | TypeBucket::Other => (Scalar::Null, Scalar::Null),
  };
  let avg_len = match bucket {
    TypeBucket::Text => next().as_f64(),
    _ => None,
  };

  let ndv_ratio = (rowcount > 0).then(|| ndv as f64 / rowcount as f64);

  debug!(column = %column.name, %bucket, ndv, non_null_count, "profiled column");

  Ok(ColumnProfile {
    name: column.name.clone(),
    type_name: column.type_name.clone(),
    bucket,
    ndv,
    ndv_ratio,
    null_count: rowcount.saturating_sub(non_null_count),
    non_null_count,
    min,
    max,
    avg_len,
  })
}
