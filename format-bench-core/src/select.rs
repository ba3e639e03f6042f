//! Automatic choice of the columns and literals the query battery runs against.
//!
//! Every choice is deterministic for a fixed relation snapshot: candidates are visited in
//! schema order (within bucket priority), ties keep the first candidate, and every query
//! that feeds a choice has a total `ORDER BY`.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
  engine::{fetch_value, QueryEngine},
  error::{Exhaustion, RejectReason, Rejection},
  pick_closest, pick_min_by,
  profile::ColumnProfile,
  sql::quote_ident,
  types::TypeBucket,
  value::Scalar,
  Error, Result,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
  /// Inclusive NDV band a filter column must fall into.
  pub min_ndv: u64,
  pub max_ndv: u64,
  /// Filter columns are scored by `|ndv - target_ndv|`.
  pub target_ndv: u64,
  /// Text columns with a longer average value are treated as free text and skipped.
  pub max_avg_len: f64,
  /// Selectivity the equality filter literal aims for.
  pub filter_selectivity: f64,
  /// Number of most frequent values considered for the filter literal.
  pub filter_top_k: usize,
  /// Fail instead of falling back when every filter candidate is rejected.
  pub strict: bool,
}

impl Default for SelectorConfig {
  fn default() -> Self {
    SelectorConfig {
      min_ndv: 10,
      max_ndv: 100_000,
      target_ndv: 1_000,
      max_avg_len: 128.0,
      filter_selectivity: 0.01,
      filter_top_k: 50,
      strict: false,
    }
  }
}

/// A literal chosen for an equality predicate, with how many rows it matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterValue {
  pub value: Scalar,
  pub count: Option<u64>,
  /// `count / rowcount`, absent when unknown or the relation is empty.
  pub achieved: Option<f64>,
}

/// Everything the runner needs to build its query battery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoSelection {
  pub filter_column: String,
  pub filter_value: FilterValue,
  /// Column aggregated by every benchmark query (`MIN(min_column)`).
  pub min_column: String,
  /// Numeric/date columns with a non-constant range, in schema order.
  pub range_columns: Vec<String>,
  /// Column used for the `selective_predicate` query.
  pub primary_range_column: Option<String>,
  pub point_lookup_column: Option<String>,
  pub point_lookup_value: Option<Scalar>,
  /// Length-capped text columns for LIKE calibration.
  pub like_columns: Vec<String>,
}

/// Pick the column for the narrow equality filter.
///
/// Text columns are tried first, then numeric, then date. Candidates outside the NDV band
/// or (for text) above the average length cap are rejected; the rest are scored by the
/// distance of their NDV from the target cardinality.
pub fn pick_filter_column<'a>(
  profiles: &'a [ColumnProfile],
  config: &SelectorConfig,
) -> Result<&'a ColumnProfile> {
  if profiles.is_empty() {
    return Err(Error::no_column("filter", Exhaustion::EmptySchema));
  }

  let ordered = [TypeBucket::Text, TypeBucket::Numeric, TypeBucket::Date]
    .into_iter()
    .flat_map(move |bucket| profiles.iter().filter(move |p| p.bucket == bucket));

  let mut rejections = Vec::new();
  let mut candidates = Vec::new();
  for profile in ordered {
    match filter_rejection(profile, config) {
      Some(reason) => rejections.push(Rejection {
        column: profile.name.clone(),
        reason,
      }),
      None => candidates.push(profile),
    }
  }

  let target = config.target_ndv as f64;
  if let Some(best) = pick_closest(candidates, target, |p| Some(p.ndv as f64)) {
    debug!(column = %best.name, ndv = best.ndv, "picked filter column");
    return Ok(best);
  }

  let exhaustion = if rejections.is_empty() {
    Exhaustion::NoEligibleType
  } else {
    Exhaustion::Rejected(rejections)
  };
  if config.strict {
    return Err(Error::no_column("filter", exhaustion));
  }

  let fallback = first_of(profiles, TypeBucket::Text)
    .or_else(|| first_of(profiles, TypeBucket::Numeric))
    .unwrap_or(&profiles[0]);
  warn!(column = %fallback.name, reason = %exhaustion, "no filter column candidate survived, falling back");
  Ok(fallback)
}

fn filter_rejection(profile: &ColumnProfile, config: &SelectorConfig) -> Option<RejectReason> {
  if profile.ndv < config.min_ndv || profile.ndv > config.max_ndv {
    return Some(RejectReason::CardinalityBand {
      ndv: profile.ndv,
      min: config.min_ndv,
      max: config.max_ndv,
    });
  }
  length_rejection(profile, config)
}

fn length_rejection(profile: &ColumnProfile, config: &SelectorConfig) -> Option<RejectReason> {
  match (profile.bucket, profile.avg_len) {
    (TypeBucket::Text, Some(avg_len)) if avg_len > config.max_avg_len => Some(RejectReason::LengthCap {
      avg_len,
      max: config.max_avg_len,
    }),
    _ => None,
  }
}

fn first_of(profiles: &[ColumnProfile], bucket: TypeBucket) -> Option<&ColumnProfile> {
  profiles.iter().find(|p| p.bucket == bucket)
}

/// Expression that yields a literal-friendly value for the column: temporal and
/// non-scalar types are cast to text.
fn value_expr(profile: &ColumnProfile) -> String {
  let qcol = quote_ident(&profile.name);
  match profile.bucket {
    TypeBucket::Numeric | TypeBucket::Text | TypeBucket::Bool => qcol,
    TypeBucket::Date | TypeBucket::Other => format!("CAST({qcol} AS VARCHAR)"),
  }
}

/// Pick the equality literal whose frequency is closest to the target selectivity among
/// the `filter_top_k` most frequent values. Falls back to an arbitrary non-null value.
pub fn pick_filter_value<E: QueryEngine + ?Sized>(
  engine: &E,
  relation: &str,
  column: &ColumnProfile,
  rowcount: u64,
  config: &SelectorConfig,
) -> Result<FilterValue> {
  let qcol = quote_ident(&column.name);
  let sql = format!(
    "SELECT {}, COUNT(*) FROM {relation} WHERE {qcol} IS NOT NULL GROUP BY 1 ORDER BY 2 DESC, 1 LIMIT {}",
    value_expr(column),
    config.filter_top_k
  );
  let rows = engine.fetch_all(&sql)?;

  let best = if rowcount > 0 {
    let total = rowcount as f64;
    pick_closest(rows, config.filter_selectivity, |row| {
      row.get(1).and_then(Scalar::as_f64).map(|count| count / total)
    })
  } else {
    None
  };

  if let Some(mut row) = best {
    let count = row.get(1).and_then(Scalar::as_u64);
    let value = row.swap_remove(0);
    return Ok(FilterValue {
      value,
      count,
      achieved: count.map(|c| c as f64 / rowcount as f64),
    });
  }

  Ok(FilterValue {
    value: any_value(engine, relation, column)?,
    count: None,
    achieved: None,
  })
}

/// The smallest non-null value of the column, or null when there is none.
pub fn any_value<E: QueryEngine + ?Sized>(
  engine: &E,
  relation: &str,
  column: &ColumnProfile,
) -> Result<Scalar> {
  let expr = value_expr(column);
  fetch_value(
    engine,
    &format!(
      "SELECT MIN({expr}) FROM {relation} WHERE {} IS NOT NULL",
      quote_ident(&column.name)
    ),
  )
}

/// Numeric and date columns with values and a non-constant range, in schema order.
pub fn range_columns(profiles: &[ColumnProfile]) -> Vec<&ColumnProfile> {
  profiles
    .iter()
    .filter(|p| p.bucket.is_ordered() && p.has_range())
    .collect()
}

/// Pick the column for range predicates: the numeric column with the most non-null values,
/// or the best date column when no numeric column qualifies.
pub fn pick_range_column(profiles: &[ColumnProfile]) -> Result<&ColumnProfile> {
  if profiles.is_empty() {
    return Err(Error::no_column("range", Exhaustion::EmptySchema));
  }

  let most_populated = |bucket: TypeBucket| {
    pick_min_by(
      profiles.iter().filter(|p| p.bucket == bucket && p.has_range()),
      |p| Some(-(p.non_null_count as f64)),
    )
  };
  if let Some(best) = most_populated(TypeBucket::Numeric).or_else(|| most_populated(TypeBucket::Date)) {
    return Ok(best);
  }

  let rejections: Vec<Rejection> = profiles
    .iter()
    .filter(|p| p.bucket.is_ordered())
    .map(|p| Rejection {
      column: p.name.clone(),
      reason: if p.non_null_count == 0 {
        RejectReason::AllNull
      } else {
        RejectReason::ConstantRange
      },
    })
    .collect();
  let exhaustion = if rejections.is_empty() {
    Exhaustion::NoEligibleType
  } else {
    Exhaustion::Rejected(rejections)
  };
  Err(Error::no_column("range", exhaustion))
}

/// Pick the column with the highest NDV among numeric, date and length-capped text columns.
pub fn pick_point_lookup_column<'a>(
  profiles: &'a [ColumnProfile],
  config: &SelectorConfig,
) -> Result<&'a ColumnProfile> {
  if profiles.is_empty() {
    return Err(Error::no_column("point lookup", Exhaustion::EmptySchema));
  }

  let mut rejections = Vec::new();
  let mut candidates = Vec::new();
  for profile in profiles {
    if !matches!(profile.bucket, TypeBucket::Numeric | TypeBucket::Date | TypeBucket::Text) {
      continue;
    }
    let reason = if profile.non_null_count == 0 {
      Some(RejectReason::AllNull)
    } else {
      length_rejection(profile, config)
    };
    match reason {
      Some(reason) => rejections.push(Rejection {
        column: profile.name.clone(),
        reason,
      }),
      None => candidates.push(profile),
    }
  }

  pick_min_by(candidates, |p| Some(-(p.ndv as f64))).ok_or_else(|| {
    let exhaustion = if rejections.is_empty() {
      Exhaustion::NoEligibleType
    } else {
      Exhaustion::Rejected(rejections)
    };
    Error::no_column("point lookup", exhaustion)
  })
}

/// Text columns with values and an average length within the cap, in schema order.
pub fn like_columns<'a>(profiles: &'a [ColumnProfile], config: &SelectorConfig) -> Vec<&'a ColumnProfile> {
  profiles
    .iter()
    .filter(|p| p.bucket == TypeBucket::Text && p.non_null_count > 0)
    .filter(|p| length_rejection(p, config).is_none())
    .collect()
}

/// Run every selection against one relation.
///
/// Only the filter column is mandatory. Missing range or point-lookup columns disable the
/// queries that need them, and the aggregated column then falls back to the filter column.
pub fn auto_select<E: QueryEngine + ?Sized>(
  engine: &E,
  relation: &str,
  profiles: &[ColumnProfile],
  rowcount: u64,
  config: &SelectorConfig,
) -> Result<AutoSelection> {
  let filter = pick_filter_column(profiles, config)?;
  let filter_value = pick_filter_value(engine, relation, filter, rowcount, config)?;

  let primary_range = match pick_range_column(profiles) {
    Ok(column) => Some(column),
    Err(Error::NoSuitableColumn { exhaustion, .. }) => {
      warn!(reason = %exhaustion, "no range column, range queries disabled");
      None
    }
    Err(err) => return Err(err),
  };
  let min_column = primary_range.unwrap_or(filter).name.clone();

  let (point_lookup_column, point_lookup_value) = match pick_point_lookup_column(profiles, config) {
    Ok(column) => {
      let value = any_value(engine, relation, column)?;
      (Some(column.name.clone()), Some(value))
    }
    Err(Error::NoSuitableColumn { exhaustion, .. }) => {
      warn!(reason = %exhaustion, "no point lookup column, point lookups disabled");
      (None, None)
    }
    Err(err) => return Err(err),
  };

  let selection = AutoSelection {
    filter_column: filter.name.clone(),
    filter_value,
    min_column,
    range_columns: range_columns(profiles).into_iter().map(|p| p.name.clone()).collect(),
    primary_range_column: primary_range.map(|p| p.name.clone()),
    point_lookup_column,
    point_lookup_value,
    like_columns: like_columns(profiles, config).into_iter().map(|p| p.name.clone()).collect(),
  };
  info!(
    filter_column = %selection.filter_column,
    filter_value = %selection.filter_value.value,
    min_column = %selection.min_column,
    range_columns = selection.range_columns.len(),
    "auto-selected columns"
  );
  Ok(selection)
}
