//! Turning target selectivities into concrete predicate literals for ordered columns.
//!
//! The quantile estimate itself is the engine's `quantile_cont`; this module batches the
//! requests into one query and pairs the answers back with their fractions.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
  engine::QueryEngine,
  pattern::PatternKind,
  profile::ColumnProfile,
  sql::{le_predicate, quote_ident},
  types::TypeBucket,
  value::Scalar,
  Error, Result,
};

/// A calibrated predicate literal and the selectivity it actually achieves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectivitySpec {
  pub column: String,
  /// Every requested fraction this literal was chosen for, in request order.
  pub targets: Vec<f64>,
  /// Threshold for range predicates, or the `LIKE` pattern text.
  pub literal: Scalar,
  pub achieved: Option<f64>,
  /// Set for text pattern specs only.
  #[serde(skip_serializing_if = "Option::is_none", default)]
  pub kind: Option<PatternKind>,
}

impl SelectivitySpec {
  pub fn pattern(&self) -> Option<&str> {
    self.kind.and(self.literal.as_str())
  }
}

/// Every fraction must lie in `(0, 1]`.
pub fn validate_fractions(fractions: &[f64]) -> Result<()> {
  match fractions.iter().find(|p| !(p.is_finite() && **p > 0.0 && **p <= 1.0)) {
    Some(p) => Err(Error::InvalidArgument(format!(
      "selectivity {p} is outside (0, 1]"
    ))),
    None => Ok(()),
  }
}

fn quantile_expr(column: &ColumnProfile, p: f64) -> String {
  let quantile = format!("quantile_cont({}, {p})", quote_ident(&column.name));
  match column.bucket {
    TypeBucket::Date => format!("CAST(CAST({quantile} AS {}) AS VARCHAR)", column.type_name),
    _ => quantile,
  }
}

/// One threshold per requested fraction, in request order, such that
/// `count(column <= threshold) / rowcount` approximates the fraction.
///
/// An empty relation yields null thresholds.
pub fn thresholds<E: QueryEngine + ?Sized>(
  engine: &E,
  relation: &str,
  column: &ColumnProfile,
  fractions: &[f64],
) -> Result<Vec<(f64, Scalar)>> {
  validate_fractions(fractions)?;
  if fractions.is_empty() {
    return Ok(Vec::new());
  }
  if !column.bucket.is_ordered() {
    return Err(Error::InvalidArgument(format!(
      "column {} of type {} has no order for quantiles",
      column.name, column.type_name
    )));
  }

  let select_list = fractions
    .iter()
    .map(|&p| quantile_expr(column, p))
    .collect::<Vec<_>>()
    .join(", ");
  let row = engine
    .fetch_one(&format!("SELECT {select_list} FROM {relation}"))?
    .unwrap_or_default();
  let mut values = row.into_iter();

  Ok(
    fractions
      .iter()
      .map(|&p| (p, values.next().unwrap_or_default()))
      .collect(),
  )
}

/// [`thresholds`] plus the selectivity each threshold achieves, measured with a single
/// `COUNT(*) FILTER` query.
pub fn threshold_specs<E: QueryEngine + ?Sized>(
  engine: &E,
  relation: &str,
  column: &ColumnProfile,
  fractions: &[f64],
  rowcount: u64,
) -> Result<Vec<SelectivitySpec>> {
  let thresholds = thresholds(engine, relation, column, fractions)?;

  let measured: Vec<&Scalar> = thresholds
    .iter()
    .map(|(_, t)| t)
    .filter(|t| !t.is_null())
    .collect();
  let mut counts = if rowcount > 0 && !measured.is_empty() {
    let select_list = measured
      .iter()
      .map(|t| format!("COUNT(*) FILTER (WHERE {})", le_predicate(&column.name, t)))
      .collect::<Vec<_>>()
      .join(", ");
    engine
      .fetch_one(&format!("SELECT {select_list} FROM {relation}"))?
      .unwrap_or_default()
      .into_iter()
  } else {
    Vec::new().into_iter()
  };

  let specs: Vec<SelectivitySpec> = thresholds
    .into_iter()
    .map(|(p, threshold)| {
      let achieved = if threshold.is_null() {
        None
      } else {
        counts
          .next()
          .and_then(|c| c.as_f64())
          .filter(|_| rowcount > 0)
          .map(|c| c / rowcount as f64)
      };
      SelectivitySpec {
        column: column.name.clone(),
        targets: vec![p],
        literal: threshold,
        achieved,
        kind: None,
      }
    })
    .collect();

  debug!(column = %column.name, specs = specs.len(), "calibrated range thresholds");
  Ok(specs)
}

#[cfg(test)]
mod tests {
  use rstest::rstest;

  use super::validate_fractions;

  #[rstest]
  #[case(&[0.01, 0.5, 1.0], true)]
  #[case(&[], true)]
  #[case(&[0.0], false)]
  #[case(&[1.5], false)]
  #[case(&[f64::NAN], false)]
  #[case(&[-0.1], false)]
  fn test_validate_fractions(#[case] fractions: &[f64], #[case] ok: bool) {
    assert_eq!(ok, validate_fractions(fractions).is_ok());
  }
}
