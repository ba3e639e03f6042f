use std::fmt;

use serde::{Deserialize, Serialize};

use crate::sql;

/// A single value returned by the query engine.
///
/// Temporal values are carried as [`Scalar::Text`]: the calibration queries cast them to
/// strings, and a quoted string literal compares correctly against a date column.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
  #[default]
  Null,
  Bool(bool),
  Int(i64),
  Float(f64),
  Text(String),
}

/// One result row, in select-list order.
pub type Row = Vec<Scalar>;

impl Scalar {
  pub fn is_null(&self) -> bool {
    matches!(self, Scalar::Null)
  }

  pub fn as_f64(&self) -> Option<f64> {
    match self {
      Scalar::Int(v) => Some(*v as f64),
      Scalar::Float(v) => Some(*v),
      Scalar::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
      Scalar::Text(s) => s.trim().parse().ok(),
      Scalar::Null => None,
    }
  }

  pub fn as_u64(&self) -> Option<u64> {
    match self {
      Scalar::Int(v) => u64::try_from(*v).ok(),
      Scalar::Float(v) if *v >= 0.0 && v.fract() == 0.0 => Some(*v as u64),
      Scalar::Text(s) => s.trim().parse().ok(),
      _ => None,
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      Scalar::Text(s) => Some(s),
      _ => None,
    }
  }

  /// Render as a SQL literal. Strings are single-quoted with embedded quotes doubled.
  pub fn to_sql(&self) -> String {
    match self {
      Scalar::Null => "NULL".to_string(),
      Scalar::Bool(true) => "TRUE".to_string(),
      Scalar::Bool(false) => "FALSE".to_string(),
      Scalar::Int(v) => v.to_string(),
      Scalar::Float(v) if v.is_finite() => v.to_string(),
      Scalar::Float(v) => sql::string_literal(&v.to_string()),
      Scalar::Text(s) => sql::string_literal(s),
    }
  }
}

impl fmt::Display for Scalar {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Scalar::Null => f.write_str("NULL"),
      Scalar::Bool(v) => write!(f, "{v}"),
      Scalar::Int(v) => write!(f, "{v}"),
      Scalar::Float(v) => write!(f, "{v}"),
      Scalar::Text(s) => f.write_str(s),
    }
  }
}

impl From<i64> for Scalar {
  fn from(value: i64) -> Self {
    Scalar::Int(value)
  }
}

impl From<f64> for Scalar {
  fn from(value: f64) -> Self {
    Scalar::Float(value)
  }
}

impl From<&str> for Scalar {
  fn from(value: &str) -> Self {
    Scalar::Text(value.to_string())
  }
}

impl From<String> for Scalar {
  fn from(value: String) -> Self {
    Scalar::Text(value)
  }
}
