use std::fmt;

use serde::{Deserialize, Serialize};

/// Semantic bucket of an engine-reported column type. Selection and calibration only
/// ever reason about these buckets, never about the raw type names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeBucket {
  Numeric,
  Date,
  Text,
  Bool,
  Other,
}

const NUMERIC_TYPES: &[&str] = &[
  "TINYINT", "SMALLINT", "INTEGER", "BIGINT", "HUGEINT", "UTINYINT", "USMALLINT", "UINTEGER",
  "UBIGINT", "UHUGEINT", "FLOAT", "DOUBLE", "REAL", "DECIMAL", "NUMERIC", "INT", "INT1", "INT2",
  "INT4", "INT8", "LONG", "SHORT", "FLOAT4", "FLOAT8",
];

const DATE_TYPES: &[&str] = &[
  "DATE",
  "TIMESTAMP",
  "TIMESTAMP_TZ",
  "TIMESTAMP WITH TIME ZONE",
  "TIMESTAMPTZ",
  "TIMESTAMP_S",
  "TIMESTAMP_MS",
  "TIMESTAMP_NS",
  "DATETIME",
  "TIME",
  "TIMETZ",
  "TIME WITH TIME ZONE",
];

const TEXT_TYPES: &[&str] = &["VARCHAR", "TEXT", "STRING", "CHAR", "BPCHAR"];

const BOOL_TYPES: &[&str] = &["BOOLEAN", "BOOL", "LOGICAL"];

impl TypeBucket {
  /// Map a type string such as `DECIMAL(18,3)` or `varchar` to its bucket.
  /// The parenthesized precision/scale suffix is ignored and unknown names land in
  /// [`TypeBucket::Other`].
  pub fn classify(type_name: &str) -> TypeBucket {
    let base = match type_name.find('(') {
      Some(idx) => &type_name[..idx],
      None => type_name,
    };
    let base = base.trim().to_ascii_uppercase();
    let base = base.as_str();

    if NUMERIC_TYPES.contains(&base) {
      TypeBucket::Numeric
    } else if DATE_TYPES.contains(&base) {
      TypeBucket::Date
    } else if TEXT_TYPES.contains(&base) {
      TypeBucket::Text
    } else if BOOL_TYPES.contains(&base) {
      TypeBucket::Bool
    } else {
      TypeBucket::Other
    }
  }

  /// Whether a column of this bucket supports `<=` range predicates and quantiles.
  pub fn is_ordered(self) -> bool {
    matches!(self, TypeBucket::Numeric | TypeBucket::Date)
  }

  pub fn as_str(self) -> &'static str {
    match self {
      TypeBucket::Numeric => "numeric",
      TypeBucket::Date => "date",
      TypeBucket::Text => "text",
      TypeBucket::Bool => "bool",
      TypeBucket::Other => "other",
    }
  }
}

impl fmt::Display for TypeBucket {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[cfg(test)]
mod tests {
  use rstest::rstest;

  use super::TypeBucket;

  #[rstest]
  #[case("INTEGER", TypeBucket::Numeric)]
  #[case("bigint", TypeBucket::Numeric)]
  #[case("DECIMAL(18,3)", TypeBucket::Numeric)]
  #[case("DATE", TypeBucket::Date)]
  #[case("TIMESTAMP WITH TIME ZONE", TypeBucket::Date)]
  #[case("TIMESTAMP_NS", TypeBucket::Date)]
  #[case("VARCHAR", TypeBucket::Text)]
  #[case("VARCHAR(255)", TypeBucket::Text)]
  #[case("BOOLEAN", TypeBucket::Bool)]
  #[case("INTEGER[]", TypeBucket::Other)]
  #[case("STRUCT(a INTEGER)", TypeBucket::Other)]
  #[case("BLOB", TypeBucket::Other)]
  #[case("", TypeBucket::Other)]
  fn test_classify(#[case] type_name: &str, #[case] expected: TypeBucket) {
    assert_eq!(expected, TypeBucket::classify(type_name));
  }
}
