use std::fmt;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
  #[error("no suitable {purpose} column: {exhaustion}")]
  NoSuitableColumn {
    purpose: &'static str,
    exhaustion: Exhaustion,
  },

  #[error("invalid argument: {0}")]
  InvalidArgument(String),

  /// Engine failures are carried through untouched.
  #[error(transparent)]
  Engine(#[from] anyhow::Error),
}

impl Error {
  pub fn no_column(purpose: &'static str, exhaustion: Exhaustion) -> Error {
    Error::NoSuitableColumn {
      purpose,
      exhaustion,
    }
  }
}

/// Why column selection ran out of candidates.
#[derive(Debug, Clone, PartialEq)]
pub enum Exhaustion {
  /// The relation has no columns at all.
  EmptySchema,
  /// No column has a type the selection can use.
  NoEligibleType,
  /// Every eligible column was rejected by a filter.
  Rejected(Vec<Rejection>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
  pub column: String,
  pub reason: RejectReason,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
  CardinalityBand { ndv: u64, min: u64, max: u64 },
  LengthCap { avg_len: f64, max: f64 },
  ConstantRange,
  AllNull,
}

impl fmt::Display for Exhaustion {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Exhaustion::EmptySchema => f.write_str("relation has no columns"),
      Exhaustion::NoEligibleType => f.write_str("no column has an eligible type"),
      Exhaustion::Rejected(rejections) => {
        write!(f, "all {} candidates rejected (", rejections.len())?;
        for (idx, rejection) in rejections.iter().enumerate() {
          if idx > 0 {
            f.write_str("; ")?;
          }
          write!(f, "{}: {}", rejection.column, rejection.reason)?;
        }
        f.write_str(")")
      }
    }
  }
}

impl fmt::Display for RejectReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      RejectReason::CardinalityBand { ndv, min, max } => {
        write!(f, "ndv {ndv} outside cardinality band [{min}, {max}]")
      }
      RejectReason::LengthCap { avg_len, max } => {
        write!(f, "average length {avg_len:.1} above length cap {max}")
      }
      RejectReason::ConstantRange => f.write_str("constant range (min = max)"),
      RejectReason::AllNull => f.write_str("no non-null values"),
    }
  }
}
