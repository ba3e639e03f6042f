use serde::{Deserialize, Serialize};

use crate::{types::TypeBucket, value::Row, value::Scalar, Result};

/// A column as reported by the engine's schema description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
  pub name: String,
  pub type_name: String,
}

impl ColumnDescriptor {
  pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
    ColumnDescriptor {
      name: name.into(),
      type_name: type_name.into(),
    }
  }

  pub fn bucket(&self) -> TypeBucket {
    TypeBucket::classify(&self.type_name)
  }
}

/// The capabilities the benchmark core needs from a SQL engine.
///
/// Implementations are not expected to be safe for concurrent use: every component
/// issues its queries sequentially through a shared reference.
pub trait QueryEngine {
  /// Ordered `(name, type)` pairs of a relation.
  fn describe(&self, relation: &str) -> anyhow::Result<Vec<ColumnDescriptor>>;

  /// Execute `sql` and return only its first row.
  fn fetch_one(&self, sql: &str) -> anyhow::Result<Option<Row>>;

  /// Execute `sql` and materialize every row.
  fn fetch_all(&self, sql: &str) -> anyhow::Result<Vec<Row>>;
}

/// First column of the first row, or [`Scalar::Null`] for an empty result.
pub fn fetch_value<E: QueryEngine + ?Sized>(engine: &E, sql: &str) -> Result<Scalar> {
  let row = engine.fetch_one(sql)?;
  Ok(row.and_then(|row| row.into_iter().next()).unwrap_or_default())
}

pub fn row_count<E: QueryEngine + ?Sized>(engine: &E, relation: &str) -> Result<u64> {
  let count = fetch_value(engine, &format!("SELECT COUNT(*) FROM {relation}"))?;
  Ok(count.as_u64().unwrap_or(0))
}
