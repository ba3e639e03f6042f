//! Helpers for rendering the SQL text issued by the selector, calibrators and runner.
//! Identifiers always come from the engine's own schema description, so quoting is the
//! only sanitising needed.

use crate::value::Scalar;

/// Escape character used for every generated `LIKE` pattern.
pub const LIKE_ESCAPE: char = '\\';

pub fn quote_ident(name: &str) -> String {
  format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn string_literal(value: &str) -> String {
  format!("'{}'", value.replace('\'', "''"))
}

/// `"col" = literal`, or `"col" IS NULL` when the literal is null.
pub fn eq_predicate(column: &str, value: &Scalar) -> String {
  match value {
    Scalar::Null => format!("{} IS NULL", quote_ident(column)),
    value => format!("{} = {}", quote_ident(column), value.to_sql()),
  }
}

pub fn le_predicate(column: &str, value: &Scalar) -> String {
  format!("{} <= {}", quote_ident(column), value.to_sql())
}

pub fn like_predicate(column: &str, pattern: &str) -> String {
  format!(
    "{} LIKE {} ESCAPE {}",
    quote_ident(column),
    string_literal(pattern),
    string_literal(&LIKE_ESCAPE.to_string())
  )
}
