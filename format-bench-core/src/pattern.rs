//! `LIKE` pattern calibration for text columns.
//!
//! There is no closed-form way to go from a desired match rate to a substring pattern, so
//! candidates are derived from sampled values, each candidate's selectivity is measured
//! with a `COUNT(*)`, and for each target the closest measured candidate is kept.

use std::{collections::HashSet, fmt};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
  calibrate::{validate_fractions, SelectivitySpec},
  engine::{fetch_value, QueryEngine},
  pick_closest,
  sql::{like_predicate, quote_ident, LIKE_ESCAPE},
  value::Scalar,
  Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
  Prefix,
  Suffix,
  Contains,
}

impl PatternKind {
  pub const ALL: [PatternKind; 3] = [PatternKind::Prefix, PatternKind::Suffix, PatternKind::Contains];

  pub fn as_str(self) -> &'static str {
    match self {
      PatternKind::Prefix => "prefix",
      PatternKind::Suffix => "suffix",
      PatternKind::Contains => "contains",
    }
  }

  fn index(self) -> usize {
    self as usize
  }
}

impl fmt::Display for PatternKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Escape `%`, `_` and the escape character so the text matches literally.
pub fn escape_like(text: &str) -> String {
  let mut escaped = String::with_capacity(text.len());
  for ch in text.chars() {
    if ch == '%' || ch == '_' || ch == LIKE_ESCAPE {
      escaped.push(LIKE_ESCAPE);
    }
    escaped.push(ch);
  }
  escaped
}

/// Derive the prefix, suffix and contains patterns for one sampled value.
///
/// Each fragment is `pattern_len` characters long, or the whole value when shorter. A
/// fragment whose escaped form ends with the escape character is dropped, and an empty
/// value yields no patterns.
pub fn derive_patterns(value: &str, pattern_len: usize) -> [Option<String>; 3] {
  let chars: Vec<char> = value.chars().collect();
  let n = chars.len();
  if n == 0 || pattern_len == 0 {
    return [None, None, None];
  }
  let take = pattern_len.min(n);
  let mid = (n - take) / 2;

  let fragment = |range: std::ops::Range<usize>| {
    let escaped = escape_like(&chars[range].iter().collect::<String>());
    (!escaped.ends_with(LIKE_ESCAPE)).then_some(escaped)
  };

  [
    fragment(0..take).map(|f| format!("{f}%")),
    fragment(n - take..n).map(|f| format!("%{f}")),
    fragment(mid..mid + take).map(|f| format!("%{f}%")),
  ]
}

/// Candidate patterns per kind, deduplicated, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidatePatterns {
  by_kind: [Vec<String>; 3],
}

impl CandidatePatterns {
  pub fn from_values<'a>(values: impl IntoIterator<Item = &'a str>, pattern_len: usize) -> Self {
    let mut by_kind: [Vec<String>; 3] = Default::default();
    let mut seen: [HashSet<String>; 3] = Default::default();
    for value in values {
      for (idx, pattern) in derive_patterns(value, pattern_len).into_iter().enumerate() {
        if let Some(pattern) = pattern {
          if seen[idx].insert(pattern.clone()) {
            by_kind[idx].push(pattern);
          }
        }
      }
    }
    CandidatePatterns { by_kind }
  }

  pub fn get(&self, kind: PatternKind) -> &[String] {
    &self.by_kind[kind.index()]
  }

  pub fn len(&self) -> usize {
    self.by_kind.iter().map(Vec::len).sum()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

/// A candidate pattern with its measured selectivity.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasuredPattern {
  pub pattern: String,
  pub selectivity: f64,
}

/// For every target, keep the measured candidate closest to it. A candidate chosen for
/// several targets is returned once with all of them, ordered by first choice.
pub fn choose_patterns(measured: &[MeasuredPattern], targets: &[f64]) -> Vec<(MeasuredPattern, Vec<f64>)> {
  let mut chosen: Vec<(usize, Vec<f64>)> = Vec::new();
  for &target in targets {
    let Some((idx, _)) = pick_closest(measured.iter().enumerate(), target, |(_, m)| Some(m.selectivity)) else {
      continue;
    };
    match chosen.iter_mut().find(|(i, _)| *i == idx) {
      Some((_, served)) => served.push(target),
      None => chosen.push((idx, vec![target])),
    }
  }
  chosen
    .into_iter()
    .map(|(idx, served)| (measured[idx].clone(), served))
    .collect()
}

/// Distinct non-null values of the column, at most `limit`, in a stable pseudo-random order.
pub fn sample_values<E: QueryEngine + ?Sized>(
  engine: &E,
  relation: &str,
  column: &str,
  limit: usize,
) -> Result<Vec<String>> {
  let qcol = quote_ident(column);
  let sql = format!(
    "SELECT v FROM (SELECT DISTINCT CAST({qcol} AS VARCHAR) AS v FROM {relation} WHERE {qcol} IS NOT NULL) \
     ORDER BY hash(v), v LIMIT {limit}"
  );
  Ok(
    engine
      .fetch_all(&sql)?
      .into_iter()
      .filter_map(|row| match row.into_iter().next() {
        Some(Scalar::Text(s)) => Some(s),
        _ => None,
      })
      .collect(),
  )
}

/// Selectivity of `column LIKE pattern`.
pub fn measure_pattern<E: QueryEngine + ?Sized>(
  engine: &E,
  relation: &str,
  column: &str,
  pattern: &str,
  rowcount: u64,
) -> Result<f64> {
  let count = fetch_value(
    engine,
    &format!("SELECT COUNT(*) FROM {relation} WHERE {}", like_predicate(column, pattern)),
  )?;
  Ok(count.as_f64().unwrap_or(0.0) / rowcount.max(1) as f64)
}

/// Calibrate `LIKE` patterns for `column` against each target fraction.
///
/// Issues at most `3 * max_candidates` counting queries. A column without sampled values,
/// an empty relation, or an empty target list produce no specs. A pattern kind with no
/// surviving candidates is omitted.
pub fn like_pattern_specs<E: QueryEngine + ?Sized>(
  engine: &E,
  relation: &str,
  column: &str,
  targets: &[f64],
  rowcount: u64,
  max_candidates: usize,
  pattern_len: usize,
) -> Result<Vec<SelectivitySpec>> {
  validate_fractions(targets)?;
  if targets.is_empty() || rowcount == 0 || max_candidates == 0 {
    return Ok(Vec::new());
  }

  let values = sample_values(engine, relation, column, max_candidates)?;
  let candidates = CandidatePatterns::from_values(values.iter().map(String::as_str), pattern_len);
  debug!(column, sampled = values.len(), candidates = candidates.len(), "derived LIKE candidates");

  let mut specs = Vec::new();
  for kind in PatternKind::ALL {
    let measured = candidates
      .get(kind)
      .iter()
      .map(|pattern| {
        Ok(MeasuredPattern {
          pattern: pattern.clone(),
          selectivity: measure_pattern(engine, relation, column, pattern, rowcount)?,
        })
      })
      .collect::<Result<Vec<_>>>()?;

    for (chosen, served) in choose_patterns(&measured, targets) {
      specs.push(SelectivitySpec {
        column: column.to_string(),
        targets: served,
        literal: Scalar::Text(chosen.pattern),
        achieved: Some(chosen.selectivity),
        kind: Some(kind),
      });
    }
  }
  Ok(specs)
}

#[cfg(test)]
mod tests {
  use rstest::rstest;

  use super::*;

  #[rstest]
  #[case("abc", "abc")]
  #[case("50%", "50\\%")]
  #[case("a_b", "a\\_b")]
  #[case("c:\\x", "c:\\\\x")]
  fn test_escape_like(#[case] input: &str, #[case] expected: &str) {
    assert_eq!(expected, escape_like(input));
  }

  #[test]
  fn test_derive_patterns() {
    let [prefix, suffix, contains] = derive_patterns("abcdefg", 3);
    assert_eq!(Some("abc%".to_string()), prefix);
    assert_eq!(Some("%efg".to_string()), suffix);
    assert_eq!(Some("%cde%".to_string()), contains);
  }

  #[test]
  fn test_derive_patterns_short_value_uses_full_length() {
    let [prefix, suffix, contains] = derive_patterns("ab", 5);
    assert_eq!(Some("ab%".to_string()), prefix);
    assert_eq!(Some("%ab".to_string()), suffix);
    assert_eq!(Some("%ab%".to_string()), contains);
  }

  #[test]
  fn test_derive_patterns_multibyte() {
    let [prefix, suffix, _] = derive_patterns("héllo wörld", 2);
    assert_eq!(Some("hé%".to_string()), prefix);
    assert_eq!(Some("%ld".to_string()), suffix);
  }

  #[test]
  fn test_derive_patterns_drops_trailing_escape() {
    let [prefix, suffix, contains] = derive_patterns("ab\\", 3);
    assert_eq!(None, prefix);
    assert_eq!(None, suffix);
    assert_eq!(None, contains);

    let [prefix, suffix, _] = derive_patterns("a\\bcd", 2);
    assert_eq!(None, prefix);
    assert_eq!(Some("%cd".to_string()), suffix);
  }

  #[test]
  fn test_derive_patterns_empty() {
    let empty: [Option<String>; 3] = [None, None, None];
    assert_eq!(empty, derive_patterns("", 3));
  }

  #[test]
  fn test_candidates_deduplicate_per_kind() {
    let candidates = CandidatePatterns::from_values(["apple", "apricot", "maple"], 2);
    assert_eq!(&["ap%".to_string(), "ma%".to_string()], candidates.get(PatternKind::Prefix));
    assert_eq!(
      &["%le".to_string(), "%ot".to_string()],
      candidates.get(PatternKind::Suffix)
    );
    assert_eq!(3, candidates.get(PatternKind::Contains).len());
    assert_eq!(7, candidates.len());
  }

  fn measured(entries: &[(&str, f64)]) -> Vec<MeasuredPattern> {
    entries
      .iter()
      .map(|(pattern, selectivity)| MeasuredPattern {
        pattern: pattern.to_string(),
        selectivity: *selectivity,
      })
      .collect()
  }

  #[test]
  fn test_choose_patterns_merges_targets() {
    let candidates = measured(&[("a%", 0.02), ("b%", 0.4), ("c%", 0.12)]);
    let chosen = choose_patterns(&candidates, &[0.01, 0.1, 0.5, 0.03]);
    let summary: Vec<(&str, Vec<f64>)> = chosen
      .iter()
      .map(|(m, served)| (m.pattern.as_str(), served.clone()))
      .collect();
    assert_eq!(
      vec![("a%", vec![0.01, 0.03]), ("c%", vec![0.1]), ("b%", vec![0.5])],
      summary
    );
  }

  #[test]
  fn test_choose_patterns_is_closest_for_every_served_target() {
    let candidates = measured(&[("a%", 0.05), ("b%", 0.2), ("c%", 0.2), ("d%", 0.7)]);
    let targets = [0.01, 0.1, 0.25, 0.5, 0.9];
    for (chosen, served) in choose_patterns(&candidates, &targets) {
      for target in served {
        let distance = (chosen.selectivity - target).abs();
        assert!(candidates
          .iter()
          .all(|c| distance <= (c.selectivity - target).abs()));
      }
    }
  }

  #[test]
  fn test_choose_patterns_tie_keeps_first() {
    let candidates = measured(&[("a%", 0.2), ("b%", 0.2)]);
    let chosen = choose_patterns(&candidates, &[0.2]);
    assert_eq!("a%", chosen[0].0.pattern);
  }

  #[test]
  fn test_choose_patterns_without_candidates() {
    assert!(choose_patterns(&[], &[0.1]).is_empty());
  }
}
