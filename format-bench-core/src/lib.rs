//! This crate provides the engine-agnostic core of the format benchmark: column
//! classification and profiling, automatic column selection, selectivity calibration
//! (quantile thresholds and `LIKE` patterns), latency measurement, and cross-format
//! recommendations.
//!
//! All SQL goes through the [`engine::QueryEngine`] trait, so everything here can be driven
//! by any engine that speaks the dialect the generated statements use.

pub mod calibrate;
pub mod engine;
pub mod error;
pub mod measure;
pub mod pattern;
pub mod profile;
pub mod recommend;
pub mod report;
pub mod select;
pub mod sql;
pub mod stats;
pub mod types;
pub mod value;

pub use error::{Error, Result};

/// Return the candidate with the smallest score. Candidates scored `None` or NaN are
/// skipped, and on equal scores the earliest candidate wins.
pub fn pick_min_by<T, I, F>(candidates: I, mut score: F) -> Option<T>
where
  I: IntoIterator<Item = T>,
  F: FnMut(&T) -> Option<f64>,
{
  let mut best: Option<(T, f64)> = None;
  for candidate in candidates {
    let Some(s) = score(&candidate).filter(|s| !s.is_nan()) else {
      continue;
    };
    if best.as_ref().map_or(true, |(_, b)| s < *b) {
      best = Some((candidate, s));
    }
  }
  best.map(|(candidate, _)| candidate)
}

/// Return the candidate whose value is closest to `target`, first one on ties.
pub fn pick_closest<T, I, F>(candidates: I, target: f64, mut value: F) -> Option<T>
where
  I: IntoIterator<Item = T>,
  F: FnMut(&T) -> Option<f64>,
{
  pick_min_by(candidates, |candidate| value(candidate).map(|v| (v - target).abs()))
}
