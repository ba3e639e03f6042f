//! This crate implements the evaluation harness around `format-bench-core`, including:
//! - A DuckDB-backed [`engine::DuckDbEngine`]
//! - Dataset ingestion (CSV/Parquet) and synthetic datasets
//! - Storage format backends (Parquet, Vortex, the raw DuckDB table)
//! - The benchmark runner producing a [`format_bench_core::report::Report`]
//! - Report, summary and row-scaling outputs
//! - Configuration and logging setup

#[cfg(test)]
mod test;

pub mod backend;
pub mod config;
pub mod engine;
pub mod ingest;
pub mod logging;
pub mod output;
pub mod runner;
pub mod scaling;
pub mod util;

pub use config::BenchConfig;
pub use engine::DuckDbEngine;
pub use runner::{benchmark, run, DatasetSource, RunOptions};
