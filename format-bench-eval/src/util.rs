use anyhow::Result;
use duckdb::params;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use rand_distr::{Distribution, LogNormal, Zipf};

use crate::engine::DuckDbEngine;

const CATEGORIES: [&str; 8] = ["apparel", "books", "garden", "grocery", "music", "outdoor", "toys", "tools"];

pub fn gen_dataset_lognormal(size: usize, seed: u64) -> Result<Vec<f64>> {
  let rng = SmallRng::seed_from_u64(seed);
  let dist = LogNormal::new(3.0, 1.0)?;
  Ok(dist.sample_iter(rng).take(size).collect())
}

/// Create `table` with `rows` deterministic pseudo-random rows:
///
/// | column     | type    | shape                                   |
/// |------------|---------|-----------------------------------------|
/// | `id`       | BIGINT  | unique, 0..rows                         |
/// | `category` | VARCHAR | 8 values, Zipf skewed                   |
/// | `price`    | DOUBLE  | log-normal, ~2% NULL                    |
/// | `quantity` | INTEGER | 1..=50                                  |
/// | `sku`      | VARCHAR | `SKU-<category>-<n>`, ~rows/4 distinct  |
/// | `day`      | DATE    | 2024-01-01 plus `id % 365` days         |
pub fn create_synthetic_table(engine: &DuckDbEngine, table: &str, rows: usize, seed: u64) -> Result<()> {
  let staging = format!("{table}_staging");
  engine.execute_batch(&format!(
    "CREATE OR REPLACE TABLE {staging} (id BIGINT, category VARCHAR, price DOUBLE, quantity INTEGER, sku VARCHAR)"
  ))?;

  let mut rng = SmallRng::seed_from_u64(seed);
  let zipf = Zipf::new(CATEGORIES.len() as u64, 1.2)?;
  let prices = gen_dataset_lognormal(rows, seed)?;
  {
    let mut appender = engine.connection().appender(&staging)?;
    for (id, price) in prices.into_iter().enumerate() {
      let category = CATEGORIES[zipf.sample(&mut rng) as usize - 1];
      let price = (!rng.gen_bool(0.02)).then_some(price);
      let quantity: i32 = rng.gen_range(1..=50);
      let sku = format!("SKU-{category}-{}", rng.gen_range(0..(rows / 4).max(1)));
      appender.append_row(params![id as i64, category, price, quantity, sku])?;
    }
    appender.flush()?;
  }

  engine.execute_batch(&format!(
    "CREATE OR REPLACE TABLE {table} AS \
     SELECT *, DATE '2024-01-01' + CAST(id % 365 AS INTEGER) AS day FROM {staging} ORDER BY id; \
     DROP TABLE {staging};"
  ))
}
