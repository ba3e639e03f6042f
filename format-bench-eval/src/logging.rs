use anyhow::Result;
use tracing::Level;
use tracing_subscriber::{fmt, fmt::time::SystemTime, prelude::*, EnvFilter, Registry};

/// Install the global subscriber. `RUST_LOG` wins over `level` when set.
///
/// Every crate of the benchmark logs under a `format_bench*` target, so one directive
/// covers the core library, the evaluation harness and the binary.
pub fn init_logging(level: Level, json_output: bool) -> Result<()> {
  let env_filter = EnvFilter::try_from_default_env()
    .unwrap_or_else(|_| EnvFilter::new(format!("format_bench={},warn", level)));

  if json_output {
    let fmt_layer = fmt::layer()
      .json()
      .with_timer(SystemTime)
      .with_target(true)
      .with_file(true)
      .with_line_number(true)
      .with_writer(std::io::stderr);
    Registry::default().with(env_filter).with(fmt_layer).try_init()?;
  } else {
    let fmt_layer = fmt::layer()
      .with_timer(SystemTime)
      .with_target(true)
      .with_writer(std::io::stderr);
    Registry::default().with(env_filter).with(fmt_layer).try_init()?;
  }
  Ok(())
}
