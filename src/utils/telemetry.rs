//! Logging setup for the binary.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

pub const DEFAULT_FILTER: &str = "commit_gate=info";

/// Install a global `fmt` subscriber filtered by `RUST_LOG`
/// (falls back to [`DEFAULT_FILTER`]).
pub fn init_logging() -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    Registry::default()
        .with(filter)
        .with(fmt::layer().with_target(true).with_line_number(true))
        .try_init()?;
    Ok(())
}
