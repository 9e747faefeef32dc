use crate::config::LogConfig;
use anyhow::Context;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// Installs the global subscriber: `RUST_LOG` if set, else `log.level`;
/// compact ANSI console output, or JSON lines when `log.json` is on.
///
/// # Errors
/// Fails on an invalid filter or when a global subscriber is already set.
pub fn init(log: &LogConfig) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&log.level)
            .with_context(|| format!("Invalid log level: {}", log.level))?,
    };

    let layer = if log.json {
        fmt::layer().json().with_target(true).boxed()
    } else {
        fmt::layer().compact().with_ansi(true).boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()
        .context("Failed to install tracing subscriber")
}
