use anyhow::Context;
use config::{Config, Environment, File};
use lanebus::BusConfig;
use serde::Deserialize;
use std::path::Path;

/// Everything the demo reads from its config file and `LANEBUS__*` variables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub bus: BusConfig,
    pub log: LogConfig,
    /// Metrics samples to publish.
    pub events: u64,
    /// Distinct instances the samples are spread over.
    pub instances: usize,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self { bus: BusConfig::default(), log: LogConfig::default(), events: 1_000, instances: 10 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default level; `RUST_LOG` takes precedence.
    pub level: String,
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: "info".to_owned(), json: false }
    }
}

/// Layers an optional TOML file under `LANEBUS__*` environment variables.
///
/// Nested keys use a double underscore: `LANEBUS__BUS__WORKERS=8` sets
/// `bus.workers`.
///
/// # Errors
/// Fails when the given file is missing or a value has the wrong type.
pub fn load(path: Option<&Path>) -> anyhow::Result<DemoConfig> {
    let mut builder = Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(File::from(path).required(true));
    }
    builder = builder
        .add_source(Environment::with_prefix("LANEBUS").separator("__").try_parsing(true));

    builder
        .build()
        .context("Failed to build config")?
        .try_deserialize::<DemoConfig>()
        .context("Failed to deserialize config")
}
