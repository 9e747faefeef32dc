use crate::config::DemoConfig;
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "lanebus-demo")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Publishes synthetic instance metrics through a lanebus event bus")]
pub struct Cli {
    /// TOML configuration file.
    #[arg(short, long, env = "LANEBUS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Ingestion queue capacity.
    #[arg(long)]
    pub queue_capacity: Option<usize>,

    /// Number of lanes.
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Metrics samples to publish.
    #[arg(short, long)]
    pub events: Option<u64>,

    /// Distinct instances the samples are spread over.
    #[arg(short, long)]
    pub instances: Option<usize>,

    /// Log level used when `RUST_LOG` is unset.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Emit JSON log lines.
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    /// Command-line values win over the file and the environment.
    pub fn apply(&self, config: &mut DemoConfig) {
        if let Some(capacity) = self.queue_capacity {
            config.bus.queue_capacity = capacity;
        }
        if let Some(workers) = self.workers {
            config.bus.workers = workers;
        }
        if let Some(events) = self.events {
            config.events = events;
        }
        if let Some(instances) = self.instances {
            config.instances = instances;
        }
        if let Some(level) = &self.log_level {
            config.log.level.clone_from(level);
        }
        if self.json {
            config.log.json = true;
        }
    }
}
