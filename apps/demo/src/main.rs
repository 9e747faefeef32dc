mod cli;
mod config;
mod events;
mod handlers;
mod telemetry;

use crate::cli::Cli;
use crate::events::{DemoEvent, DemoTopic, MetricsCollected};
use crate::handlers::{EmissionsLedger, MetricsLogger};
use anyhow::{Context, ensure};
use clap::Parser;
use lanebus::{EventBus, TracingLogger};
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut cfg = config::load(cli.config.as_deref()).context("Critical: Configuration is malformed")?;
    cli.apply(&mut cfg);
    ensure!(cfg.instances > 0, "instances must be greater than zero");

    telemetry::init(&cfg.log)?;

    let bus = EventBus::<DemoEvent>::builder()
        .config(cfg.bus.clone())
        .logger(Arc::new(TracingLogger))
        .build()?;

    let ledger = Arc::new(EmissionsLedger::default());
    bus.subscribe(DemoTopic::MetricsCollected, MetricsLogger);
    bus.subscribe_arc(DemoTopic::EmissionsCalculated, ledger.clone());
    bus.start()?;

    info!(
        workers = bus.workers(),
        events = cfg.events,
        instances = cfg.instances,
        "Publishing metrics"
    );

    let mut rejected = 0_u64;
    for seq in 0..cfg.events {
        let instance = format!("instance-{}", seq % cfg.instances as u64);
        let metrics = MetricsCollected::sample(instance, seq);
        let emissions = metrics.estimate();

        for event in [DemoEvent::MetricsCollected(metrics), DemoEvent::EmissionsCalculated(emissions)] {
            if !bus.publish(event).await.is_accepted() {
                rejected += 1;
            }
        }
    }
    if rejected > 0 {
        warn!(rejected, "Some events were rejected");
    }

    let report = bus.stop().await?;
    info!(
        processed = report.processed(),
        unrouted = report.unrouted(),
        handler_failures = report.handler_failures(),
        "Event bus drained"
    );
    for lane in &report.workers {
        info!(lane = lane.index, processed = lane.processed, "Lane summary");
    }
    for (instance, grams) in ledger.totals() {
        info!(%instance, grams_co2e = grams, "Emissions total");
    }

    Ok(())
}
