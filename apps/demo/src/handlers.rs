use crate::events::DemoEvent;
use async_trait::async_trait;
use fxhash::FxHashMap;
use lanebus::EventHandler;
use parking_lot::Mutex;
use tracing::{info, warn};

/// Logs every metrics sample.
#[derive(Debug, Default)]
pub struct MetricsLogger;

#[async_trait]
impl EventHandler<DemoEvent> for MetricsLogger {
    async fn apply(&self, event: &DemoEvent) {
        let DemoEvent::MetricsCollected(metrics) = event else {
            warn!(?event, "Metrics logger got an unexpected event");
            return;
        };
        info!(
            instance = %metrics.instance,
            "CPU {}% - MEMORY {} MiB",
            metrics.cpu_percent,
            metrics.memory_mib
        );
    }

    fn name(&self) -> &'static str {
        "metrics-logger"
    }
}

/// Running emissions total per instance.
#[derive(Debug, Default)]
pub struct EmissionsLedger {
    totals: Mutex<FxHashMap<String, f64>>,
}

impl EmissionsLedger {
    /// Totals sorted by instance name.
    pub fn totals(&self) -> Vec<(String, f64)> {
        let mut totals: Vec<_> =
            self.totals.lock().iter().map(|(k, v)| (k.clone(), *v)).collect();
        totals.sort_by(|a, b| a.0.cmp(&b.0));
        totals
    }
}

#[async_trait]
impl EventHandler<DemoEvent> for EmissionsLedger {
    async fn apply(&self, event: &DemoEvent) {
        let DemoEvent::EmissionsCalculated(emissions) = event else {
            warn!(?event, "Emissions ledger got an unexpected event");
            return;
        };
        *self.totals.lock().entry(emissions.instance.clone()).or_default() += emissions.grams_co2e;
    }

    fn name(&self) -> &'static str {
        "emissions-ledger"
    }
}
