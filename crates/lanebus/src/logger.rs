//! Pluggable sink for bus milestones.
//!
//! The bus reports a handful of operator-facing lines through [`BusLogger`]:
//! shutdown received, each lane's completion, overall completion and the
//! periodic queue depth. Everything else goes straight to `tracing`.

use std::fmt::Debug;

/// Sink for bus milestone messages.
pub trait BusLogger: Debug + Send + Sync + 'static {
    fn info(&self, message: &str);
}

/// Forwards milestones to `tracing::info!` under the `lanebus` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl BusLogger for TracingLogger {
    fn info(&self, message: &str) {
        tracing::info!(target: "lanebus", "{message}");
    }
}

/// Discards every milestone.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl BusLogger for NoopLogger {
    fn info(&self, _message: &str) {}
}
