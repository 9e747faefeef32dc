use crate::error::BusError;
use serde::Deserialize;
use std::thread::available_parallelism;
use std::time::Duration;
use tokio::sync::Semaphore;

/// The default ingestion queue capacity.
const DEFAULT_QUEUE_CAPACITY: usize = 1024;
/// Lane count used when parallelism detection fails.
const DEFAULT_WORKERS: usize = 4;
/// Upper bound for the lane count.
pub(crate) const MAX_WORKERS: usize = 4096;
/// Per-lane queue capacity (a single slot hands events over one at a time).
const DEFAULT_WORKER_QUEUE_CAPACITY: usize = 1;
/// How long the dispatcher waits on an empty queue before reporting its depth.
const DEFAULT_IDLE_INTERVAL: Duration = Duration::from_secs(60);

/// Sizing and timing of an [`EventBus`](crate::EventBus).
///
/// Deserializable so applications can load it from files or the environment;
/// every field falls back to its default when absent.
///
/// ```rust
/// use lanebus::BusConfig;
///
/// let config = BusConfig::default().with_workers(8).with_queue_capacity(256);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Capacity of the ingestion queue; a full queue suspends publishers.
    pub queue_capacity: usize,
    /// Number of lanes. Fixed for the bus lifetime.
    pub workers: usize,
    /// Capacity of each lane's inbound queue.
    pub worker_queue_capacity: usize,
    /// Dispatcher idle timeout, in milliseconds, between queue depth reports.
    pub idle_interval_ms: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            workers: default_workers(),
            worker_queue_capacity: DEFAULT_WORKER_QUEUE_CAPACITY,
            idle_interval_ms: duration_ms(DEFAULT_IDLE_INTERVAL),
        }
    }
}

impl BusConfig {
    #[must_use = "Sets the ingestion queue capacity"]
    pub const fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    #[must_use = "Sets the number of lanes"]
    pub const fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    #[must_use = "Sets the capacity of each lane queue"]
    pub const fn with_worker_queue_capacity(mut self, capacity: usize) -> Self {
        self.worker_queue_capacity = capacity;
        self
    }

    #[must_use = "Sets the dispatcher idle interval"]
    pub const fn with_idle_interval(mut self, interval: Duration) -> Self {
        self.idle_interval_ms = duration_ms(interval);
        self
    }

    /// Dispatcher idle interval as a [`Duration`].
    #[must_use]
    pub const fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }

    /// Checks that every capacity and the lane count are usable.
    ///
    /// # Errors
    /// Returns [`BusError::InvalidConfiguration`] when a capacity, the lane
    /// count or the idle interval is zero, or when a value exceeds what the
    /// underlying channels support.
    pub fn validate(&self) -> Result<(), BusError> {
        if self.queue_capacity == 0 {
            return Err(BusError::invalid("queue_capacity must be greater than zero"));
        }
        if self.queue_capacity > Semaphore::MAX_PERMITS {
            return Err(BusError::invalid(format!(
                "queue_capacity must not exceed {}",
                Semaphore::MAX_PERMITS
            )));
        }
        if self.workers == 0 {
            return Err(BusError::invalid("workers must be greater than zero"));
        }
        if self.workers > MAX_WORKERS {
            return Err(BusError::invalid(format!("workers must not exceed {MAX_WORKERS}")));
        }
        if self.worker_queue_capacity == 0 {
            return Err(BusError::invalid("worker_queue_capacity must be greater than zero"));
        }
        if self.worker_queue_capacity > Semaphore::MAX_PERMITS {
            return Err(BusError::invalid(format!(
                "worker_queue_capacity must not exceed {}",
                Semaphore::MAX_PERMITS
            )));
        }
        if self.idle_interval_ms == 0 {
            return Err(BusError::invalid("idle_interval_ms must be greater than zero"));
        }
        Ok(())
    }
}

#[allow(clippy::cast_possible_truncation)]
const fn duration_ms(interval: Duration) -> u64 {
    let ms = interval.as_millis();
    if ms > u64::MAX as u128 { u64::MAX } else { ms as u64 }
}

fn default_workers() -> usize {
    available_parallelism().map(std::num::NonZero::get).unwrap_or(DEFAULT_WORKERS)
}
