//! Lifecycle and drain-and-stop protocol.
//!
//! Two locks cooperate here:
//!
//! * `state` is a short-lived mutex guarding lifecycle transitions. It is never
//!   held across an `.await`.
//! * `gate` is an async read/write lock around the "accepting" flag. Publishers
//!   hold the shared side while they enqueue; `stop` takes the exclusive side to
//!   enqueue the shutdown signal, flip the flag and enter `ShuttingDown`.
//!   Nothing can therefore be queued behind the signal, and no accepted event
//!   is lost.
//!
//! Lane completion receivers live in the coordinator from construction on and
//! are only ever borrowed, so an interrupted `stop` can be repeated.

use crate::envelope::Envelope;
use crate::error::BusError;
use crate::logger::BusLogger;
use crate::worker::WorkerReport;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, RwLock, RwLockReadGuard, mpsc, oneshot};
use tracing::{debug, warn};

/// Where a bus is in its life. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// Built; events are accepted and buffered but nothing is processed yet.
    Constructed,
    /// Dispatcher and lanes are running.
    Started,
    /// `stop` was called; new events are rejected while queued ones drain.
    ShuttingDown,
    /// Every lane has reported completion.
    Stopped,
}

/// Aggregated lane counters returned by [`EventBus::stop`](crate::EventBus::stop).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// One entry per lane, in lane order.
    pub workers: Vec<WorkerReport>,
}

impl ShutdownReport {
    /// Events whose handlers were invoked, across all lanes.
    #[must_use]
    pub fn processed(&self) -> u64 {
        self.workers.iter().map(|w| w.processed).sum()
    }

    /// Events dropped for lack of subscribers, across all lanes.
    #[must_use]
    pub fn unrouted(&self) -> u64 {
        self.workers.iter().map(|w| w.unrouted).sum()
    }

    /// Handler invocations that panicked, across all lanes.
    #[must_use]
    pub fn handler_failures(&self) -> u64 {
        self.workers.iter().map(|w| w.handler_failures).sum()
    }
}

pub(crate) struct ShutdownCoordinator {
    state: Mutex<LifecycleState>,
    gate: RwLock<bool>,
    drain: AsyncMutex<Vec<LaneSignal>>,
    logger: Arc<dyn BusLogger>,
}

/// Completion of one lane as seen by `stop`. Outcomes are recorded as soon as
/// they arrive so an abandoned `stop` never loses them.
enum LaneSignal {
    Pending(oneshot::Receiver<WorkerReport>),
    Reported(WorkerReport),
    Lost,
}

/// Proof that the bus accepts events; hold it until the enqueue completes.
pub(crate) type Admission<'a> = RwLockReadGuard<'a, bool>;

impl ShutdownCoordinator {
    pub(crate) fn new(
        signals: Vec<oneshot::Receiver<WorkerReport>>,
        logger: Arc<dyn BusLogger>,
    ) -> Self {
        Self {
            state: Mutex::new(LifecycleState::Constructed),
            gate: RwLock::new(true),
            drain: AsyncMutex::new(signals.into_iter().map(LaneSignal::Pending).collect()),
            logger,
        }
    }

    pub(crate) fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    /// Moves `Constructed → Started`.
    pub(crate) fn mark_started(&self) -> Result<(), BusError> {
        let mut state = self.state.lock();
        if *state != LifecycleState::Constructed {
            return Err(BusError::AlreadyStarted {
                message: format!("bus is {state:?}").into(),
                context: None,
            });
        }
        *state = LifecycleState::Started;
        Ok(())
    }

    /// Shared side of the gate, or `None` once shutdown has begun.
    pub(crate) async fn admit(&self) -> Option<Admission<'_>> {
        let guard = self.gate.read().await;
        let accepting = *guard;
        accepting.then_some(guard)
    }

    /// Blocking variant of [`Self::admit`] for callers outside the runtime.
    pub(crate) fn admit_blocking(&self) -> Option<Admission<'_>> {
        let guard = self.gate.blocking_read();
        let accepting = *guard;
        accepting.then_some(guard)
    }

    /// Runs the drain-and-stop protocol and collects every lane's report.
    ///
    /// Cancel safe: dropping the future either leaves the bus `Started` (the
    /// shutdown signal was not enqueued) or `ShuttingDown` with the lanes
    /// already draining. A later call picks up where the dropped one stopped.
    pub(crate) async fn shutdown<E>(
        &self,
        ingress: &mpsc::Sender<Envelope<E>>,
    ) -> Result<ShutdownReport, BusError> {
        let mut lanes = self.drain.lock().await;

        match self.state() {
            LifecycleState::Constructed => {
                return Err(BusError::NotStarted {
                    message: "stop called before start".into(),
                    context: None,
                });
            },
            LifecycleState::Stopped => {
                return Err(BusError::AlreadyStopped {
                    message: "bus is Stopped".into(),
                    context: None,
                });
            },
            LifecycleState::Started => self.close_gate(ingress).await,
            LifecycleState::ShuttingDown => debug!("Resuming interrupted shutdown"),
        }

        for (index, lane) in lanes.iter_mut().enumerate() {
            let LaneSignal::Pending(signal) = lane else { continue };
            *lane = match signal.await {
                Ok(worker) => {
                    self.logger.info(&format!("worker {index} shutdown completed"));
                    LaneSignal::Reported(worker)
                },
                Err(_) => {
                    warn!(lane = index, "Lane exited without reporting completion");
                    LaneSignal::Lost
                },
            };
        }

        let mut report = ShutdownReport { workers: Vec::with_capacity(lanes.len()) };
        let mut lost = Vec::new();
        for (index, lane) in lanes.iter().enumerate() {
            match lane {
                LaneSignal::Reported(worker) => report.workers.push(*worker),
                LaneSignal::Lost | LaneSignal::Pending(_) => lost.push(index),
            }
        }

        *self.state.lock() = LifecycleState::Stopped;
        self.logger.info("event bus shutdown completed");
        debug!(
            processed = report.processed(),
            unrouted = report.unrouted(),
            failures = report.handler_failures(),
            "Shutdown report"
        );

        if lost.is_empty() {
            Ok(report)
        } else {
            Err(BusError::Internal {
                message: format!("lanes {lost:?} exited without reporting").into(),
                context: None,
            })
        }
    }

    /// Enqueues the shutdown signal under the exclusive gate, then stops
    /// admitting events and moves to `ShuttingDown` without yielding in between.
    async fn close_gate<E>(&self, ingress: &mpsc::Sender<Envelope<E>>) {
        let mut accepting = self.gate.write().await;
        if ingress.send(Envelope::Shutdown).await.is_err() {
            warn!("Ingestion queue closed before the shutdown signal was enqueued");
        }
        *accepting = false;
        *self.state.lock() = LifecycleState::ShuttingDown;
        drop(accepting);
        self.logger.info("bus received shutdown signal");
    }
}

impl std::fmt::Debug for ShutdownCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownCoordinator").field("state", &self.state()).finish_non_exhaustive()
    }
}
