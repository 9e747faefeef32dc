//! A lane: one bounded inbound queue drained strictly in order.
//!
//! ```text
//! dispatcher ──► [lane queue] ──► Worker::run
//!                                   │  Event(e)
//!                                   ├──► JoinSet: handler 1 .. handler k (concurrent)
//!                                   │    join all, panics caught per handler
//!                                   │  Shutdown
//!                                   └──► close queue, send WorkerReport (once)
//! ```

use crate::envelope::Envelope;
use crate::event::Event;
use crate::registry::SubscriberRegistry;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, trace, warn};

/// Final counters of one lane, delivered on its completion signal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerReport {
    /// Lane index.
    pub index: usize,
    /// Events whose handlers were invoked.
    pub processed: u64,
    /// Events dropped because no handler was subscribed to their topic.
    pub unrouted: u64,
    /// Handler invocations that panicked or were aborted.
    pub handler_failures: u64,
}

struct HandlerPanic {
    handler: &'static str,
    message: String,
}

/// Run loop of a single lane.
pub(crate) struct Worker<E: Event> {
    inbox: mpsc::Receiver<Envelope<E>>,
    registry: Arc<SubscriberRegistry<E>>,
    done: oneshot::Sender<WorkerReport>,
    report: WorkerReport,
}

/// Sending side of a lane, owned by the dispatcher.
pub(crate) type LaneSender<E> = mpsc::Sender<Envelope<E>>;

impl<E: Event> Worker<E> {
    /// Creates lane `index` with an inbound queue of `capacity` slots.
    ///
    /// Returns the queue sender, the run loop and the completion signal.
    pub(crate) fn new(
        index: usize,
        capacity: usize,
        registry: Arc<SubscriberRegistry<E>>,
    ) -> (LaneSender<E>, Self, oneshot::Receiver<WorkerReport>) {
        let (tx, inbox) = mpsc::channel(capacity);
        let (done, signal) = oneshot::channel();
        let worker =
            Self { inbox, registry, done, report: WorkerReport { index, ..WorkerReport::default() } };
        (tx, worker, signal)
    }

    pub(crate) async fn run(mut self) {
        let lane = self.report.index;
        debug!(lane, "Lane started");

        while let Some(envelope) = self.inbox.recv().await {
            match envelope {
                Envelope::Event(event) => self.deliver(event).await,
                Envelope::Shutdown => break,
            }
        }

        self.inbox.close();
        debug!(
            lane,
            processed = self.report.processed,
            unrouted = self.report.unrouted,
            failures = self.report.handler_failures,
            "Lane drained"
        );

        if self.done.send(self.report).is_err() {
            warn!(lane, "Lane completion signal dropped: nobody is waiting for it");
        }
    }

    async fn deliver(&mut self, event: Arc<E>) {
        let lane = self.report.index;
        let handlers = self.registry.handlers(&event.topic());

        if handlers.is_empty() {
            self.report.unrouted += 1;
            trace!(lane, topic = ?event.topic(), "Event dropped: no subscribers");
            return;
        }

        let mut set = JoinSet::new();
        for handler in handlers {
            let event = Arc::clone(&event);
            set.spawn(async move {
                let name = handler.name();
                AssertUnwindSafe(handler.apply(&event))
                    .catch_unwind()
                    .await
                    .map_err(|panic| HandlerPanic { handler: name, message: panic_message(&*panic) })
            });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(())) => {},
                Ok(Err(panic)) => {
                    self.report.handler_failures += 1;
                    warn!(
                        lane,
                        handler = panic.handler,
                        identifier = event.identifier(),
                        message = %panic.message,
                        "Event handler panicked"
                    );
                },
                Err(e) => {
                    self.report.handler_failures += 1;
                    warn!(lane, error = %e, "Event handler task aborted");
                },
            }
        }

        self.report.processed += 1;
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        (*msg).to_owned()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_owned()
    }
}
