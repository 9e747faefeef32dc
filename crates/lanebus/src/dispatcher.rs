use crate::envelope::Envelope;
use crate::event::Event;
use crate::logger::BusLogger;
use crate::partitioner::Partitioner;
use crate::worker::LaneSender;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, error, trace};

/// Sole consumer of the ingestion queue; routes every event to its lane.
pub(crate) struct Dispatcher<E: Event> {
    ingress: mpsc::Receiver<Envelope<E>>,
    lanes: Vec<LaneSender<E>>,
    partitioner: Arc<dyn Partitioner>,
    logger: Arc<dyn BusLogger>,
    idle_interval: Duration,
}

impl<E: Event> Dispatcher<E> {
    pub(crate) fn new(
        ingress: mpsc::Receiver<Envelope<E>>,
        lanes: Vec<LaneSender<E>>,
        partitioner: Arc<dyn Partitioner>,
        logger: Arc<dyn BusLogger>,
        idle_interval: Duration,
    ) -> Self {
        Self { ingress, lanes, partitioner, logger, idle_interval }
    }

    /// Runs until the shutdown signal arrives (or every bus handle is dropped),
    /// then forwards the signal to every lane.
    pub(crate) async fn run(mut self) {
        let Some(lane_count) = NonZeroUsize::new(self.lanes.len()) else {
            error!("Dispatcher started without lanes");
            return;
        };
        debug!(lanes = lane_count.get(), "Dispatcher started");

        loop {
            match timeout(self.idle_interval, self.ingress.recv()).await {
                Ok(Some(Envelope::Event(event))) => {
                    let lane = self.partitioner.partition(event.identifier(), lane_count);
                    trace!(lane, identifier = event.identifier(), "Routing event");
                    self.forward(lane, Envelope::Event(event)).await;
                },
                Ok(Some(Envelope::Shutdown)) => {
                    debug!("Dispatcher received shutdown signal");
                    break;
                },
                Ok(None) => {
                    debug!("Ingestion queue closed without shutdown signal");
                    break;
                },
                Err(_) => {
                    self.logger.info(&format!("messages queued: {}", self.ingress.len()));
                },
            }
        }

        for lane in 0..self.lanes.len() {
            self.forward(lane, Envelope::Shutdown).await;
        }
        debug!("Dispatcher stopped");
    }

    async fn forward(&self, lane: usize, envelope: Envelope<E>) {
        let Some(sender) = self.lanes.get(lane) else {
            error!(lane, lanes = self.lanes.len(), "Partitioner returned an out-of-range lane");
            return;
        };
        if sender.send(envelope).await.is_err() {
            error!(lane, "Lane queue closed; envelope dropped");
        }
    }
}
