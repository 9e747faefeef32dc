use crate::config::BusConfig;
use crate::dispatcher::Dispatcher;
use crate::envelope::Envelope;
use crate::error::{BusError, BusErrorExt};
use crate::event::{Event, EventHandler};
use crate::logger::{BusLogger, TracingLogger};
use crate::partitioner::{HashPartitioner, Partitioner};
use crate::registry::SubscriberRegistry;
use crate::shutdown::{LifecycleState, ShutdownCoordinator, ShutdownReport};
use crate::worker::Worker;
use parking_lot::Mutex;
use std::fmt;
use std::marker::PhantomData;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Result of a publish attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PublishOutcome {
    /// The event is queued and will be delivered before the bus stops.
    Accepted,
    /// The bus is shutting down (or stopped); the event was dropped.
    Rejected,
}

impl PublishOutcome {
    #[must_use]
    pub const fn is_accepted(self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Run loops built with the bus and spawned by `start`.
struct RunLoops<E: Event> {
    dispatcher: Dispatcher<E>,
    workers: Vec<Worker<E>>,
}

struct BusInner<E: Event> {
    config: BusConfig,
    lanes: NonZeroUsize,
    registry: Arc<SubscriberRegistry<E>>,
    partitioner: Arc<dyn Partitioner>,
    ingress: mpsc::Sender<Envelope<E>>,
    coordinator: ShutdownCoordinator,
    pending: Mutex<Option<RunLoops<E>>>,
}

/// In-process publish/subscribe bus with per-identifier ordering.
///
/// Events are queued on a bounded ingestion queue, routed by a single
/// dispatcher to one of `workers` lanes chosen from [`Event::identifier`],
/// and handed to every handler subscribed to [`Event::topic`]. Events sharing
/// an identifier are handled strictly in publish order; different lanes run
/// in parallel.
///
/// The handle is cheap to clone. Dropping every clone of a started bus
/// without calling [`EventBus::stop`] still drains queued events and stops
/// the lanes.
///
/// # Example
///
/// ```rust
/// use lanebus::{Event, EventBus, FnHandler, PublishOutcome};
///
/// #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// enum Topic { Greeting }
///
/// struct Greeting { user: String }
///
/// impl Event for Greeting {
///     type Topic = Topic;
///     fn identifier(&self) -> &str { &self.user }
///     fn topic(&self) -> Topic { Topic::Greeting }
/// }
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), lanebus::BusError> {
/// let bus = EventBus::<Greeting>::new(64, 4)?;
/// bus.subscribe(Topic::Greeting, FnHandler::new("greeter", |g: &Greeting| {
///     assert!(!g.user.is_empty());
/// }));
/// bus.start()?;
///
/// let outcome = bus.publish(Greeting { user: "ada".to_owned() }).await;
/// assert_eq!(outcome, PublishOutcome::Accepted);
///
/// let report = bus.stop().await?;
/// assert_eq!(report.processed(), 1);
/// # Ok(())
/// # }
/// ```
pub struct EventBus<E: Event> {
    inner: Arc<BusInner<E>>,
}

impl<E: Event> EventBus<E> {
    /// Creates a bus with `queue_capacity` ingestion slots and `workers` lanes.
    ///
    /// Every other setting takes its [`BusConfig`] default. Nothing is
    /// processed until [`EventBus::start`].
    ///
    /// # Errors
    /// Returns [`BusError::InvalidConfiguration`] if either value is zero.
    pub fn new(queue_capacity: usize, workers: usize) -> Result<Self, BusError> {
        Self::builder().queue_capacity(queue_capacity).workers(workers).build()
    }

    /// Starts a [`BusBuilder`] with the default configuration.
    pub fn builder() -> BusBuilder<E> {
        BusBuilder::default()
    }

    /// Spawns the dispatcher and every lane on the current tokio runtime.
    ///
    /// Events published before this call are buffered and processed now.
    ///
    /// # Errors
    /// * [`BusError::Runtime`] when called outside a tokio runtime.
    /// * [`BusError::AlreadyStarted`] on any call after the first successful one.
    pub fn start(&self) -> Result<(), BusError> {
        let handle = Handle::try_current().map_err(|e| BusError::Runtime {
            message: e.to_string().into(),
            context: Some("starting event bus".into()),
        })?;
        self.inner.coordinator.mark_started()?;

        let loops = self
            .inner
            .pending
            .lock()
            .take()
            .ok_or_else(|| BusError::from("run loops already taken"))
            .context("starting event bus")?;

        for worker in loops.workers {
            handle.spawn(worker.run());
        }
        handle.spawn(loops.dispatcher.run());

        debug!(workers = self.inner.lanes.get(), "Event bus started");
        Ok(())
    }

    /// Subscribes `handler` to `topic`.
    ///
    /// Subscribing the same handler twice makes it run twice per event.
    /// Subscriptions may be added at any time; a lane picks them up on its
    /// next event.
    pub fn subscribe<H: EventHandler<E>>(&self, topic: E::Topic, handler: H) {
        self.subscribe_arc(topic, Arc::new(handler));
    }

    /// Subscribes an already shared handler to `topic`.
    pub fn subscribe_arc(&self, topic: E::Topic, handler: Arc<dyn EventHandler<E>>) {
        self.inner.registry.subscribe(topic, handler);
    }

    /// Queues `event`, waiting while the ingestion queue is full.
    ///
    /// Returns [`PublishOutcome::Rejected`] once [`EventBus::stop`] has begun.
    pub async fn publish(&self, event: E) -> PublishOutcome {
        self.publish_arc(Arc::new(event)).await
    }

    /// Same as [`EventBus::publish`] for an event that is already shared.
    pub async fn publish_arc(&self, event: Arc<E>) -> PublishOutcome {
        let Some(_admission) = self.inner.coordinator.admit().await else {
            trace!(identifier = event.identifier(), "Publish rejected: bus is shutting down");
            return PublishOutcome::Rejected;
        };

        match self.inner.ingress.send(Envelope::Event(event)).await {
            Ok(()) => PublishOutcome::Accepted,
            Err(_) => PublishOutcome::Rejected,
        }
    }

    /// Blocking [`EventBus::publish`] for producers running outside the runtime.
    ///
    /// # Panics
    /// Panics when called from within an asynchronous execution context.
    pub fn publish_blocking(&self, event: E) -> PublishOutcome {
        let Some(_admission) = self.inner.coordinator.admit_blocking() else {
            trace!(identifier = event.identifier(), "Publish rejected: bus is shutting down");
            return PublishOutcome::Rejected;
        };

        match self.inner.ingress.blocking_send(Envelope::Event(Arc::new(event))) {
            Ok(()) => PublishOutcome::Accepted,
            Err(_) => PublishOutcome::Rejected,
        }
    }

    /// Stops accepting events, drains everything already queued and waits
    /// for every lane to finish.
    ///
    /// Cancel safe: if the returned future is dropped early, calling `stop`
    /// again resumes the drain.
    ///
    /// # Errors
    /// * [`BusError::NotStarted`] if the bus was never started.
    /// * [`BusError::AlreadyStopped`] if an earlier `stop` already completed.
    /// * [`BusError::Internal`] if a lane vanished without reporting.
    pub async fn stop(&self) -> Result<ShutdownReport, BusError> {
        self.inner.coordinator.shutdown(&self.inner.ingress).await
    }

    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.inner.coordinator.state()
    }

    /// Number of lanes.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.inner.lanes.get()
    }

    /// Events currently waiting in the ingestion queue.
    #[must_use]
    pub fn queue_depth(&self) -> usize {
        self.inner.ingress.max_capacity() - self.inner.ingress.capacity()
    }

    /// Number of handlers subscribed to `topic`.
    #[must_use]
    pub fn subscriber_count(&self, topic: &E::Topic) -> usize {
        self.inner.registry.count(topic)
    }

    /// Lane that events with `identifier` are routed to.
    #[must_use]
    pub fn worker_for(&self, identifier: &str) -> usize {
        self.inner.partitioner.partition(identifier, self.inner.lanes)
    }

    #[must_use]
    pub fn config(&self) -> &BusConfig {
        &self.inner.config
    }
}

impl<E: Event> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<E: Event> fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("config", &self.inner.config)
            .field("partitioner", &self.inner.partitioner)
            .field("registry", &self.inner.registry)
            .field("coordinator", &self.inner.coordinator)
            .field("queue_depth", &self.queue_depth())
            .finish()
    }
}

/// Builder for [`EventBus`].
///
/// ```rust
/// use lanebus::{EventBus, NoopLogger};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # struct Tick;
/// # impl lanebus::Event for Tick {
/// #     type Topic = u8;
/// #     fn identifier(&self) -> &str { "" }
/// #     fn topic(&self) -> u8 { 0 }
/// # }
/// let bus = EventBus::<Tick>::builder()
///     .queue_capacity(256)
///     .workers(8)
///     .worker_queue_capacity(4)
///     .idle_interval(Duration::from_secs(5))
///     .logger(Arc::new(NoopLogger))
///     .build()?;
/// assert_eq!(bus.workers(), 8);
/// # Ok::<(), lanebus::BusError>(())
/// ```
#[must_use = "Builders do nothing unless you call .build()"]
pub struct BusBuilder<E: Event> {
    config: BusConfig,
    logger: Arc<dyn BusLogger>,
    partitioner: Arc<dyn Partitioner>,
    _event: PhantomData<fn() -> E>,
}

impl<E: Event> Default for BusBuilder<E> {
    fn default() -> Self {
        Self {
            config: BusConfig::default(),
            logger: Arc::new(TracingLogger),
            partitioner: Arc::new(HashPartitioner),
            _event: PhantomData,
        }
    }
}

impl<E: Event> BusBuilder<E> {
    /// Replaces the whole configuration, e.g. one loaded from a file.
    pub fn config(mut self, config: BusConfig) -> Self {
        self.config = config;
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    pub fn worker_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.worker_queue_capacity = capacity;
        self
    }

    /// How long the dispatcher idles before logging the queue depth.
    pub fn idle_interval(mut self, interval: Duration) -> Self {
        self.config = self.config.with_idle_interval(interval);
        self
    }

    /// Sink for milestone messages. Defaults to [`TracingLogger`].
    pub fn logger(mut self, logger: Arc<dyn BusLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Identifier → lane mapping. Defaults to [`HashPartitioner`].
    pub fn partitioner(mut self, partitioner: impl Partitioner) -> Self {
        self.partitioner = Arc::new(partitioner);
        self
    }

    /// Validates the configuration and wires the queues and lanes.
    ///
    /// # Errors
    /// Returns [`BusError::InvalidConfiguration`] when [`BusConfig::validate`] fails.
    pub fn build(self) -> Result<EventBus<E>, BusError> {
        self.config.validate()?;
        let lanes = NonZeroUsize::new(self.config.workers)
            .ok_or_else(|| BusError::invalid("workers must be greater than zero"))?;

        let registry = Arc::new(SubscriberRegistry::new());
        let (ingress, queue) = mpsc::channel(self.config.queue_capacity);

        let mut senders = Vec::with_capacity(lanes.get());
        let mut workers = Vec::with_capacity(lanes.get());
        let mut signals = Vec::with_capacity(lanes.get());
        for index in 0..lanes.get() {
            let (sender, worker, signal) =
                Worker::new(index, self.config.worker_queue_capacity, Arc::clone(&registry));
            senders.push(sender);
            workers.push(worker);
            signals.push(signal);
        }

        let dispatcher = Dispatcher::new(
            queue,
            senders,
            Arc::clone(&self.partitioner),
            Arc::clone(&self.logger),
            self.config.idle_interval(),
        );

        debug!(
            queue_capacity = self.config.queue_capacity,
            workers = lanes.get(),
            worker_queue_capacity = self.config.worker_queue_capacity,
            partitioner = ?self.partitioner,
            "Event bus built"
        );

        Ok(EventBus {
            inner: Arc::new(BusInner {
                lanes,
                registry,
                partitioner: self.partitioner,
                ingress,
                coordinator: ShutdownCoordinator::new(signals, self.logger),
                pending: Mutex::new(Some(RunLoops { dispatcher, workers })),
                config: self.config,
            }),
        })
    }
}

impl<E: Event> fmt::Debug for BusBuilder<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BusBuilder")
            .field("config", &self.config)
            .field("logger", &self.logger)
            .field("partitioner", &self.partitioner)
            .finish()
    }
}
