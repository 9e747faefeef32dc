#![allow(dead_code)]

use async_trait::async_trait;
use fxhash::FxHashMap;
use lanebus::{BusLogger, Event, EventBus, EventHandler, NoopLogger};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Semaphore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TestTopic {
    MetricsCollected,
    EmissionsCalculated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestEvent {
    pub id: String,
    pub seq: u64,
    pub topic: TestTopic,
}

impl TestEvent {
    pub fn metrics(id: impl Into<String>, seq: u64) -> Self {
        Self { id: id.into(), seq, topic: TestTopic::MetricsCollected }
    }

    pub fn emissions(id: impl Into<String>, seq: u64) -> Self {
        Self { id: id.into(), seq, topic: TestTopic::EmissionsCalculated }
    }
}

impl Event for TestEvent {
    type Topic = TestTopic;

    fn identifier(&self) -> &str {
        &self.id
    }

    fn topic(&self) -> TestTopic {
        self.topic
    }
}

/// Records the sequence numbers seen for every identifier, in arrival order.
#[derive(Debug, Default)]
pub struct Recorder {
    seen: Mutex<FxHashMap<String, Vec<u64>>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sequence(&self, id: &str) -> Vec<u64> {
        self.seen.lock().get(id).cloned().unwrap_or_default()
    }

    pub fn total(&self) -> usize {
        self.seen.lock().values().map(Vec::len).sum()
    }

    /// Asserts every identifier's sequence is strictly increasing.
    pub fn assert_ordered(&self) {
        for (id, seqs) in self.seen.lock().iter() {
            assert!(
                seqs.windows(2).all(|w| w[0] < w[1]),
                "events for {id} arrived out of order: {seqs:?}"
            );
        }
    }
}

#[async_trait]
impl EventHandler<TestEvent> for Recorder {
    async fn apply(&self, event: &TestEvent) {
        self.seen.lock().entry(event.id.clone()).or_default().push(event.seq);
    }

    fn name(&self) -> &'static str {
        "recorder"
    }
}

/// Counts invocations.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventHandler<TestEvent> for Counter {
    async fn apply(&self, _event: &TestEvent) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    fn name(&self) -> &'static str {
        "counter"
    }
}

/// Holds every event until [`Gated::release`] is called, then counts it.
#[derive(Debug)]
pub struct Gated {
    permits: Semaphore,
    handled: AtomicU64,
}

impl Gated {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { permits: Semaphore::new(0), handled: AtomicU64::new(0) })
    }

    pub fn release(&self) {
        self.permits.add_permits(Semaphore::MAX_PERMITS / 2);
    }

    pub fn handled(&self) -> u64 {
        self.handled.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventHandler<TestEvent> for Gated {
    async fn apply(&self, _event: &TestEvent) {
        if let Ok(permit) = self.permits.acquire().await {
            permit.forget();
        }
        self.handled.fetch_add(1, Ordering::SeqCst);
    }

    fn name(&self) -> &'static str {
        "gated"
    }
}

/// Captures milestone messages.
#[derive(Debug, Default)]
pub struct RecordingLogger(Mutex<Vec<String>>);

impl RecordingLogger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn messages(&self) -> Vec<String> {
        self.0.lock().clone()
    }
}

impl BusLogger for RecordingLogger {
    fn info(&self, message: &str) {
        self.0.lock().push(message.to_owned());
    }
}

/// A quiet bus with `workers` lanes and room for `capacity` queued events.
pub fn quiet_bus(capacity: usize, workers: usize) -> EventBus<TestEvent> {
    EventBus::builder()
        .queue_capacity(capacity)
        .workers(workers)
        .logger(Arc::new(NoopLogger))
        .build()
        .expect("valid bus configuration")
}

/// Finds two identifiers routed to different lanes of `bus`.
pub fn ids_on_distinct_lanes(bus: &EventBus<TestEvent>) -> (String, String) {
    let first = "instance-0".to_owned();
    let lane = bus.worker_for(&first);
    let second = (1..1_000)
        .map(|i| format!("instance-{i}"))
        .find(|id| bus.worker_for(id) != lane)
        .expect("some identifier must land on another lane");
    (first, second)
}
