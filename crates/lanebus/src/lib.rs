//! # Lanebus
//!
//! An in-process publish/subscribe event bus that keeps events with the same
//! identifier in order while processing different identifiers in parallel.
//!
//! ## Overview
//!
//! ```text
//! publish ──► [ingestion queue] ──► dispatcher ──► partition(identifier)
//!                                                     │
//!                      ┌──────────────┬───────────────┼──────────────┐
//!                      ▼              ▼               ▼              ▼
//!                   lane 0         lane 1          lane 2   ...   lane N-1
//!                      │
//!                      └──► every handler subscribed to the event's topic
//! ```
//!
//! * **Per-key ordering**: the same identifier always lands on the same lane,
//!   and a lane handles one event at a time.
//! * **Fan-out**: all handlers of a topic run concurrently for each event and
//!   are joined before the lane moves on.
//! * **Backpressure**: bounded queues suspend producers instead of dropping.
//! * **Graceful shutdown**: `stop` rejects new events, drains everything
//!   already accepted and waits for every lane.
//! * **Panic isolation**: a panicking handler is logged and counted; the lane
//!   keeps running.
//!
//! # Example
//!
//! ```rust
//! use lanebus::{Event, EventBus, EventHandler, BusError};
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicU64, Ordering};
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
//! enum Topic { OrderPlaced }
//!
//! struct OrderPlaced { customer: String, amount: u64 }
//!
//! impl Event for OrderPlaced {
//!     type Topic = Topic;
//!     fn identifier(&self) -> &str { &self.customer }
//!     fn topic(&self) -> Topic { Topic::OrderPlaced }
//! }
//!
//! struct Revenue(Arc<AtomicU64>);
//!
//! #[async_trait::async_trait]
//! impl EventHandler<OrderPlaced> for Revenue {
//!     async fn apply(&self, event: &OrderPlaced) {
//!         self.0.fetch_add(event.amount, Ordering::Relaxed);
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), BusError> {
//!     let total = Arc::new(AtomicU64::new(0));
//!     let bus = EventBus::new(128, 4)?;
//!     bus.subscribe(Topic::OrderPlaced, Revenue(Arc::clone(&total)));
//!     bus.start()?;
//!
//!     for amount in 1..=10 {
//!         bus.publish(OrderPlaced { customer: "c-1".to_owned(), amount }).await;
//!     }
//!
//!     bus.stop().await?;
//!     assert_eq!(total.load(Ordering::Relaxed), 55);
//!     Ok(())
//! }
//! ```

mod bus;
mod config;
mod dispatcher;
mod envelope;
mod error;
mod event;
mod logger;
mod partitioner;
mod registry;
mod shutdown;
mod worker;

pub use bus::{BusBuilder, EventBus, PublishOutcome};
pub use config::BusConfig;
pub use error::{BusError, BusErrorExt};
pub use event::{Event, EventHandler, FnHandler, Topic};
pub use logger::{BusLogger, NoopLogger, TracingLogger};
pub use partitioner::{HashPartitioner, Partitioner};
pub use shutdown::{LifecycleState, ShutdownReport};
pub use worker::WorkerReport;
