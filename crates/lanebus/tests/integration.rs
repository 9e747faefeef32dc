pub mod fixtures;

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use async_trait::async_trait;
    use lanebus::*;
    use proptest::prelude::RngCore;
    use proptest::test_runner::{RngAlgorithm, TestRng};
    use std::num::NonZeroUsize;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::time::Duration;
    use tokio::sync::Barrier;

    /// Publishes `total` events over `ids` identifiers in a seeded random
    /// order; each identifier's own sequence numbers count up from zero.
    async fn publish_shuffled(bus: &EventBus<TestEvent>, ids: usize, total: u64, seed: u8) -> u64 {
        let mut rng = TestRng::from_seed(RngAlgorithm::ChaCha, &[seed; 32]);
        let mut next_seq = vec![0_u64; ids];
        let mut accepted = 0;
        for _ in 0..total {
            let id = rng.next_u32() as usize % ids;
            let seq = next_seq[id];
            next_seq[id] += 1;
            if bus.publish(TestEvent::metrics(format!("id-{id}"), seq)).await.is_accepted() {
                accepted += 1;
            }
        }
        accepted
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_per_identifier_order_is_preserved() {
        let bus = quiet_bus(1024, 4);
        let recorder = Recorder::new();
        let counter = Counter::new();
        bus.subscribe_arc(TestTopic::MetricsCollected, recorder.clone());
        bus.subscribe_arc(TestTopic::MetricsCollected, counter.clone());
        bus.start().unwrap();

        let accepted = publish_shuffled(&bus, 100, 50_000, 7).await;
        let report = bus.stop().await.unwrap();

        assert_eq!(accepted, 50_000);
        assert_eq!(report.processed(), 50_000);
        assert_eq!(counter.get(), 50_000);
        assert_eq!(recorder.total(), 50_000);
        recorder.assert_ordered();
        let seen = recorder.sequence("id-42");
        assert_eq!(seen, (0..seen.len() as u64).collect::<Vec<_>>());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore = "one million events; run explicitly"]
    async fn test_million_events_over_hundred_identifiers() {
        let bus = quiet_bus(4096, 4);
        let recorder = Recorder::new();
        let counter = Counter::new();
        bus.subscribe_arc(TestTopic::MetricsCollected, recorder.clone());
        bus.subscribe_arc(TestTopic::MetricsCollected, counter.clone());
        bus.start().unwrap();

        let accepted = publish_shuffled(&bus, 100, 1_000_000, 42).await;
        bus.stop().await.unwrap();

        assert_eq!(accepted, 1_000_000);
        assert_eq!(counter.get(), 1_000_000);
        assert_eq!(recorder.total(), 1_000_000);
        recorder.assert_ordered();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_every_handler_of_a_topic_runs_once() {
        let bus = quiet_bus(64, 2);
        let first = Counter::new();
        let second = Counter::new();
        let other_topic = Counter::new();
        bus.subscribe_arc(TestTopic::MetricsCollected, first.clone());
        bus.subscribe_arc(TestTopic::MetricsCollected, second.clone());
        bus.subscribe_arc(TestTopic::EmissionsCalculated, other_topic.clone());
        bus.start().unwrap();

        for seq in 0..10 {
            bus.publish(TestEvent::metrics("host-a", seq)).await;
        }
        bus.stop().await.unwrap();

        assert_eq!(first.get(), 10);
        assert_eq!(second.get(), 10);
        assert_eq!(other_topic.get(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_duplicate_subscription_runs_twice() {
        let bus = quiet_bus(16, 2);
        let counter = Counter::new();
        bus.subscribe_arc(TestTopic::MetricsCollected, counter.clone());
        bus.subscribe_arc(TestTopic::MetricsCollected, counter.clone());
        bus.start().unwrap();

        bus.publish(TestEvent::metrics("host-a", 0)).await;
        bus.stop().await.unwrap();

        assert_eq!(counter.get(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stop_drains_accepted_events() {
        struct Slow(Arc<AtomicU64>);

        #[async_trait]
        impl EventHandler<TestEvent> for Slow {
            async fn apply(&self, _event: &TestEvent) {
                tokio::time::sleep(Duration::from_millis(1)).await;
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let bus = quiet_bus(256, 2);
        let handled = Arc::new(AtomicU64::new(0));
        bus.subscribe(TestTopic::MetricsCollected, Slow(Arc::clone(&handled)));
        bus.start().unwrap();

        for seq in 0..200 {
            assert!(bus.publish(TestEvent::metrics(format!("id-{}", seq % 7), seq)).await.is_accepted());
        }
        let report = bus.stop().await.unwrap();

        assert_eq!(handled.load(Ordering::SeqCst), 200);
        assert_eq!(report.processed(), 200);
        assert_eq!(bus.queue_depth(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_publish_after_stop_is_rejected() {
        let bus = quiet_bus(16, 2);
        let counter = Counter::new();
        bus.subscribe_arc(TestTopic::MetricsCollected, counter.clone());
        bus.start().unwrap();
        bus.stop().await.unwrap();

        assert_eq!(bus.state(), LifecycleState::Stopped);
        assert_eq!(bus.publish(TestEvent::metrics("late", 0)).await, PublishOutcome::Rejected);
        assert_eq!(counter.get(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_empty_identifier_without_subscribers() {
        let bus = quiet_bus(16, 4);
        bus.start().unwrap();

        assert!(bus.publish(TestEvent::emissions("", 0)).await.is_accepted());
        let report = bus.stop().await.unwrap();

        assert_eq!(report.processed(), 0);
        assert_eq!(report.unrouted(), 1);
        assert_eq!(report.workers.len(), 4);
        assert_eq!(report.workers[bus.worker_for("")].unrouted, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_producers_racing_stop() {
        let bus = quiet_bus(64, 4);
        let recorder = Recorder::new();
        bus.subscribe_arc(TestTopic::MetricsCollected, recorder.clone());
        bus.start().unwrap();

        let producers: Vec<_> = (0..100)
            .map(|producer| {
                let bus = bus.clone();
                tokio::spawn(async move {
                    let mut accepted = 0_u64;
                    for seq in 0..100 {
                        let event = TestEvent::metrics(format!("producer-{producer}"), seq);
                        if bus.publish(event).await.is_accepted() {
                            accepted += 1;
                        }
                    }
                    accepted
                })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(5)).await;
        let report = bus.stop().await.unwrap();

        let mut accepted = 0;
        for producer in producers {
            accepted += producer.await.unwrap();
        }

        assert_eq!(report.processed(), accepted, "every accepted event must be delivered once");
        assert_eq!(recorder.total() as u64, accepted);
        assert!(accepted <= 10_000);
        recorder.assert_ordered();
        assert_eq!(bus.publish(TestEvent::metrics("producer-0", 100)).await, PublishOutcome::Rejected);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stop_resumes_after_timeout_during_drain() {
        let bus = quiet_bus(16, 1);
        let gated = Gated::new();
        bus.subscribe_arc(TestTopic::MetricsCollected, gated.clone());
        bus.start().unwrap();

        for seq in 0..3 {
            assert!(bus.publish(TestEvent::metrics("host-a", seq)).await.is_accepted());
        }
        let first = tokio::time::timeout(Duration::from_millis(20), bus.stop()).await;
        assert!(first.is_err(), "lanes are held by the handler");
        assert_eq!(bus.state(), LifecycleState::ShuttingDown);
        assert_eq!(bus.publish(TestEvent::metrics("host-a", 3)).await, PublishOutcome::Rejected);

        gated.release();
        let report = bus.stop().await.unwrap();
        assert_eq!(report.processed(), 3);
        assert_eq!(gated.handled(), 3);
        assert_eq!(bus.state(), LifecycleState::Stopped);
        assert_eq!(bus.publish(TestEvent::metrics("host-a", 4)).await, PublishOutcome::Rejected);
        assert!(matches!(bus.stop().await, Err(BusError::AlreadyStopped { .. })));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stop_resumes_after_timeout_behind_parked_publisher() {
        let bus: EventBus<TestEvent> = EventBus::builder()
            .queue_capacity(1)
            .workers(1)
            .worker_queue_capacity(1)
            .logger(Arc::new(NoopLogger))
            .build()
            .unwrap();
        let gated = Gated::new();
        bus.subscribe_arc(TestTopic::MetricsCollected, gated.clone());
        bus.start().unwrap();

        let accepted = Arc::new(AtomicU64::new(0));
        let publisher = {
            let bus = bus.clone();
            let accepted = accepted.clone();
            tokio::spawn(async move {
                for seq in 0..10 {
                    if bus.publish(TestEvent::metrics("host-a", seq)).await.is_accepted() {
                        accepted.fetch_add(1, Ordering::SeqCst);
                    }
                }
            })
        };

        // Handler, lane queue, dispatcher and ingestion queue each hold one event.
        tokio::time::timeout(Duration::from_secs(5), async {
            while accepted.load(Ordering::SeqCst) < 4 || bus.queue_depth() < 1 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("pipeline fills up");

        let first = tokio::time::timeout(Duration::from_millis(20), bus.stop()).await;
        assert!(first.is_err(), "the shutdown signal cannot be queued yet");
        assert_eq!(bus.state(), LifecycleState::Started);

        gated.release();
        let report = bus.stop().await.unwrap();
        publisher.await.unwrap();

        assert_eq!(report.processed(), accepted.load(Ordering::SeqCst));
        assert_eq!(gated.handled(), accepted.load(Ordering::SeqCst));
        assert_eq!(bus.state(), LifecycleState::Stopped);
        assert_eq!(bus.publish(TestEvent::metrics("host-a", 10)).await, PublishOutcome::Rejected);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_distinct_lanes_run_in_parallel() {
        struct Rendezvous {
            barrier: Barrier,
            met: AtomicU64,
        }

        #[async_trait]
        impl EventHandler<TestEvent> for Rendezvous {
            async fn apply(&self, _event: &TestEvent) {
                if tokio::time::timeout(Duration::from_secs(5), self.barrier.wait()).await.is_ok() {
                    self.met.fetch_add(1, Ordering::SeqCst);
                }
            }
        }

        let bus = quiet_bus(16, 4);
        let (first, second) = ids_on_distinct_lanes(&bus);
        let rendezvous = Arc::new(Rendezvous { barrier: Barrier::new(2), met: AtomicU64::new(0) });
        bus.subscribe_arc(TestTopic::MetricsCollected, rendezvous.clone());
        bus.start().unwrap();

        bus.publish(TestEvent::metrics(first, 0)).await;
        bus.publish(TestEvent::metrics(second, 0)).await;
        bus.stop().await.unwrap();

        assert_eq!(rendezvous.met.load(Ordering::SeqCst), 2, "both lanes must be in flight at once");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_panicking_handler_is_isolated() {
        let bus = quiet_bus(16, 2);
        let counter = Counter::new();
        bus.subscribe(
            TestTopic::MetricsCollected,
            FnHandler::new("fragile", |event: &TestEvent| {
                assert_ne!(event.seq, 1, "sequence 1 is poisoned");
            }),
        );
        bus.subscribe_arc(TestTopic::MetricsCollected, counter.clone());
        bus.start().unwrap();

        for seq in 0..3 {
            bus.publish(TestEvent::metrics("host-a", seq)).await;
        }
        let report = bus.stop().await.unwrap();

        assert_eq!(report.handler_failures(), 1);
        assert_eq!(report.processed(), 3);
        assert_eq!(counter.get(), 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_lifecycle_misuse_is_reported() {
        let bus = quiet_bus(16, 2);
        assert_eq!(bus.state(), LifecycleState::Constructed);
        assert!(matches!(bus.stop().await, Err(BusError::NotStarted { .. })));

        bus.start().unwrap();
        assert_eq!(bus.state(), LifecycleState::Started);
        assert!(matches!(bus.start(), Err(BusError::AlreadyStarted { .. })));

        bus.stop().await.unwrap();
        let err = bus.stop().await.unwrap_err();
        assert!(matches!(err, BusError::AlreadyStopped { .. }));
        assert_eq!(err.as_label(), "bus_already_stopped");
        assert!(matches!(bus.start(), Err(BusError::AlreadyStarted { .. })));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_shutdown_milestones_are_logged_in_order() {
        let logger = RecordingLogger::new();
        let bus = EventBus::<TestEvent>::builder()
            .queue_capacity(16)
            .workers(3)
            .logger(logger.clone())
            .build()
            .unwrap();
        bus.start().unwrap();
        bus.stop().await.unwrap();

        assert_eq!(
            logger.messages(),
            [
                "bus received shutdown signal",
                "worker 0 shutdown completed",
                "worker 1 shutdown completed",
                "worker 2 shutdown completed",
                "event bus shutdown completed",
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_idle_dispatcher_reports_queue_depth() {
        let logger = RecordingLogger::new();
        let bus = EventBus::<TestEvent>::builder()
            .workers(1)
            .idle_interval(Duration::from_millis(10))
            .logger(logger.clone())
            .build()
            .unwrap();
        bus.start().unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        bus.stop().await.unwrap();

        assert!(logger.messages().iter().any(|m| m == "messages queued: 0"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_events_published_before_start_are_delivered() {
        let bus = quiet_bus(16, 2);
        let recorder = Recorder::new();
        bus.subscribe_arc(TestTopic::MetricsCollected, recorder.clone());

        for seq in 0..5 {
            assert!(bus.publish(TestEvent::metrics("early", seq)).await.is_accepted());
        }
        assert_eq!(bus.queue_depth(), 5);

        bus.start().unwrap();
        bus.stop().await.unwrap();

        assert_eq!(recorder.sequence("early"), [0, 1, 2, 3, 4]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_dropping_every_handle_drains_lanes() {
        let bus = quiet_bus(64, 2);
        let counter = Counter::new();
        bus.subscribe_arc(TestTopic::MetricsCollected, counter.clone());
        bus.start().unwrap();

        for seq in 0..20 {
            bus.publish(TestEvent::metrics("host-a", seq)).await;
        }
        drop(bus);

        tokio::time::timeout(Duration::from_secs(5), async {
            while counter.get() < 20 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("queued events must drain after the last handle is dropped");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_blocking_publish_from_plain_thread() {
        let bus = quiet_bus(16, 2);
        let recorder = Recorder::new();
        bus.subscribe_arc(TestTopic::MetricsCollected, recorder.clone());
        bus.start().unwrap();

        let producer = bus.clone();
        let accepted = tokio::task::spawn_blocking(move || {
            (0..10).filter(|&seq| producer.publish_blocking(TestEvent::metrics("sync", seq)).is_accepted()).count()
        })
        .await
        .unwrap();
        bus.stop().await.unwrap();

        assert_eq!(accepted, 10);
        assert_eq!(recorder.sequence("sync"), (0..10).collect::<Vec<_>>());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_subscription_after_start_is_picked_up() {
        let bus = quiet_bus(16, 2);
        bus.start().unwrap();

        let counter = Counter::new();
        bus.subscribe_arc(TestTopic::MetricsCollected, counter.clone());
        bus.publish(TestEvent::metrics("host-a", 0)).await;
        bus.stop().await.unwrap();

        assert_eq!(counter.get(), 1);
        assert_eq!(bus.subscriber_count(&TestTopic::MetricsCollected), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_custom_partitioner_routes_everything_to_one_lane() {
        #[derive(Debug)]
        struct FirstLane;

        impl Partitioner for FirstLane {
            fn partition(&self, _identifier: &str, _lanes: NonZeroUsize) -> usize {
                0
            }
        }

        let bus = EventBus::<TestEvent>::builder()
            .workers(4)
            .partitioner(FirstLane)
            .logger(Arc::new(NoopLogger))
            .build()
            .unwrap();
        let counter = Counter::new();
        bus.subscribe_arc(TestTopic::MetricsCollected, counter.clone());
        bus.start().unwrap();

        for id in 0..8 {
            bus.publish(TestEvent::metrics(format!("id-{id}"), 0)).await;
        }
        let report = bus.stop().await.unwrap();

        assert_eq!(report.workers[0].processed, 8);
        assert!(report.workers[1..].iter().all(|w| w.processed == 0));
        assert_eq!(counter.get(), 8);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_handlers_of_one_event_run_concurrently() {
        struct Pair(Barrier, AtomicBool);

        #[async_trait]
        impl EventHandler<TestEvent> for Pair {
            async fn apply(&self, _event: &TestEvent) {
                if tokio::time::timeout(Duration::from_secs(5), self.0.wait()).await.is_ok() {
                    self.1.store(true, Ordering::SeqCst);
                }
            }
        }

        let bus = quiet_bus(4, 1);
        let pair = Arc::new(Pair(Barrier::new(2), AtomicBool::new(false)));
        bus.subscribe_arc(TestTopic::MetricsCollected, pair.clone());
        bus.subscribe_arc(TestTopic::MetricsCollected, pair.clone());
        bus.start().unwrap();

        bus.publish(TestEvent::metrics("solo", 0)).await;
        bus.stop().await.unwrap();

        assert!(pair.1.load(Ordering::SeqCst));
    }
}
