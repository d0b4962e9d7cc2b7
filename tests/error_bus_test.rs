//! Integration tests for ErrorBus
//!
//! Covers blocking semantics across threads:
//! - Competing consumers receive disjoint subsets
//! - Producers block on a full bus and resume as it drains
//! - Blocking and async observers wake on publish
//! - Cancelled async waits never consume an outcome

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use prometheus_dispatch::core::{ErrorBus, Outcome, SchedulerError};

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn publish(bus: &ErrorBus, prefix: &str, count: usize) {
    for i in 0..count {
        bus.add(Outcome::success(format!("{prefix}-{i}")));
    }
}

// ============================================================================
// CONSUMERS
// ============================================================================

#[test]
fn test_competing_consumers_split_outcomes() {
    const TOTAL: usize = 400;

    let bus = Arc::new(ErrorBus::with_capacity("shared", 16));

    let consumers: Vec<_> = (0..4)
        .map(|_| {
            let bus = Arc::clone(&bus);
            thread::spawn(move || {
                let mut seen = Vec::new();
                while let Some(outcome) = bus.next_timeout(Duration::from_millis(300)) {
                    seen.push(outcome.identifier);
                }
                seen
            })
        })
        .collect();

    let producers: Vec<_> = (0..2)
        .map(|p| {
            let bus = Arc::clone(&bus);
            thread::spawn(move || publish(&bus, &format!("p{p}"), TOTAL / 2))
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }

    let mut all = Vec::new();
    for consumer in consumers {
        all.extend(consumer.join().unwrap());
    }

    let unique: HashSet<_> = all.iter().cloned().collect();
    assert_eq!(all.len(), TOTAL, "every outcome delivered exactly once");
    assert_eq!(unique.len(), TOTAL);
    assert!(bus.is_empty());
}

#[test]
fn test_blocked_observer_wakes_on_publish() {
    let bus = Arc::new(ErrorBus::new("wake"));

    let observer = {
        let bus = Arc::clone(&bus);
        thread::spawn(move || bus.next())
    };

    thread::sleep(Duration::from_millis(50));
    bus.add(Outcome::failure("late", anyhow::anyhow!("timeout talking to db")));

    let outcome = observer.join().unwrap();
    assert_eq!(outcome.identifier, "late");
    assert_eq!(outcome.to_string(), "late: timeout talking to db");
}

#[test]
fn test_next_timeout_waits_roughly_the_timeout() {
    let bus = ErrorBus::new("idle");
    let start = Instant::now();
    assert!(bus.next_timeout(Duration::from_millis(60)).is_none());
    assert!(start.elapsed() >= Duration::from_millis(60));
}

// ============================================================================
// PRODUCERS
// ============================================================================

#[test]
fn test_producers_resume_as_bus_drains() {
    let bus = Arc::new(ErrorBus::with_capacity("narrow", 2));

    let producer = {
        let bus = Arc::clone(&bus);
        thread::spawn(move || publish(&bus, "n", 10))
    };

    thread::sleep(Duration::from_millis(50));
    assert_eq!(bus.len(), 2);

    let drained: Vec<_> = (0..10).map(|_| bus.next().identifier).collect();
    producer.join().unwrap();

    let expected: Vec<_> = (0..10).map(|i| format!("n-{i}")).collect();
    assert_eq!(drained, expected, "single producer keeps FIFO order");
}

// ============================================================================
// ASYNC OBSERVERS
// ============================================================================

#[tokio::test]
async fn test_next_async_receives_from_thread() {
    let bus = Arc::new(ErrorBus::new("async"));

    let producer = {
        let bus = Arc::clone(&bus);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            bus.add(Outcome::success("from-thread"));
        })
    };

    let outcome = bus.next_async().await;
    assert_eq!(outcome.identifier, "from-thread");
    producer.join().unwrap();
}

#[tokio::test]
async fn test_cancelled_async_wait_keeps_outcome() {
    let bus = Arc::new(ErrorBus::new("cancel"));

    let waited = tokio::time::timeout(Duration::from_millis(20), bus.next_async()).await;
    assert!(waited.is_err());
    assert!(matches!(
        bus.next_async_timeout(Duration::from_millis(20)).await,
        Err(SchedulerError::Timeout)
    ));

    bus.add(Outcome::success("only-one"));
    let outcome = bus.next_timeout(Duration::from_millis(300)).unwrap();
    assert_eq!(outcome.identifier, "only-one");
}

#[tokio::test]
async fn test_select_loser_does_not_consume() {
    let bus = Arc::new(ErrorBus::new("race"));

    tokio::select! {
        _ = bus.next_async() => panic!("bus is empty"),
        () = tokio::time::sleep(Duration::from_millis(20)) => {}
    }

    let producer = {
        let bus = Arc::clone(&bus);
        thread::spawn(move || bus.add(Outcome::success("after-race")))
    };
    producer.join().unwrap();

    assert_eq!(bus.try_next().unwrap().identifier, "after-race");
    assert!(bus.is_empty());
}

#[tokio::test]
async fn test_next_async_timeout_on_empty_bus() {
    let bus = Arc::new(ErrorBus::new("quiet"));
    let result = bus.next_async_timeout(Duration::from_millis(20)).await;
    assert!(matches!(result, Err(SchedulerError::Timeout)));
}
