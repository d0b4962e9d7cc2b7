//! Tests for builder patterns

use std::time::Duration;

use prometheus_dispatch::core::{DispatcherState, SchedulerError};
use prometheus_dispatch::{DispatcherBuilder, DispatcherConfig};

#[test]
fn test_dispatcher_builder() {
    let dispatcher = DispatcherBuilder::new()
        .capacity(100)
        .concurrency_limit(10)
        .bus_capacity(20)
        .poll_interval(Duration::from_millis(10))
        .build()
        .unwrap();

    let cfg = dispatcher.config();
    assert_eq!(cfg.capacity, 100);
    assert_eq!(cfg.concurrency_limit, 10);
    assert_eq!(cfg.bus_capacity, 20);
    assert_eq!(cfg.poll_interval_ms, 10);
    assert_eq!(dispatcher.state(), DispatcherState::Idle);
}

#[test]
fn test_dispatcher_builder_from_config() {
    let config = DispatcherConfig::new().with_capacity(5).with_concurrency_limit(2);
    let builder = DispatcherBuilder::from_config(config.clone());
    assert_eq!(builder.config(), &config);

    let dispatcher = builder.build().unwrap();
    assert_eq!(dispatcher.stats().capacity, 5);
    assert_eq!(dispatcher.stats().concurrency_limit, 2);
}

#[test]
fn test_dispatcher_builder_rejects_invalid() {
    let result = DispatcherBuilder::new().concurrency_limit(0).build();
    assert!(matches!(result, Err(SchedulerError::InvalidConfig(_))));
}

#[test]
fn test_dispatcher_bus_uses_configured_capacity() {
    let dispatcher = DispatcherBuilder::new()
        .capacity(4)
        .concurrency_limit(1)
        .bus_capacity(3)
        .build()
        .unwrap();
    let bus = dispatcher.submit_func(|| Ok(()), "cfg", "cfg-1").unwrap();
    assert_eq!(bus.capacity(), 3);
}
