//! Tests for configuration validation

use std::time::Duration;

use prometheus_dispatch::config::dispatcher::{
    DEFAULT_CAPACITY, DEFAULT_POLL_INTERVAL_MS, DEFAULT_THREAD_STACK_SIZE,
};
use prometheus_dispatch::DispatcherConfig;

#[test]
fn test_dispatcher_config_defaults() {
    let cfg = DispatcherConfig::default();
    assert_eq!(cfg.capacity, DEFAULT_CAPACITY);
    assert_eq!(cfg.bus_capacity, 100);
    assert_eq!(cfg.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
    assert_eq!(cfg.thread_stack_size, DEFAULT_THREAD_STACK_SIZE);
    assert_eq!(cfg.concurrency_limit, num_cpus::get());
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_dispatcher_config_invalid_capacity() {
    let invalid = DispatcherConfig::new().with_capacity(0);
    assert!(invalid.validate().unwrap_err().contains("capacity"));
}

#[test]
fn test_dispatcher_config_invalid_concurrency_limit() {
    let invalid = DispatcherConfig::new().with_concurrency_limit(0);
    assert!(invalid
        .validate()
        .unwrap_err()
        .contains("concurrency_limit"));
}

#[test]
fn test_dispatcher_config_invalid_bus_capacity() {
    let invalid = DispatcherConfig::new().with_bus_capacity(0);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_dispatcher_config_invalid_poll_interval() {
    let invalid = DispatcherConfig::new().with_poll_interval(Duration::ZERO);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_dispatcher_config_from_json_partial() {
    let cfg = DispatcherConfig::from_json_str(r#"{"capacity": 100, "concurrency_limit": 10}"#)
        .unwrap();
    assert_eq!(cfg.capacity, 100);
    assert_eq!(cfg.concurrency_limit, 10);
    assert_eq!(cfg.bus_capacity, 100);
    assert_eq!(cfg.poll_interval(), Duration::from_millis(DEFAULT_POLL_INTERVAL_MS));
}

#[test]
fn test_dispatcher_config_from_json_rejects_invalid() {
    let err = DispatcherConfig::from_json_str(r#"{"concurrency_limit": 0}"#).unwrap_err();
    assert!(err.contains("concurrency_limit"));

    let err = DispatcherConfig::from_json_str("not json").unwrap_err();
    assert!(err.starts_with("parse error"));
}

#[test]
fn test_dispatcher_config_serde_roundtrip() {
    let cfg = DispatcherConfig::new()
        .with_capacity(7)
        .with_concurrency_limit(3)
        .with_bus_capacity(5);
    let json = serde_json::to_string(&cfg).unwrap();
    assert_eq!(DispatcherConfig::from_json_str(&json).unwrap(), cfg);
}

#[test]
fn test_dispatcher_config_from_lookup_unset_keeps_defaults() {
    let cfg = DispatcherConfig::from_lookup(|_| None).unwrap();
    assert_eq!(cfg, DispatcherConfig::default());
}
