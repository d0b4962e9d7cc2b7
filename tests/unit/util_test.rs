//! Tests for utility functions

use prometheus_dispatch::util::{init_test_tracing, init_tracing, DEFAULT_LOG_FILTER};

#[test]
fn test_default_log_filter_targets_crate() {
    assert!(DEFAULT_LOG_FILTER.starts_with("prometheus_dispatch"));
}

#[test]
fn test_tracing_init_is_idempotent() {
    init_test_tracing();
    init_test_tracing();
    init_tracing();
    tracing::info!("subscriber installed once");
}
