//! Tests for error types

use prometheus_dispatch::core::SchedulerError;

#[test]
fn test_scheduler_error_display() {
    assert_eq!(SchedulerError::QueueFull.to_string(), "task queue is full");
    assert_eq!(
        SchedulerError::NotStarted.to_string(),
        "dispatcher has not been started"
    );
    assert_eq!(
        SchedulerError::AlreadyRunning.to_string(),
        "dispatcher is already running"
    );
    assert_eq!(
        SchedulerError::Shutdown.to_string(),
        "dispatcher has been shut down"
    );
    assert_eq!(SchedulerError::Timeout.to_string(), "operation timed out");
}

#[test]
fn test_scheduler_error_with_message() {
    let err = SchedulerError::InvalidConfig("capacity must be greater than 0".into());
    assert_eq!(
        err.to_string(),
        "invalid configuration: capacity must be greater than 0"
    );

    let err = SchedulerError::Internal("worker gone".into());
    assert_eq!(err.to_string(), "internal error: worker gone");
}

#[test]
fn test_scheduler_error_into_anyhow() {
    let err: anyhow::Error = SchedulerError::QueueFull.into();
    assert!(err.downcast_ref::<SchedulerError>().is_some());
}
