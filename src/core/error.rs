//! Error types for dispatcher operations.

use thiserror::Error;

/// Errors produced by dispatcher components.
///
/// These describe misuse of the dispatcher itself. Failures of submitted
/// tasks never surface here; they travel to the tag's error bus as an
/// [`Outcome`](crate::core::Outcome).
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The task queue is at capacity (non-blocking submission only).
    #[error("task queue is full")]
    QueueFull,
    /// A control signal was issued before `run()`.
    #[error("dispatcher has not been started")]
    NotStarted,
    /// `run()` was called on a dispatcher whose loop is already live.
    #[error("dispatcher is already running")]
    AlreadyRunning,
    /// The dispatcher has been shut down.
    #[error("dispatcher has been shut down")]
    Shutdown,
    /// A bounded wait elapsed.
    #[error("operation timed out")]
    Timeout,
    /// Internal failure (thread spawn, runtime construction, join error).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;

/// Result produced by a single task execution.
pub type TaskResult = anyhow::Result<()>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduler_error_display() {
        assert_eq!(SchedulerError::QueueFull.to_string(), "task queue is full");
        assert_eq!(
            SchedulerError::InvalidConfig("capacity must be greater than 0".into()).to_string(),
            "invalid configuration: capacity must be greater than 0"
        );
        assert_eq!(SchedulerError::Shutdown.to_string(), "dispatcher has been shut down");
    }
}
