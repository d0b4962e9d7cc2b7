//! Fluent construction of a [`Dispatcher`].

use std::time::Duration;

use crate::config::DispatcherConfig;
use crate::core::{Dispatcher, SchedulerError};

/// Builder for [`Dispatcher`], starting from defaults or a loaded config.
///
/// ```rust,ignore
/// let dispatcher = DispatcherBuilder::new()
///     .capacity(100)
///     .concurrency_limit(10)
///     .build()?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct DispatcherBuilder {
    config: DispatcherConfig,
}

impl DispatcherBuilder {
    /// Start from [`DispatcherConfig::default`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration.
    #[must_use]
    pub const fn from_config(config: DispatcherConfig) -> Self {
        Self { config }
    }

    /// Start from `DISPATCHER_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::InvalidConfig` if a variable fails to parse
    /// or the result is invalid.
    pub fn from_env() -> Result<Self, SchedulerError> {
        DispatcherConfig::from_env()
            .map(Self::from_config)
            .map_err(SchedulerError::InvalidConfig)
    }

    /// Task queue bound.
    #[must_use]
    pub const fn capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = capacity;
        self
    }

    /// Concurrency cap.
    #[must_use]
    pub const fn concurrency_limit(mut self, limit: usize) -> Self {
        self.config.concurrency_limit = limit;
        self
    }

    /// Per-tag error bus capacity.
    #[must_use]
    pub const fn bus_capacity(mut self, capacity: usize) -> Self {
        self.config.bus_capacity = capacity;
        self
    }

    /// Dispatch loop idle tick.
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config = self.config.with_poll_interval(interval);
        self
    }

    /// Worker thread stack size.
    #[must_use]
    pub const fn thread_stack_size(mut self, bytes: usize) -> Self {
        self.config.thread_stack_size = bytes;
        self
    }

    /// Configuration built so far.
    pub const fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Validate the configuration and construct the dispatcher.
    ///
    /// # Errors
    ///
    /// Same as [`Dispatcher::with_config`].
    pub fn build(self) -> Result<Dispatcher, SchedulerError> {
        Dispatcher::with_config(self.config)
    }
}
