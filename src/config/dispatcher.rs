//! Dispatcher configuration.

use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::DEFAULT_BUS_CAPACITY;

/// Default task queue bound.
pub const DEFAULT_CAPACITY: usize = 1024;
/// Default dispatch loop idle tick in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;
/// Default worker thread stack size (2 MiB).
pub const DEFAULT_THREAD_STACK_SIZE: usize = 2 * 1024 * 1024;

/// Configuration for a [`Dispatcher`](crate::core::Dispatcher).
///
/// Missing fields take their defaults when deserialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Maximum queued tasks before submission blocks.
    pub capacity: usize,
    /// Maximum simultaneously executing tasks, across all tags.
    pub concurrency_limit: usize,
    /// Outcomes each tag's error bus buffers before workers block.
    pub bus_capacity: usize,
    /// Idle tick of the dispatch loop, in milliseconds.
    pub poll_interval_ms: u64,
    /// Stack size of each worker thread, in bytes.
    pub thread_stack_size: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            concurrency_limit: num_cpus::get(),
            bus_capacity: DEFAULT_BUS_CAPACITY,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            thread_stack_size: DEFAULT_THREAD_STACK_SIZE,
        }
    }
}

impl DispatcherConfig {
    /// Default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the task queue bound.
    #[must_use]
    pub const fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the concurrency cap.
    #[must_use]
    pub const fn with_concurrency_limit(mut self, concurrency_limit: usize) -> Self {
        self.concurrency_limit = concurrency_limit;
        self
    }

    /// Set the per-tag error bus capacity.
    #[must_use]
    pub const fn with_bus_capacity(mut self, bus_capacity: usize) -> Self {
        self.bus_capacity = bus_capacity;
        self
    }

    /// Set the dispatch loop idle tick.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the worker thread stack size.
    #[must_use]
    pub const fn with_thread_stack_size(mut self, bytes: usize) -> Self {
        self.thread_stack_size = bytes;
        self
    }

    /// Dispatch loop idle tick.
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.capacity == 0 {
            return Err("capacity must be greater than 0".into());
        }
        if self.concurrency_limit == 0 {
            return Err("concurrency_limit must be greater than 0".into());
        }
        if self.bus_capacity == 0 {
            return Err("bus_capacity must be greater than 0".into());
        }
        if self.poll_interval_ms == 0 {
            return Err("poll_interval_ms must be greater than 0".into());
        }
        if self.thread_stack_size == 0 {
            return Err("thread_stack_size must be greater than 0".into());
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation message.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load configuration from `DISPATCHER_*` environment variables, reading
    /// a `.env` file first if one is present. Unset variables keep defaults.
    ///
    /// | variable | field |
    /// |---|---|
    /// | `DISPATCHER_CAPACITY` | `capacity` |
    /// | `DISPATCHER_CONCURRENCY_LIMIT` | `concurrency_limit` |
    /// | `DISPATCHER_BUS_CAPACITY` | `bus_capacity` |
    /// | `DISPATCHER_POLL_INTERVAL_MS` | `poll_interval_ms` |
    /// | `DISPATCHER_THREAD_STACK_SIZE` | `thread_stack_size` |
    ///
    /// # Errors
    ///
    /// Returns a message naming the variable that failed to parse, or a
    /// validation message.
    pub fn from_env() -> Result<Self, String> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup (same keys as
    /// [`DispatcherConfig::from_env`]).
    ///
    /// # Errors
    ///
    /// Returns a message naming the key that failed to parse, or a
    /// validation message.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(v) = parse_key(&lookup, "DISPATCHER_CAPACITY")? {
            cfg.capacity = v;
        }
        if let Some(v) = parse_key(&lookup, "DISPATCHER_CONCURRENCY_LIMIT")? {
            cfg.concurrency_limit = v;
        }
        if let Some(v) = parse_key(&lookup, "DISPATCHER_BUS_CAPACITY")? {
            cfg.bus_capacity = v;
        }
        if let Some(v) = parse_key(&lookup, "DISPATCHER_POLL_INTERVAL_MS")? {
            cfg.poll_interval_ms = v;
        }
        if let Some(v) = parse_key(&lookup, "DISPATCHER_THREAD_STACK_SIZE")? {
            cfg.thread_stack_size = v;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

fn parse_key<T, F>(lookup: &F, key: &str) -> Result<Option<T>, String>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| raw.trim().parse::<T>().map_err(|e| format!("{key}: {e}")))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_is_valid() {
        let cfg = DispatcherConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.bus_capacity, 100);
        assert_eq!(cfg.poll_interval(), Duration::from_millis(50));
        assert!(cfg.concurrency_limit >= 1);
    }

    #[test]
    fn test_from_lookup_overrides() {
        let vars: HashMap<&str, &str> = [
            ("DISPATCHER_CAPACITY", "100"),
            ("DISPATCHER_CONCURRENCY_LIMIT", " 10 "),
        ]
        .into_iter()
        .collect();

        let cfg = DispatcherConfig::from_lookup(|k| vars.get(k).map(|v| (*v).to_string())).unwrap();
        assert_eq!(cfg.capacity, 100);
        assert_eq!(cfg.concurrency_limit, 10);
        assert_eq!(cfg.bus_capacity, DEFAULT_BUS_CAPACITY);
    }

    #[test]
    fn test_from_lookup_reports_bad_value() {
        let err = DispatcherConfig::from_lookup(|k| {
            (k == "DISPATCHER_BUS_CAPACITY").then(|| "lots".to_string())
        })
        .unwrap_err();
        assert!(err.starts_with("DISPATCHER_BUS_CAPACITY:"));
    }

    #[test]
    fn test_with_poll_interval() {
        let cfg = DispatcherConfig::new().with_poll_interval(Duration::from_millis(5));
        assert_eq!(cfg.poll_interval_ms, 5);
    }
}
