//! # Prometheus Dispatch
//!
//! A bounded-concurrency task dispatcher for in-process background work.
//!
//! Callers submit tasks tagged by category. The dispatcher queues them in a
//! bounded FIFO, executes at most `concurrency_limit` at a time across all
//! tags, and publishes one [`Outcome`](core::Outcome) per task to that tag's
//! [`ErrorBus`](core::ErrorBus). Each tag's outcomes can be drained
//! independently, so one category's failures never interleave with another's.
//!
//! ## Key Features
//!
//! - **Backpressure by blocking**: a full queue blocks the submitter; a full
//!   error bus holds back only further tasks of that tag, other tags keep
//!   running
//! - **Hard concurrency cap**: a fixed pool of worker threads gated by slot
//!   tokens, never more executions than the cap
//! - **Pause / restart / shutdown**: each control call returns once the
//!   dispatch loop has applied it; queued work survives a pause
//! - **Per-tag observation**: outcomes are attributed by task identifier and
//!   delivered in completion order
//!
//! ## Example
//!
//! ```rust,ignore
//! use prometheus_dispatch::core::Dispatcher;
//!
//! let dispatcher = Dispatcher::new(100, 10)?;
//! let bus = dispatcher.submit_func(|| { println!("1"); Ok(()) }, "print", "print-1")?;
//!
//! std::thread::spawn(move || loop {
//!     let outcome = bus.next();
//!     println!("{outcome}");
//! });
//!
//! dispatcher.run()?;
//! dispatcher.pause()?;
//! dispatcher.submit_func(|| Ok(()), "print", "print-2")?;
//! dispatcher.restart()?;
//! ```
//!
//! Custom tasks implement [`Task`](core::Task); see `tests/dispatcher_test.rs`
//! for end-to-end scenarios.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Tasks, outcomes, error buses and the dispatcher.
pub mod core;
/// Configuration models for dispatchers.
pub mod config;
/// Builders to construct dispatchers from configuration.
pub mod builders;
/// Shared utilities.
pub mod util;

pub use crate::builders::DispatcherBuilder;
pub use crate::config::DispatcherConfig;
pub use crate::core::{
    Dispatcher, DispatcherState, ErrorBus, ErrorBusHandle, FnTask, Outcome, SchedulerError, Task,
    TaskResult,
};
