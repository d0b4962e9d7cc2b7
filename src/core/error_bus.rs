//! Tag-scoped outcome channel.
//!
//! Every tag gets exactly one [`ErrorBus`]. Workers publish an [`Outcome`]
//! per finished task; callers drain the bus with [`ErrorBus::next`] or one of
//! its bounded/async variants.
//!
//! # Design
//!
//! - Bounded FIFO behind a `parking_lot::Mutex`, with two condvars
//!   (`not_empty` for consumers, `not_full` for producers) and a
//!   `tokio::sync::Notify` for async consumers. No polling.
//! - Competing consumers: concurrent observers each receive a disjoint subset.
//! - Room can be reserved ahead of time. The dispatcher reserves a place for
//!   every task it admits, so workers publish without ever blocking and a
//!   full bus only holds back tasks of its own tag.
//! - Async waits are cancel-safe: an outcome is only removed by a waiter
//!   that returns it.

use std::collections::VecDeque;
use std::fmt;
use std::pin::pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tokio::sync::Notify;

use super::SchedulerError;

/// Default number of outcomes a bus buffers before producers block.
pub const DEFAULT_BUS_CAPACITY: usize = 100;

/// Shared handle to a tag's error bus.
pub type ErrorBusHandle = Arc<ErrorBus>;

/// Result of one task execution.
#[derive(Debug)]
pub struct Outcome {
    /// Identifier of the task that produced this outcome.
    pub identifier: String,
    /// Failure reported by the task; `None` on success.
    pub error: Option<anyhow::Error>,
}

impl Outcome {
    /// Successful outcome for `identifier`.
    pub fn success(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            error: None,
        }
    }

    /// Failed outcome for `identifier`.
    pub fn failure(identifier: impl Into<String>, error: anyhow::Error) -> Self {
        Self {
            identifier: identifier.into(),
            error: Some(error),
        }
    }

    /// Whether the task succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error {
            None => write!(f, "{}: ok", self.identifier),
            Some(err) => write!(f, "{}: {err:#}", self.identifier),
        }
    }
}

/// Buffered outcomes plus places promised to admitted tasks.
#[derive(Debug, Default)]
struct BusState {
    queue: VecDeque<Outcome>,
    reserved: usize,
}

impl BusState {
    fn occupied(&self) -> usize {
        self.queue.len() + self.reserved
    }
}

/// Bounded, blocking outcome channel for a single tag.
pub struct ErrorBus {
    tag: String,
    capacity: usize,
    state: Mutex<BusState>,
    not_empty: Condvar,
    not_full: Condvar,
    arrived: Notify,
}

impl ErrorBus {
    /// Create a bus with [`DEFAULT_BUS_CAPACITY`].
    pub fn new(tag: impl Into<String>) -> Self {
        Self::with_capacity(tag, DEFAULT_BUS_CAPACITY)
    }

    /// Create a bus buffering at most `capacity` outcomes (minimum 1).
    pub fn with_capacity(tag: impl Into<String>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            tag: tag.into(),
            capacity,
            state: Mutex::new(BusState {
                queue: VecDeque::with_capacity(capacity.min(1024)),
                reserved: 0,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            arrived: Notify::new(),
        }
    }

    /// Tag this bus collects outcomes for.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Maximum number of buffered outcomes.
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of outcomes currently buffered.
    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Whether no outcome is buffered.
    pub fn is_empty(&self) -> bool {
        self.state.lock().queue.is_empty()
    }

    /// Whether buffered outcomes and outstanding reservations fill the bus.
    pub fn is_full(&self) -> bool {
        self.state.lock().occupied() >= self.capacity
    }

    /// Publish an outcome, blocking while the bus is full.
    pub fn add(&self, outcome: Outcome) {
        let mut state = self.state.lock();
        while state.occupied() >= self.capacity {
            self.not_full.wait(&mut state);
        }
        state.queue.push_back(outcome);
        drop(state);
        self.notify_arrival();
    }

    /// Reserve room for one future outcome. Returns `false` if the bus is full.
    pub(crate) fn try_reserve(&self) -> bool {
        let mut state = self.state.lock();
        if state.occupied() >= self.capacity {
            return false;
        }
        state.reserved += 1;
        true
    }

    /// Give back a reservation that will never be published.
    pub(crate) fn cancel_reservation(&self) {
        let mut state = self.state.lock();
        state.reserved = state.reserved.saturating_sub(1);
        drop(state);
        self.not_full.notify_one();
    }

    /// Publish into a previously reserved place. Never blocks.
    pub(crate) fn publish_reserved(&self, outcome: Outcome) {
        let mut state = self.state.lock();
        state.reserved = state.reserved.saturating_sub(1);
        state.queue.push_back(outcome);
        drop(state);
        self.notify_arrival();
    }

    /// Take the oldest outcome, blocking until one is available.
    pub fn next(&self) -> Outcome {
        let mut state = self.state.lock();
        loop {
            if let Some(outcome) = state.queue.pop_front() {
                drop(state);
                self.not_full.notify_one();
                return outcome;
            }
            self.not_empty.wait(&mut state);
        }
    }

    /// Take the oldest outcome if one is buffered.
    pub fn try_next(&self) -> Option<Outcome> {
        let outcome = self.state.lock().queue.pop_front()?;
        self.not_full.notify_one();
        Some(outcome)
    }

    /// Take the oldest outcome, waiting at most `timeout`.
    pub fn next_timeout(&self, timeout: Duration) -> Option<Outcome> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if let Some(outcome) = state.queue.pop_front() {
                drop(state);
                self.not_full.notify_one();
                return Some(outcome);
            }
            if self.not_empty.wait_until(&mut state, deadline).timed_out() {
                let outcome = state.queue.pop_front();
                if outcome.is_some() {
                    drop(state);
                    self.not_full.notify_one();
                }
                return outcome;
            }
        }
    }

    /// Await the next outcome from async code.
    ///
    /// Cancel-safe: dropping the future before it completes never consumes
    /// an outcome.
    pub async fn next_async(&self) -> Outcome {
        loop {
            let mut notified = pin!(self.arrived.notified());
            // Register before checking so an arrival in between is not missed.
            notified.as_mut().enable();
            if let Some(outcome) = self.try_next() {
                return outcome;
            }
            notified.await;
        }
    }

    /// Await the next outcome from async code, waiting at most `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::Timeout` if nothing arrived in time.
    pub async fn next_async_timeout(&self, timeout: Duration) -> Result<Outcome, SchedulerError> {
        tokio::time::timeout(timeout, self.next_async())
            .await
            .map_err(|_| SchedulerError::Timeout)
    }

    fn notify_arrival(&self) {
        self.not_empty.notify_one();
        self.arrived.notify_waiters();
    }
}

impl fmt::Debug for ErrorBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorBus")
            .field("tag", &self.tag)
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}
