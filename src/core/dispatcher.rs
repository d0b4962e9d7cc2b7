//! Bounded-concurrency dispatcher with per-tag error buses.
//!
//! # Key Features
//!
//! - **Bounded queue**: submission blocks while `capacity` tasks are waiting
//! - **Hard concurrency cap**: at most `concurrency_limit` tasks execute at once,
//!   across all tags
//! - **Pause/restart/shutdown**: control calls block until the dispatch loop
//!   has applied them
//! - **Per-tag outcomes**: every task yields exactly one [`Outcome`] on its
//!   tag's [`ErrorBus`](crate::core::ErrorBus)
//!
//! # Example
//!
//! ```rust,ignore
//! use prometheus_dispatch::core::Dispatcher;
//!
//! let dispatcher = Dispatcher::new(100, 10)?;
//! let bus = dispatcher.submit_func(|| { println!("1"); Ok(()) }, "print", "print-1")?;
//! dispatcher.run()?;
//!
//! let outcome = bus.next();
//! assert_eq!(outcome.identifier, "print-1");
//! ```

mod dispatch_loop;
mod worker;

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Sender, TrySendError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::DispatcherConfig;
use crate::core::control::Command;
use crate::core::{
    BoxedTask, BusRegistry, ControlSignal, DispatcherState, ErrorBusHandle, FnTask,
    SchedulerError, Task, TaskResult,
};

use dispatch_loop::{spawn_dispatch_loop, LoopParts};
use worker::{spawn_worker, WorkerContext};

/// Point-in-time view of a dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherStats {
    /// Control state.
    pub state: DispatcherState,
    /// Task queue bound.
    pub capacity: usize,
    /// Maximum simultaneous executions.
    pub concurrency_limit: usize,
    /// Tasks executing right now.
    pub running: u64,
    /// Tasks queued or admitted but not yet started.
    pub waiting: u64,
    /// Waiting tasks held back because their tag's error bus is full.
    pub deferred: u64,
    /// Tasks accepted into the queue.
    pub submitted: u64,
    /// Executions that returned `Ok`.
    pub succeeded: u64,
    /// Executions that returned an error or panicked.
    pub failed: u64,
    /// Number of tags with an error bus.
    pub tags: usize,
}

/// Live counters, updated only through atomic increments/decrements.
#[derive(Debug, Default)]
pub(crate) struct DispatchCounters {
    pub running: AtomicU64,
    /// Signed: a worker may decrement before the submitter's increment lands.
    pub waiting: AtomicI64,
    pub deferred: AtomicU64,
    pub submitted: AtomicU64,
    pub succeeded: AtomicU64,
    pub failed: AtomicU64,
}

/// Bounded-concurrency task dispatcher.
///
/// Owns the submission queue, the tag → bus registry, a dedicated dispatch
/// thread and `concurrency_limit` worker threads.
///
/// # Design
///
/// - **Structural cap**: a slot channel pre-filled with `concurrency_limit`
///   tokens; the loop needs a token to admit a task, a worker returns it
///   after publishing the outcome
/// - **Per-tag backpressure**: a task is admitted only once its tag's bus
///   has room for the outcome; otherwise it is held back while other tags
///   keep running
/// - **No polling for work**: the loop blocks on slot/task/control channels
///   together; the poll interval only bounds idle waits
/// - **Clean teardown**: dropping the dispatcher closes every channel, so
///   the loop and idle workers exit on their own
pub struct Dispatcher {
    id: Uuid,
    config: DispatcherConfig,
    task_tx: Sender<BoxedTask>,
    control_tx: Sender<Command>,
    registry: Arc<BusRegistry>,
    counters: Arc<DispatchCounters>,
    state: Arc<Mutex<DispatcherState>>,
    /// Channel ends handed to the loop on `run()`.
    loop_parts: Mutex<Option<LoopParts>>,
    dispatch_thread: Mutex<Option<JoinHandle<()>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Create a dispatcher whose queue holds `capacity` tasks and which runs
    /// at most `concurrency_limit` of them at once.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::InvalidConfig` if either bound is zero.
    pub fn new(capacity: usize, concurrency_limit: usize) -> Result<Self, SchedulerError> {
        Self::with_config(
            DispatcherConfig::default()
                .with_capacity(capacity)
                .with_concurrency_limit(concurrency_limit),
        )
    }

    /// Create a dispatcher from a full configuration.
    ///
    /// Worker threads are spawned immediately and idle until `run()`.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::InvalidConfig` if the configuration is invalid
    /// - `SchedulerError::Internal` if a worker thread or runtime cannot be created
    pub fn with_config(config: DispatcherConfig) -> Result<Self, SchedulerError> {
        config.validate().map_err(SchedulerError::InvalidConfig)?;

        let id = Uuid::new_v4();
        let (task_tx, task_rx) = bounded::<BoxedTask>(config.capacity);
        let (control_tx, control_rx) = bounded::<Command>(0);
        let (admit_tx, admit_rx) = bounded::<BoxedTask>(0);
        let (slot_tx, slot_rx) = bounded::<()>(config.concurrency_limit);
        for _ in 0..config.concurrency_limit {
            slot_tx
                .try_send(())
                .map_err(|e| SchedulerError::Internal(format!("slot init failed: {e}")))?;
        }

        let registry = Arc::new(BusRegistry::new(config.bus_capacity));
        let counters = Arc::new(DispatchCounters::default());

        let mut workers = Vec::with_capacity(config.concurrency_limit);
        for worker_id in 0..config.concurrency_limit {
            let ctx = WorkerContext {
                dispatcher_id: id,
                admit_rx: admit_rx.clone(),
                slot_tx: slot_tx.clone(),
                registry: Arc::clone(&registry),
                counters: Arc::clone(&counters),
            };
            workers.push(spawn_worker(worker_id, ctx, config.thread_stack_size)?);
        }

        let loop_parts = LoopParts {
            task_rx,
            control_rx,
            admit_tx,
            slot_rx,
            registry: Arc::clone(&registry),
            counters: Arc::clone(&counters),
            defer_limit: config.capacity,
        };

        info!(
            dispatcher_id = %id,
            capacity = config.capacity,
            concurrency_limit = config.concurrency_limit,
            bus_capacity = config.bus_capacity,
            "Dispatcher initialized"
        );

        Ok(Self {
            id,
            config,
            task_tx,
            control_tx,
            registry,
            counters,
            state: Arc::new(Mutex::new(DispatcherState::Idle)),
            loop_parts: Mutex::new(Some(loop_parts)),
            dispatch_thread: Mutex::new(None),
            workers: Mutex::new(workers),
        })
    }

    /// Unique id of this dispatcher, used in thread names and logs.
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Configuration this dispatcher was built with.
    pub const fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Current control state.
    pub fn state(&self) -> DispatcherState {
        *self.state.lock()
    }

    /// Submit a task, blocking while the queue is full.
    ///
    /// Returns the error bus for the task's tag, created on first use. The
    /// bus also carries outcomes of other tasks submitted under that tag.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::Shutdown` if the dispatcher has been shut down.
    pub fn submit<T: Task>(&self, task: T) -> Result<ErrorBusHandle, SchedulerError> {
        self.submit_boxed(Box::new(task))
    }

    /// Submit an already boxed task, blocking while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::Shutdown` if the dispatcher has been shut down.
    pub fn submit_boxed(&self, task: BoxedTask) -> Result<ErrorBusHandle, SchedulerError> {
        if self.state() == DispatcherState::Shutdown {
            return Err(SchedulerError::Shutdown);
        }

        let bus = self.registry.get_or_create(task.tag());
        debug!(
            dispatcher_id = %self.id,
            tag = task.tag(),
            identifier = task.identifier(),
            "Submitting task"
        );

        self.task_tx.send(task).map_err(|_| SchedulerError::Shutdown)?;
        self.record_enqueued();
        Ok(bus)
    }

    /// Wrap a plain function as a task and submit it.
    ///
    /// `tag` and `identifier` are free text; neither has to be unique.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::Shutdown` if the dispatcher has been shut down.
    pub fn submit_func<F>(
        &self,
        f: F,
        tag: impl Into<String>,
        identifier: impl Into<String>,
    ) -> Result<ErrorBusHandle, SchedulerError>
    where
        F: Fn() -> TaskResult + Send + Sync + 'static,
    {
        self.submit(FnTask::new(f, tag, identifier))
    }

    /// Submit without blocking.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::QueueFull` if the queue is at capacity; the task is dropped
    /// - `SchedulerError::Shutdown` if the dispatcher has been shut down
    pub fn try_submit<T: Task>(&self, task: T) -> Result<ErrorBusHandle, SchedulerError> {
        if self.state() == DispatcherState::Shutdown {
            return Err(SchedulerError::Shutdown);
        }

        let bus = self.registry.get_or_create(task.tag());
        match self.task_tx.try_send(Box::new(task)) {
            Ok(()) => {
                self.record_enqueued();
                Ok(bus)
            }
            Err(TrySendError::Full(_)) => {
                warn!(dispatcher_id = %self.id, tag = bus.tag(), "Dispatcher queue is full");
                Err(SchedulerError::QueueFull)
            }
            Err(TrySendError::Disconnected(_)) => Err(SchedulerError::Shutdown),
        }
    }

    /// Submit from async code.
    ///
    /// The potentially blocking enqueue runs on tokio's blocking pool.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::Shutdown` if the dispatcher has been shut down
    /// - `SchedulerError::Internal` if the blocking task fails to join
    pub async fn submit_async<T: Task>(
        self: &Arc<Self>,
        task: T,
    ) -> Result<ErrorBusHandle, SchedulerError> {
        let dispatcher = Arc::clone(self);
        tokio::task::spawn_blocking(move || dispatcher.submit(task))
            .await
            .map_err(|e| SchedulerError::Internal(format!("submission failed: {e}")))?
    }

    /// Start the dispatch loop.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::AlreadyRunning` if the loop was already started
    /// - `SchedulerError::Shutdown` if the dispatcher has been shut down
    /// - `SchedulerError::Internal` if the loop thread cannot be spawned
    pub fn run(&self) -> Result<(), SchedulerError> {
        let mut loop_parts = self.loop_parts.lock();
        let Some(parts) = loop_parts.take() else {
            return Err(if self.state() == DispatcherState::Shutdown {
                SchedulerError::Shutdown
            } else {
                SchedulerError::AlreadyRunning
            });
        };

        *self.state.lock() = DispatcherState::Running;
        let handle = match spawn_dispatch_loop(
            self.id,
            parts,
            Arc::clone(&self.state),
            self.config.poll_interval(),
        ) {
            Ok(handle) => handle,
            Err(e) => {
                *self.state.lock() = DispatcherState::Shutdown;
                return Err(e);
            }
        };
        *self.dispatch_thread.lock() = Some(handle);

        info!(dispatcher_id = %self.id, "Dispatcher running");
        Ok(())
    }

    /// Stop pulling new tasks. Tasks already executing run to completion.
    ///
    /// Blocks until the dispatch loop has paused. A no-op when already paused
    /// or shut down.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::NotStarted` if `run()` was never called.
    pub fn pause(&self) -> Result<(), SchedulerError> {
        self.signal(ControlSignal::Pause)
    }

    /// Resume pulling tasks after `pause()`.
    ///
    /// Blocks until the dispatch loop is running again. A no-op when already
    /// running or shut down.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::NotStarted` if `run()` was never called.
    pub fn restart(&self) -> Result<(), SchedulerError> {
        self.signal(ControlSignal::Restart)
    }

    /// Stop the dispatch loop for good.
    ///
    /// Queued tasks are never dequeued afterwards; executing tasks still
    /// complete and publish their outcomes. Blocks until the loop has
    /// observed the signal. On a dispatcher that was never started this moves
    /// straight to `Shutdown`.
    ///
    /// # Errors
    ///
    /// Currently infallible; the `Result` matches the other control calls.
    pub fn shutdown(&self) -> Result<(), SchedulerError> {
        self.signal(ControlSignal::Shutdown)
    }

    fn signal(&self, signal: ControlSignal) -> Result<(), SchedulerError> {
        match self.state() {
            DispatcherState::Shutdown => {
                debug!(dispatcher_id = %self.id, signal = ?signal, "Dispatcher shut down, signal ignored");
                return Ok(());
            }
            DispatcherState::Idle => {
                if signal != ControlSignal::Shutdown {
                    return Err(SchedulerError::NotStarted);
                }
                if self.shutdown_idle() {
                    return Ok(());
                }
            }
            DispatcherState::Running | DispatcherState::Paused => {}
        }

        let (ack_tx, ack_rx) = bounded(1);
        if self
            .control_tx
            .send(Command {
                signal,
                ack: ack_tx,
            })
            .is_err()
        {
            debug!(dispatcher_id = %self.id, signal = ?signal, "Dispatch loop gone, signal ignored");
            return Ok(());
        }

        match ack_rx.recv() {
            Ok(state) => debug!(dispatcher_id = %self.id, signal = ?signal, state = %state, "Signal acknowledged"),
            Err(_) => debug!(dispatcher_id = %self.id, signal = ?signal, "Dispatch loop exited before acknowledging"),
        }
        Ok(())
    }

    /// Shut down a dispatcher whose loop never started. Returns `false` if
    /// `run()` won the race and the loop must be signalled instead.
    fn shutdown_idle(&self) -> bool {
        let mut loop_parts = self.loop_parts.lock();
        let Some(parts) = loop_parts.take() else {
            return false;
        };
        *self.state.lock() = DispatcherState::Shutdown;
        drop(parts);
        info!(dispatcher_id = %self.id, "Dispatcher shut down before running");
        true
    }

    /// Wait for the dispatch thread and all workers to exit.
    ///
    /// Only meaningful after `shutdown()`: workers finish their in-flight
    /// tasks (including publishing outcomes) and then exit. Threads still
    /// alive at the deadline are detached.
    ///
    /// Returns `true` if every thread exited in time.
    pub fn await_termination(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;

        let mut handles = Vec::new();
        if let Some(handle) = self.dispatch_thread.lock().take() {
            handles.push(("dispatch".to_string(), handle));
        }
        handles.extend(
            self.workers
                .lock()
                .drain(..)
                .enumerate()
                .map(|(idx, handle)| (format!("worker-{idx}"), handle)),
        );

        let mut all_exited = true;
        for (name, handle) in handles {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if !join_with_timeout(&name, handle, remaining) {
                all_exited = false;
            }
        }

        info!(dispatcher_id = %self.id, all_exited = all_exited, "Dispatcher termination awaited");
        all_exited
    }

    /// Error bus for `tag`, if any task has been submitted under it.
    pub fn error_bus(&self, tag: &str) -> Option<ErrorBusHandle> {
        self.registry.get(tag)
    }

    /// Tags that have an error bus.
    pub fn tags(&self) -> Vec<String> {
        self.registry.tags()
    }

    /// Tasks executing right now.
    pub fn running(&self) -> u64 {
        self.counters.running.load(Ordering::Acquire)
    }

    /// Tasks queued or admitted but not yet started.
    pub fn waiting(&self) -> u64 {
        u64::try_from(self.counters.waiting.load(Ordering::Acquire)).unwrap_or(0)
    }

    /// Waiting tasks held back until their tag's error bus has room.
    pub fn deferred(&self) -> u64 {
        self.counters.deferred.load(Ordering::Acquire)
    }

    /// Snapshot of state and counters.
    #[must_use]
    pub fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            state: self.state(),
            capacity: self.config.capacity,
            concurrency_limit: self.config.concurrency_limit,
            running: self.running(),
            waiting: self.waiting(),
            deferred: self.deferred(),
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            succeeded: self.counters.succeeded.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            tags: self.registry.len(),
        }
    }

    fn record_enqueued(&self) {
        self.counters.waiting.fetch_add(1, Ordering::AcqRel);
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        // Channels close as the fields drop; the loop and idle workers exit on
        // their own. Nothing is joined here.
        if self.state() != DispatcherState::Shutdown {
            debug!(
                dispatcher_id = %self.id,
                "Dispatcher dropped without explicit shutdown - threads will be detached"
            );
        }
    }
}

/// Join `handle` on a helper thread, giving up after `timeout`.
fn join_with_timeout(name: &str, handle: JoinHandle<()>, timeout: Duration) -> bool {
    let (tx, rx) = bounded(1);
    let joiner = thread::spawn(move || {
        let _ = tx.send(handle.join().is_ok());
    });

    match rx.recv_timeout(timeout) {
        Ok(true) => {
            let _ = joiner.join();
            debug!(thread = name, "Thread joined");
            true
        }
        Ok(false) => {
            let _ = joiner.join();
            warn!(thread = name, "Thread panicked");
            true
        }
        Err(_) => {
            warn!(thread = name, "Thread did not exit within timeout - detaching");
            false
        }
    }
}
