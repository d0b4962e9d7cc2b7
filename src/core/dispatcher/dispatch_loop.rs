//! The dispatch loop: one dedicated thread moving tasks from the submission
//! queue to idle workers.
//!
//! While running, the loop first takes a concurrency slot, then a task. Before
//! handing the task to a worker it reserves room for the outcome on the task's
//! error bus. A task whose bus is full is set aside per tag and admitted once
//! its bus drains, so an unobserved tag never occupies workers that other
//! tags could use. Every wait also listens on the control channel, so
//! pause/restart/shutdown are observed promptly even when all workers are
//! busy or the queue is empty.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{select, Receiver, RecvError, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, info, trace};
use uuid::Uuid;

use crate::core::control::Command;
use crate::core::{BoxedTask, BusRegistry, DispatcherState, SchedulerError};

use super::DispatchCounters;

/// Channel ends and shared state owned by the dispatch loop once it starts.
pub(crate) struct LoopParts {
    /// Submission queue (consumer side).
    pub task_rx: Receiver<BoxedTask>,
    /// Control signals.
    pub control_rx: Receiver<Command>,
    /// Rendezvous hand-off to idle workers.
    pub admit_tx: Sender<BoxedTask>,
    /// Concurrency slots released by workers.
    pub slot_rx: Receiver<()>,
    pub registry: Arc<BusRegistry>,
    pub counters: Arc<DispatchCounters>,
    /// Most tasks held back for full buses before the loop stops dequeuing.
    pub defer_limit: usize,
}

enum Step {
    Continue,
    Exit,
}

/// Tasks dequeued while their tag's bus had no room, in FIFO order per tag.
struct Deferred {
    by_tag: HashMap<String, VecDeque<BoxedTask>>,
    len: usize,
    limit: usize,
}

impl Deferred {
    fn new(limit: usize) -> Self {
        Self {
            by_tag: HashMap::new(),
            len: 0,
            limit,
        }
    }

    const fn is_full(&self) -> bool {
        self.len >= self.limit
    }

    fn holds_tag(&self, tag: &str) -> bool {
        self.by_tag.contains_key(tag)
    }

    fn push(&mut self, task: BoxedTask) {
        self.by_tag
            .entry(task.tag().to_owned())
            .or_default()
            .push_back(task);
        self.len += 1;
    }

    /// Oldest held task of some tag whose bus has room again, with that room
    /// already reserved.
    fn take_ready(&mut self, registry: &BusRegistry) -> Option<BoxedTask> {
        let tag = self
            .by_tag
            .keys()
            .find(|tag| registry.get_or_create(tag).try_reserve())?
            .clone();

        let queue = self.by_tag.get_mut(&tag)?;
        let task = queue.pop_front();
        if queue.is_empty() {
            self.by_tag.remove(&tag);
        }
        if task.is_some() {
            self.len -= 1;
        }
        task
    }
}

struct DispatchLoop {
    dispatcher_id: Uuid,
    parts: LoopParts,
    state: Arc<Mutex<DispatcherState>>,
    tick: Duration,
}

/// Spawn the dispatch loop thread.
pub(crate) fn spawn_dispatch_loop(
    dispatcher_id: Uuid,
    parts: LoopParts,
    state: Arc<Mutex<DispatcherState>>,
    tick: Duration,
) -> Result<JoinHandle<()>, SchedulerError> {
    let dispatch_loop = DispatchLoop {
        dispatcher_id,
        parts,
        state,
        tick,
    };

    thread::Builder::new()
        .name(format!("dispatch-{}", dispatcher_id.simple()))
        .spawn(move || dispatch_loop.run())
        .map_err(|e| SchedulerError::Internal(format!("failed to spawn dispatch loop: {e}")))
}

impl DispatchLoop {
    fn run(self) {
        debug!(dispatcher_id = %self.dispatcher_id, "Dispatch loop started");

        // Whether this loop currently holds a concurrency slot it has not yet
        // spent on a task. A held slot survives pause/restart.
        let mut slot_held = false;
        let mut deferred = Deferred::new(self.parts.defer_limit);

        loop {
            let current = *self.state.lock();
            let step = match current {
                DispatcherState::Running => self.step_running(&mut slot_held, &mut deferred),
                DispatcherState::Paused => self.handle_command(self.parts.control_rx.recv()),
                DispatcherState::Idle | DispatcherState::Shutdown => Step::Exit,
            };
            if matches!(step, Step::Exit) {
                break;
            }
        }

        *self.state.lock() = DispatcherState::Shutdown;
        info!(
            dispatcher_id = %self.dispatcher_id,
            abandoned = self.parts.task_rx.len() + deferred.len,
            "Dispatch loop exited"
        );
    }

    fn step_running(&self, slot_held: &mut bool, deferred: &mut Deferred) -> Step {
        let parts = &self.parts;

        if !*slot_held {
            let early = select! {
                recv(parts.control_rx) -> cmd => Some(self.handle_command(cmd)),
                recv(parts.slot_rx) -> slot => match slot {
                    Ok(()) => {
                        *slot_held = true;
                        None
                    }
                    Err(_) => {
                        error!(dispatcher_id = %self.dispatcher_id, "Slot channel closed");
                        Some(Step::Exit)
                    }
                },
                default(self.tick) => {
                    trace!(dispatcher_id = %self.dispatcher_id, "All workers busy");
                    Some(Step::Continue)
                }
            };
            if let Some(step) = early {
                return step;
            }
        }

        if let Some(task) = deferred.take_ready(&parts.registry) {
            parts.counters.deferred.fetch_sub(1, Ordering::AcqRel);
            return self.admit(task, slot_held);
        }

        if deferred.is_full() {
            // Stop dequeuing until some held-back tag drains.
            return select! {
                recv(parts.control_rx) -> cmd => self.handle_command(cmd),
                default(self.tick) => {
                    trace!(dispatcher_id = %self.dispatcher_id, held = deferred.len, "Deferred tasks at limit");
                    Step::Continue
                }
            };
        }

        select! {
            recv(parts.control_rx) -> cmd => self.handle_command(cmd),
            recv(parts.task_rx) -> task => match task {
                Ok(task) => self.route(task, slot_held, deferred),
                Err(_) => {
                    debug!(dispatcher_id = %self.dispatcher_id, "Task queue closed");
                    Step::Exit
                }
            },
            default(self.tick) => {
                trace!(dispatcher_id = %self.dispatcher_id, "Task queue idle");
                Step::Continue
            }
        }
    }

    /// Admit `task` if its bus has room, otherwise hold it back behind any
    /// earlier tasks of the same tag.
    fn route(&self, task: BoxedTask, slot_held: &mut bool, deferred: &mut Deferred) -> Step {
        if !deferred.holds_tag(task.tag())
            && self.parts.registry.get_or_create(task.tag()).try_reserve()
        {
            return self.admit(task, slot_held);
        }

        debug!(
            dispatcher_id = %self.dispatcher_id,
            tag = task.tag(),
            identifier = task.identifier(),
            "Error bus full, deferring task"
        );
        deferred.push(task);
        self.parts.counters.deferred.fetch_add(1, Ordering::AcqRel);
        Step::Continue
    }

    fn handle_command(&self, cmd: Result<Command, RecvError>) -> Step {
        let Ok(Command { signal, ack }) = cmd else {
            debug!(dispatcher_id = %self.dispatcher_id, "Control channel closed");
            return Step::Exit;
        };

        let next = {
            let mut state = self.state.lock();
            *state = signal.apply(*state);
            *state
        };

        info!(
            dispatcher_id = %self.dispatcher_id,
            signal = ?signal,
            state = %next,
            "Control signal applied"
        );
        let _ = ack.send(next);

        if next == DispatcherState::Shutdown {
            Step::Exit
        } else {
            Step::Continue
        }
    }

    /// Hand a task with a reserved outcome place to an idle worker.
    fn admit(&self, task: BoxedTask, slot_held: &mut bool) -> Step {
        debug!(
            dispatcher_id = %self.dispatcher_id,
            tag = task.tag(),
            identifier = task.identifier(),
            "Admitting task"
        );

        // Blocks only until the idle worker backing our slot picks it up.
        if let Err(returned) = self.parts.admit_tx.send(task) {
            if let Some(bus) = self.parts.registry.get(returned.0.tag()) {
                bus.cancel_reservation();
            }
            error!(dispatcher_id = %self.dispatcher_id, "Worker pool is gone");
            return Step::Exit;
        }
        *slot_held = false;
        Step::Continue
    }
}
