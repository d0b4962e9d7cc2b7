//! Execution workers.
//!
//! A fixed pool of OS threads, one per concurrency slot. Each worker owns a
//! single-threaded tokio runtime that drives one task's `execute` future to
//! completion at a time, so CPU-bound or blocking task bodies never stall the
//! caller's runtime.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use tokio::runtime::Runtime;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::core::{BoxedTask, BusRegistry, Outcome, SchedulerError, Task, TaskResult};

use super::DispatchCounters;

/// Shared state every worker needs.
pub(crate) struct WorkerContext {
    pub dispatcher_id: Uuid,
    /// Rendezvous hand-off from the dispatch loop.
    pub admit_rx: Receiver<BoxedTask>,
    /// Returns a concurrency slot once the outcome is published.
    pub slot_tx: Sender<()>,
    pub registry: Arc<BusRegistry>,
    pub counters: Arc<DispatchCounters>,
}

/// Spawn a worker thread.
pub(crate) fn spawn_worker(
    worker_id: usize,
    ctx: WorkerContext,
    stack_size: usize,
) -> Result<JoinHandle<()>, SchedulerError> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| SchedulerError::Internal(format!("failed to build worker runtime: {e}")))?;

    thread::Builder::new()
        .name(format!("dispatch-worker-{worker_id}"))
        .stack_size(stack_size)
        .spawn(move || worker_loop(worker_id, &ctx, &rt))
        .map_err(|e| SchedulerError::Internal(format!("failed to spawn worker thread: {e}")))
}

fn worker_loop(worker_id: usize, ctx: &WorkerContext, rt: &Runtime) {
    debug!(dispatcher_id = %ctx.dispatcher_id, worker_id = worker_id, "Worker thread started");

    // The loop drops its sender on exit, which ends this loop once idle.
    while let Ok(task) = ctx.admit_rx.recv() {
        ctx.counters.running.fetch_add(1, Ordering::AcqRel);
        ctx.counters.waiting.fetch_sub(1, Ordering::AcqRel);

        debug!(
            worker_id = worker_id,
            tag = task.tag(),
            identifier = task.identifier(),
            "Worker executing task"
        );

        let result = run_task(rt, task.as_ref());

        ctx.counters.running.fetch_sub(1, Ordering::AcqRel);
        if result.is_ok() {
            ctx.counters.succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            ctx.counters.failed.fetch_add(1, Ordering::Relaxed);
        }

        publish(worker_id, ctx, task.as_ref(), result);

        // Fails only once the dispatch loop has exited.
        let _ = ctx.slot_tx.send(());
    }

    debug!(dispatcher_id = %ctx.dispatcher_id, worker_id = worker_id, "Worker thread exiting");
}

fn run_task(rt: &Runtime, task: &dyn Task) -> TaskResult {
    match panic::catch_unwind(AssertUnwindSafe(|| rt.block_on(task.execute()))) {
        Ok(result) => result,
        Err(payload) => {
            warn!(
                tag = task.tag(),
                identifier = task.identifier(),
                "Task panicked"
            );
            Err(anyhow::anyhow!("task panicked: {}", panic_message(payload.as_ref())))
        }
    }
}

fn publish(worker_id: usize, ctx: &WorkerContext, task: &dyn Task, result: TaskResult) {
    let outcome = Outcome {
        identifier: task.identifier().to_owned(),
        error: result.err(),
    };

    // The dispatch loop reserved this place on admission, so this never blocks.
    match ctx.registry.get(task.tag()) {
        Some(bus) => bus.publish_reserved(outcome),
        None => warn!(
            worker_id = worker_id,
            tag = task.tag(),
            identifier = task.identifier(),
            "No error bus for tag, outcome dropped"
        ),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
