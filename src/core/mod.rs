//! Core dispatching abstractions: tasks, outcomes, error buses and the dispatcher.

pub mod control;
pub mod dispatcher;
pub mod error;
pub mod error_bus;
pub mod registry;
pub mod task;

pub use control::{ControlSignal, DispatcherState};
pub use dispatcher::{Dispatcher, DispatcherStats};
pub use error::{AppResult, SchedulerError, TaskResult};
pub use error_bus::{ErrorBus, ErrorBusHandle, Outcome, DEFAULT_BUS_CAPACITY};
pub use registry::BusRegistry;
pub use task::{BoxedTask, FnTask, Task, TaskMetadata};
