//! Task abstraction and the function-backed task wrapper.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::TaskResult;

/// A unit of work the dispatcher can run.
///
/// The dispatcher calls [`Task::execute`] exactly once, on a dedicated worker
/// thread that drives the returned future to completion before taking more
/// work. Accounting against the concurrency cap is only correct for tasks
/// whose work lives inside that future: anything spawned elsewhere (a
/// detached thread, `tokio::spawn` onto another runtime) is not tracked.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use prometheus_dispatch::core::{Task, TaskResult};
///
/// struct Vacuum {
///     table: String,
/// }
///
/// #[async_trait]
/// impl Task for Vacuum {
///     async fn execute(&self) -> TaskResult {
///         vacuum_table(&self.table)?;
///         Ok(())
///     }
///
///     fn identifier(&self) -> &str {
///         &self.table
///     }
///
///     fn tag(&self) -> &str {
///         "maintenance"
///     }
/// }
/// ```
#[async_trait]
pub trait Task: Send + Sync + 'static {
    /// Run the task to completion.
    async fn execute(&self) -> TaskResult;

    /// Identifier attributed to this task's outcome. Not required to be unique.
    fn identifier(&self) -> &str;

    /// Tag selecting the error bus this task's outcome is published to.
    fn tag(&self) -> &str;
}

/// Boxed task as stored in the dispatcher queue.
pub type BoxedTask = Box<dyn Task>;

/// Descriptive metadata for a function-backed task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskMetadata {
    /// Identifier reported on the outcome.
    pub identifier: String,
    /// Tag selecting the error bus.
    pub tag: String,
    /// Free-form caller attributes, carried but never interpreted.
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

impl TaskMetadata {
    /// Create metadata with the given tag and identifier.
    pub fn new(tag: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            tag: tag.into(),
            attributes: HashMap::new(),
        }
    }

    /// Attach an attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Task backed by a plain no-argument fallible function.
///
/// A `FnTask` without a function is tolerated and completes as a no-op
/// success.
pub struct FnTask<F> {
    meta: TaskMetadata,
    f: Option<F>,
}

impl<F> FnTask<F>
where
    F: Fn() -> TaskResult + Send + Sync + 'static,
{
    /// Wrap `f` using `tag` and `identifier` as its reported metadata.
    pub fn new(f: F, tag: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            meta: TaskMetadata::new(tag, identifier),
            f: Some(f),
        }
    }

    /// Wrap an optional function with full metadata.
    pub fn from_parts(f: Option<F>, meta: TaskMetadata) -> Self {
        Self { meta, f }
    }

    /// Metadata this task reports.
    pub fn metadata(&self) -> &TaskMetadata {
        &self.meta
    }
}

impl FnTask<fn() -> TaskResult> {
    /// A task with no body; executes as an immediate success.
    pub fn empty(tag: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            meta: TaskMetadata::new(tag, identifier),
            f: None,
        }
    }
}

impl<F> fmt::Debug for FnTask<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTask")
            .field("meta", &self.meta)
            .field("has_body", &self.f.is_some())
            .finish()
    }
}

#[async_trait]
impl<F> Task for FnTask<F>
where
    F: Fn() -> TaskResult + Send + Sync + 'static,
{
    async fn execute(&self) -> TaskResult {
        match &self.f {
            Some(f) => f(),
            None => Ok(()),
        }
    }

    fn identifier(&self) -> &str {
        &self.meta.identifier
    }

    fn tag(&self) -> &str {
        &self.meta.tag
    }
}
