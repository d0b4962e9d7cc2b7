//! Dispatcher control state machine.
//!
//! ```text
//!   Idle --run--> Running --pause--> Paused
//!                   ^  |               |
//!                   |  +--shutdown--+  |
//!                   +----restart----|--+
//!                                   v
//!                               Shutdown  (terminal, also reachable from Idle/Paused)
//! ```
//!
//! Signals travel over a rendezvous channel owned by the dispatch loop. The
//! loop applies the transition, then acknowledges, so a control call returns
//! only once the new state is in effect.

use std::fmt;

use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatcherState {
    /// Constructed; the dispatch loop has not been started.
    Idle,
    /// Pulling tasks from the queue.
    Running,
    /// Not pulling tasks; admitted tasks keep running.
    Paused,
    /// Terminal; the dispatch loop is gone.
    Shutdown,
}

impl fmt::Display for DispatcherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Shutdown => "shutdown",
        };
        f.write_str(name)
    }
}

/// Control signal accepted by the dispatch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    /// Stop pulling new tasks.
    Pause,
    /// Resume pulling tasks.
    Restart,
    /// Stop the loop for good.
    Shutdown,
}

impl ControlSignal {
    /// State reached by applying this signal in `current`.
    ///
    /// Signals that do not apply to `current` leave it unchanged.
    #[must_use]
    pub const fn apply(self, current: DispatcherState) -> DispatcherState {
        match (current, self) {
            (DispatcherState::Shutdown, _) | (_, Self::Shutdown) => DispatcherState::Shutdown,
            (DispatcherState::Running, Self::Pause) => DispatcherState::Paused,
            (DispatcherState::Paused, Self::Restart) => DispatcherState::Running,
            (state, _) => state,
        }
    }
}

/// A signal plus the channel the loop acknowledges on.
#[derive(Debug)]
pub(crate) struct Command {
    pub signal: ControlSignal,
    pub ack: Sender<DispatcherState>,
}
