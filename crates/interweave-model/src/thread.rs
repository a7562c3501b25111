//! Thread identity and scheduling status.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a controlled thread.
///
/// Assigned at registration, stable for the process lifetime. Thread 0 is
/// conventionally the target program's main thread.
pub type ThreadId = u32;

/// Scheduling status of a controlled thread.
///
/// Transitions are driven exclusively by the task pool:
///
/// ```text
/// ──register──▶ Start ──activate──▶ Enabled ◀──────▶ Disabled
///                                      │                │
///                                      └────finish──────┴──▶ Finished
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ThreadStatus {
    /// Registered, but its OS thread has not started executing yet.
    Start,
    /// The thread's next pending instruction could legally execute.
    Enabled,
    /// The thread's next pending instruction conflicts with a held access.
    Disabled,
    /// The thread's start routine has returned.
    Finished,
}

impl ThreadStatus {
    /// Whether this thread still participates in scheduling decisions.
    pub fn is_live(&self) -> bool {
        !matches!(self, ThreadStatus::Finished)
    }
}

impl fmt::Display for ThreadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ThreadStatus::Start => "START",
            ThreadStatus::Enabled => "ENABLED",
            ThreadStatus::Disabled => "DISABLED",
            ThreadStatus::Finished => "FINISHED",
        };
        f.write_str(s)
    }
}
