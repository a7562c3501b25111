//! Runtime error taxonomy.
//!
//! Deadlock and selection failures are recoverable run outcomes: they
//! become the execution's terminal status and the target is released
//! uncontrolled. Callback-protocol violations (double post, yield without
//! a current task) are not represented here — they are fatal assertions,
//! because they mean the instrumentation and the runtime have gone out of
//! sync.

use interweave_model::persist::PersistError;
use interweave_model::{Instruction, ThreadId};
use thiserror::Error;

/// Errors surfaced by the control loop.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Every enabled thread is waiting on a conflicting pending access
    /// with no progress possible. Carries the full blocked set.
    #[error("deadlock: {} blocked instruction(s)", blocked.len())]
    Deadlock { blocked: Vec<Instruction> },

    /// The selector chose a thread that is not actually enabled, or has
    /// no pending instruction. Internal inconsistency; the run ends with
    /// status ERROR and the target is released uncontrolled.
    #[error("selector chose thread {tid} at step {step}, which cannot run")]
    Selection { tid: ThreadId, step: u64 },

    /// Failed to persist the trace or race report at run end.
    #[error(transparent)]
    Persist(#[from] PersistError),
}
