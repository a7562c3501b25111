//! Recording checkpoints.
//!
//! A [`State`] captures the scheduling-relevant view of the target program
//! at one instant: which threads are enabled, and for every thread with a
//! pending instruction, what that instruction is. States are built from a
//! task-pool snapshot by the controller, never mutated afterwards, and
//! shared by `Arc` between the transitions that bracket them.

use crate::instruction::Instruction;
use crate::thread::ThreadId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A pending instruction and whether its thread is presently enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOp {
    pub instruction: Instruction,
    pub enabled: bool,
}

/// An immutable snapshot of the scheduling state.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct State {
    /// Threads whose next instruction could legally execute.
    pub enabled: BTreeSet<ThreadId>,
    /// Per-thread pending instruction, for every thread that has posted one.
    pub pending: BTreeMap<ThreadId, PendingOp>,
}

impl State {
    /// Empty state (no threads registered yet).
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(enabled: BTreeSet<ThreadId>, pending: BTreeMap<ThreadId, PendingOp>) -> Self {
        Self { enabled, pending }
    }

    /// Whether no thread can make progress.
    pub fn is_stuck(&self) -> bool {
        self.enabled.is_empty()
    }

    /// The pending instruction of `tid`, if it has posted one.
    pub fn pending_of(&self, tid: ThreadId) -> Option<&Instruction> {
        self.pending.get(&tid).map(|p| &p.instruction)
    }

    /// All pending instructions of threads that are not enabled.
    pub fn blocked_instructions(&self) -> Vec<Instruction> {
        self.pending
            .iter()
            .filter(|(_, p)| !p.enabled)
            .map(|(_, p)| p.instruction.clone())
            .collect()
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "enabled={{")?;
        for (i, tid) in self.enabled.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", tid)?;
        }
        write!(f, "}} pending=[")?;
        for (i, (tid, p)) in self.pending.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(
                f,
                "t{}:{} {}{}",
                tid,
                p.instruction.op,
                p.instruction.object,
                if p.enabled { "" } else { " (blocked)" },
            )?;
        }
        write!(f, "]")
    }
}
