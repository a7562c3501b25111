//! The recorded trace of one controlled run.
//!
//! An [`Execution`] is an append-only sequence of [`Transition`]s plus the
//! initial [`State`]. It is built and finalized exclusively by the
//! controller thread, so no interior synchronization is needed; what comes
//! out at the end of a run is a plain value that serializes to JSON and
//! compares by value.

use crate::instruction::Instruction;
use crate::state::State;
use crate::thread::ThreadId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Terminal (and initial) status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunStatus {
    /// The run is still in progress (initial state; never terminal).
    Running,
    /// Every thread finished.
    Done,
    /// The enabled set became empty while threads still held pending
    /// instructions: a cyclic wait in the target program.
    Deadlock,
    /// The enabled set became empty with no pending instructions: threads
    /// are stuck outside the runtime's view (e.g. on uninstrumented waits).
    Blocked,
    /// The runtime itself failed (inconsistent selection); the target was
    /// released uncontrolled.
    Error,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Running => "RUNNING",
            RunStatus::Done => "DONE",
            RunStatus::Deadlock => "DEADLOCK",
            RunStatus::Blocked => "BLOCKED",
            RunStatus::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// One scheduled step: the state before, the instruction executed, the
/// state after.
///
/// `pre` is fixed at construction. `post` is back-filled by the controller
/// once the executing thread has yielded — the final transition's post
/// state is only knowable then.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    /// 1-based position in the execution.
    pub index: u64,
    pub pre: Arc<State>,
    pub instruction: Instruction,
    pub post: Option<Arc<State>>,
}

impl Transition {
    pub fn new(index: u64, pre: Arc<State>, instruction: Instruction) -> Self {
        Self {
            index,
            pre,
            instruction,
            post: None,
        }
    }

    /// Back-fill the post state. Panics if already set; a transition's
    /// outcome is recorded exactly once.
    pub fn set_post(&mut self, post: Arc<State>) {
        assert!(
            self.post.is_none(),
            "transition {} already has a post state",
            self.index
        );
        self.post = Some(post);
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:>4}] {}", self.index, self.instruction)
    }
}

/// Condensed trace entry: sequence position and instruction only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CondensedStep {
    pub index: u64,
    pub instruction: Instruction,
}

/// The recorded trace of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Execution {
    /// Snapshot taken before the first grant.
    pub initial: Arc<State>,
    /// Scheduled steps, in grant order.
    pub transitions: Vec<Transition>,
    /// Declared number of target-program threads.
    pub thread_count: usize,
    /// Whether any lock instruction was scheduled during the run.
    pub contains_locks: bool,
    /// Terminal status (Running until the controller stops the run).
    pub status: RunStatus,
}

impl Execution {
    pub fn new(initial: Arc<State>, thread_count: usize) -> Self {
        Self {
            initial,
            transitions: Vec::new(),
            thread_count,
            contains_locks: false,
            status: RunStatus::Running,
        }
    }

    /// Number of scheduled steps so far.
    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    /// Non-empty iff at least one instruction has been scheduled.
    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    /// The last known state: the final transition's post state, its pre
    /// state if the post is not yet back-filled, or the initial state if
    /// nothing has been scheduled.
    pub fn final_state(&self) -> Arc<State> {
        match self.transitions.last() {
            Some(t) => t.post.clone().unwrap_or_else(|| t.pre.clone()),
            None => self.initial.clone(),
        }
    }

    /// Append the next transition. The instruction's lock operations flip
    /// `contains_locks` permanently.
    pub fn push(&mut self, pre: Arc<State>, instruction: Instruction) {
        if instruction.op.is_lock_op() {
            self.contains_locks = true;
        }
        let index = self.transitions.len() as u64 + 1;
        self.transitions.push(Transition::new(index, pre, instruction));
    }

    /// Back-fill the post state of the most recent transition.
    ///
    /// No-op on an empty execution (a run can terminate before any step is
    /// scheduled).
    pub fn finalize_last(&mut self, post: Arc<State>) {
        if let Some(t) = self.transitions.last_mut() {
            if t.post.is_none() {
                t.set_post(post);
            }
        }
    }

    /// Set the terminal status. Panics on an attempt to go back to Running
    /// or to overwrite one terminal status with another.
    pub fn set_status(&mut self, status: RunStatus) {
        assert!(status.is_terminal(), "cannot reset a run to RUNNING");
        assert_eq!(
            self.status,
            RunStatus::Running,
            "terminal status {} already set",
            self.status
        );
        self.status = status;
    }

    /// Condensed index+instruction-only form of the trace.
    pub fn condensed(&self) -> Vec<CondensedStep> {
        self.transitions
            .iter()
            .map(|t| CondensedStep {
                index: t.index,
                instruction: t.instruction.clone(),
            })
            .collect()
    }

    /// The realized interleaving: thread ids in grant order. This is what
    /// a replay schedule is made of.
    pub fn interleaving(&self) -> Vec<ThreadId> {
        self.transitions.iter().map(|t| t.instruction.tid).collect()
    }
}
