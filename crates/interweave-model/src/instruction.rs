//! Synchronization-relevant events.
//!
//! An [`Instruction`] is the unit of scheduling granularity: one visible
//! memory access, lock operation, or thread-management operation by one
//! thread. Instructions are immutable once constructed; they are what the
//! instrumented program posts across the callback boundary and what the
//! recorded trace is made of.

use crate::object::Object;
use crate::thread::ThreadId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The operation an instruction performs on its object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    /// Load from a shared location.
    Read,
    /// Store to a shared location.
    Write,
    /// Atomic read-modify-write on a shared location.
    ReadModifyWrite,
    /// Acquire a lock.
    Lock,
    /// Release a lock.
    Unlock,
    /// Create a thread (object is the spawned thread).
    Spawn,
    /// Wait for a thread to finish (object is the joined thread).
    Join,
}

/// Wait-class parity of an operation.
///
/// Pending accesses on one object are partitioned into two classes; the
/// class determines which concurrently-pending accesses conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessClass {
    /// {Read, Unlock} — may coexist with other shared-class accesses.
    Shared,
    /// {Write, ReadModifyWrite, Lock} — excludes everything else.
    Exclusive,
}

impl AccessClass {
    /// The other class.
    pub fn opposite(&self) -> AccessClass {
        match self {
            AccessClass::Shared => AccessClass::Exclusive,
            AccessClass::Exclusive => AccessClass::Shared,
        }
    }
}

impl Operation {
    /// Whether this is a memory operation (participates in data-race
    /// detection). Lock and thread-management operations are not.
    pub fn is_memory(&self) -> bool {
        matches!(
            self,
            Operation::Read | Operation::Write | Operation::ReadModifyWrite
        )
    }

    /// Whether this is a lock operation.
    pub fn is_lock_op(&self) -> bool {
        matches!(self, Operation::Lock | Operation::Unlock)
    }

    /// Whether this is a thread-management operation.
    pub fn is_thread_op(&self) -> bool {
        matches!(self, Operation::Spawn | Operation::Join)
    }

    /// Wait-class parity: {Read, Unlock} vs {Write, ReadModifyWrite, Lock}.
    ///
    /// Thread-management operations queue in the shared class; they never
    /// conflict through the object-state machinery (JOIN enabledness is
    /// computed from thread status instead).
    pub fn access_class(&self) -> AccessClass {
        match self {
            Operation::Read | Operation::Unlock | Operation::Spawn | Operation::Join => {
                AccessClass::Shared
            }
            Operation::Write | Operation::ReadModifyWrite | Operation::Lock => {
                AccessClass::Exclusive
            }
        }
    }

    /// Short mnemonic used in trace output.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Read => "READ",
            Operation::Write => "WRITE",
            Operation::ReadModifyWrite => "RMW",
            Operation::Lock => "LOCK",
            Operation::Unlock => "UNLOCK",
            Operation::Spawn => "SPAWN",
            Operation::Join => "JOIN",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Source position of a visible instruction in the target program.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
}

impl SourceLocation {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// One synchronization-relevant event: `(tid, operation, object)` plus
/// atomicity and source position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instruction {
    /// Thread executing the instruction.
    pub tid: ThreadId,
    /// What it does.
    pub op: Operation,
    /// The shared object it touches.
    pub object: Object,
    /// Whether the access is declared atomic by the front end. Atomic
    /// accesses still serialize but are exempt from race reporting.
    pub is_atomic: bool,
    /// Where it appears in the target program.
    pub location: SourceLocation,
}

impl Instruction {
    pub fn new(
        tid: ThreadId,
        op: Operation,
        object: Object,
        is_atomic: bool,
        location: SourceLocation,
    ) -> Self {
        Self {
            tid,
            op,
            object,
            is_atomic,
            location,
        }
    }

    /// Whether this instruction can appear in a data-race pair.
    ///
    /// Locks never race, only memory operations do; atomic accesses are
    /// synchronization by definition.
    pub fn races_eligible(&self) -> bool {
        self.op.is_memory() && !self.is_atomic
    }

    /// Wait-class of this instruction.
    pub fn access_class(&self) -> AccessClass {
        self.op.access_class()
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "t{} {} {} at {}{}",
            self.tid,
            self.op,
            self.object,
            self.location,
            if self.is_atomic { " (atomic)" } else { "" },
        )
    }
}
