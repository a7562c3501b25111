//! Identity of a shared memory location or lock.

use crate::thread::ThreadId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A shared object: a memory location, a lock, or (for thread-management
/// instructions) a thread modeled as an object.
///
/// Compared by identity — a stable address plus an optional structural
/// index (field or array offset) distinguishing aliasing accesses to the
/// same base address. Immutable once constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Object {
    /// Stable address or symbol of the location.
    pub address: u64,
    /// Structural offset within the location, when the front end can
    /// distinguish one (field index, array element).
    pub index: Option<u32>,
}

impl Object {
    /// Object for a plain shared location.
    pub fn new(address: u64) -> Self {
        Self {
            address,
            index: None,
        }
    }

    /// Object for a structured access (field or array element).
    pub fn with_index(address: u64, index: u32) -> Self {
        Self {
            address,
            index: Some(index),
        }
    }

    /// Pseudo-object standing in for a thread, targeted by SPAWN/JOIN.
    ///
    /// Thread pseudo-objects live in their own address space so they can
    /// never collide with a real location's address.
    pub fn thread(tid: ThreadId) -> Self {
        Self {
            address: u64::from(tid),
            index: Some(THREAD_OBJECT_TAG),
        }
    }

    /// Whether this object is a thread pseudo-object.
    pub fn is_thread(&self) -> bool {
        self.index == Some(THREAD_OBJECT_TAG)
    }

    /// The thread id of a thread pseudo-object, if it is one.
    pub fn as_thread(&self) -> Option<ThreadId> {
        if self.is_thread() {
            Some(self.address as ThreadId)
        } else {
            None
        }
    }
}

/// Reserved `index` value tagging thread pseudo-objects.
const THREAD_OBJECT_TAG: u32 = u32::MAX;

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(tid) = self.as_thread() {
            write!(f, "thread:{}", tid)
        } else {
            match self.index {
                Some(i) => write!(f, "{:#x}[{}]", self.address, i),
                None => write!(f, "{:#x}", self.address),
            }
        }
    }
}
