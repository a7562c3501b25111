//! Per-thread wake/park gates.
//!
//! Each registered thread parks on its own binary gate; only the
//! designated owner thread (the controller) may open one. This
//! one-writer/many-waiters shape is what keeps the gates themselves free
//! of the races the runtime is built to detect: a target thread only ever
//! waits on its own gate, and all grants come from a single thread.

use interweave_model::ThreadId;
use std::collections::BTreeMap;
use std::sync::{Arc, Condvar, Mutex};

#[derive(Default)]
struct Gate {
    granted: Mutex<bool>,
    cond: Condvar,
}

impl Gate {
    /// Park until granted, consuming the grant.
    fn wait(&self) {
        let mut granted = self.granted.lock().unwrap();
        while !*granted {
            granted = self.cond.wait(granted).unwrap();
        }
        *granted = false;
    }

    fn open(&self) {
        let mut granted = self.granted.lock().unwrap();
        *granted = true;
        self.cond.notify_one();
    }
}

/// Owner-checked execution-right gates, one per registered thread.
pub struct Control {
    gates: Mutex<BTreeMap<ThreadId, Arc<Gate>>>,
    owner: Mutex<Option<std::thread::ThreadId>>,
}

impl Control {
    pub fn new() -> Self {
        Self {
            gates: Mutex::new(BTreeMap::new()),
            owner: Mutex::new(None),
        }
    }

    /// Allocate a gate for `tid`.
    ///
    /// # Panics
    ///
    /// If the thread already has one.
    pub fn register_thread(&self, tid: ThreadId) {
        let mut gates = self.gates.lock().unwrap();
        let prev = gates.insert(tid, Arc::new(Gate::default()));
        assert!(prev.is_none(), "thread {} already has a control gate", tid);
    }

    /// Designate which OS thread may grant execution rights. Set once by
    /// the scheduler at startup.
    ///
    /// # Panics
    ///
    /// If an owner is already set.
    pub fn set_owner(&self, owner: std::thread::ThreadId) {
        let mut slot = self.owner.lock().unwrap();
        assert!(slot.is_none(), "control owner already designated");
        *slot = Some(owner);
    }

    /// Block the calling thread on its own gate until granted.
    ///
    /// # Panics
    ///
    /// If the thread has no gate.
    pub fn wait_for_turn(&self, tid: ThreadId) {
        let gate = {
            let gates = self.gates.lock().unwrap();
            gates
                .get(&tid)
                .unwrap_or_else(|| panic!("thread {} has no control gate", tid))
                .clone()
        };
        gate.wait();
    }

    /// Open `tid`'s gate. Denied (with a warning, no effect) unless the
    /// caller is the designated owner. Returns whether the grant happened.
    pub fn grant_execution_right(&self, tid: ThreadId) -> bool {
        if !self.caller_is_owner() {
            log::warn!(
                "thread {:?} attempted to grant execution right to {} without ownership",
                std::thread::current().id(),
                tid,
            );
            return false;
        }
        let gate = {
            let gates = self.gates.lock().unwrap();
            gates
                .get(&tid)
                .unwrap_or_else(|| panic!("granting to unregistered thread {}", tid))
                .clone()
        };
        gate.open();
        true
    }

    /// Open every gate, handing the target program back its threads
    /// uncontrolled. Owner-checked like single grants.
    pub fn grant_execution_right_all(&self) -> bool {
        if !self.caller_is_owner() {
            log::warn!(
                "thread {:?} attempted a release-all without ownership",
                std::thread::current().id(),
            );
            return false;
        }
        let gates: Vec<Arc<Gate>> = self.gates.lock().unwrap().values().cloned().collect();
        for gate in gates {
            gate.open();
        }
        true
    }

    fn caller_is_owner(&self) -> bool {
        *self.owner.lock().unwrap() == Some(std::thread::current().id())
    }
}

impl Default for Control {
    fn default() -> Self {
        Self::new()
    }
}
