//! Per-object pending-access tracking.
//!
//! Every shared object the target program touches gets one
//! [`ObjectState`]: the set of threads with a pending access on it,
//! partitioned into two wait classes by operation parity
//! ({READ, UNLOCK} vs {WRITE, LOCK, RMW}), plus the lock-hold state.
//!
//! This structure serves two masters:
//!
//! - **Race detection**: a requested write races with every other pending
//!   memory instruction on the object; a requested read races only with
//!   pending writes. Lock operations queue here but never race.
//! - **Lock enabledness**: a pending LOCK may run only when no other
//!   thread holds the lock and no other thread requested it earlier
//!   (first-requester-wins).

use interweave_model::{AccessClass, DataRace, Instruction, Operation, ThreadId};

/// Pending accesses and lock state for one shared object.
#[derive(Debug, Clone, Default)]
pub struct ObjectState {
    /// Pending {READ, UNLOCK} requests, in request order.
    shared: Vec<Instruction>,
    /// Pending {WRITE, LOCK, RMW} requests, in request order.
    exclusive: Vec<Instruction>,
    /// Class of the most recently performed access.
    current: Option<AccessClass>,
    /// Thread holding the lock (performed LOCK without a later UNLOCK).
    holder: Option<ThreadId>,
}

impl ObjectState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `tid` has a pending access on this object, in either class.
    pub fn has_pending(&self, tid: ThreadId) -> bool {
        self.shared.iter().any(|i| i.tid == tid) || self.exclusive.iter().any(|i| i.tid == tid)
    }

    /// Register a thread's pending access.
    ///
    /// Returns the currently-active class (for serialization decisions)
    /// and every data race the new request creates against accesses
    /// already pending.
    ///
    /// # Panics
    ///
    /// If the thread already has a pending access on this object — the
    /// callback protocol posts at most one instruction per thread.
    pub fn request(&mut self, ins: &Instruction) -> (Option<AccessClass>, Vec<DataRace>) {
        assert!(
            !self.has_pending(ins.tid),
            "thread {} already has a pending access on {}",
            ins.tid,
            ins.object,
        );

        let races = self.detect_races(ins);

        match ins.access_class() {
            AccessClass::Shared => self.shared.push(ins.clone()),
            AccessClass::Exclusive => self.exclusive.push(ins.clone()),
        }

        (self.current, races)
    }

    /// Remove `tid`'s pending access, recording its class as the active
    /// one and updating the lock-hold state.
    ///
    /// Returns the performed operation.
    ///
    /// # Panics
    ///
    /// If `tid` has no pending access here, or on an UNLOCK by a thread
    /// that does not hold the lock.
    pub fn perform(&mut self, tid: ThreadId) -> Operation {
        let ins = self
            .remove_pending(tid)
            .unwrap_or_else(|| panic!("thread {} has no pending access to perform", tid));

        self.current = Some(ins.access_class());

        match ins.op {
            Operation::Lock => {
                assert!(
                    self.holder.is_none(),
                    "thread {} acquired {} while thread {} holds it",
                    tid,
                    ins.object,
                    self.holder.unwrap(),
                );
                self.holder = Some(tid);
            }
            Operation::Unlock => {
                assert_eq!(
                    self.holder,
                    Some(tid),
                    "thread {} released {} without holding it",
                    tid,
                    ins.object,
                );
                self.holder = None;
            }
            _ => {}
        }

        ins.op
    }

    /// Whether a pending LOCK by `tid` could run now: nobody holds the
    /// lock and no other thread requested it earlier.
    pub fn lock_available(&self, tid: ThreadId) -> bool {
        if self.holder.is_some() {
            return false;
        }
        match self.exclusive.iter().find(|i| i.op == Operation::Lock) {
            Some(first) => first.tid == tid,
            None => true,
        }
    }

    /// Thread currently holding the lock, if any.
    pub fn holder(&self) -> Option<ThreadId> {
        self.holder
    }

    /// Races the requested instruction creates against pending accesses.
    ///
    /// Write/RMW: races with every other pending memory instruction of
    /// either class. Read: races only with pending exclusive-class memory
    /// instructions. Locks and atomics are exempt on both sides.
    fn detect_races(&self, ins: &Instruction) -> Vec<DataRace> {
        if !ins.races_eligible() {
            return Vec::new();
        }

        let against_shared = ins.access_class() == AccessClass::Exclusive;
        let mut races = Vec::new();

        for pending in &self.exclusive {
            if pending.tid != ins.tid && pending.races_eligible() {
                races.push(DataRace::new(pending.clone(), ins.clone()));
            }
        }
        if against_shared {
            for pending in &self.shared {
                if pending.tid != ins.tid && pending.races_eligible() {
                    races.push(DataRace::new(pending.clone(), ins.clone()));
                }
            }
        }

        races
    }

    fn remove_pending(&mut self, tid: ThreadId) -> Option<Instruction> {
        if let Some(pos) = self.shared.iter().position(|i| i.tid == tid) {
            return Some(self.shared.remove(pos));
        }
        if let Some(pos) = self.exclusive.iter().position(|i| i.tid == tid) {
            return Some(self.exclusive.remove(pos));
        }
        None
    }
}
