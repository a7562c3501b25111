//! Thread registry and pending-instruction slots.
//!
//! The task pool is the single synchronization hub between the controller
//! and the controlled threads, and the only structure in the runtime that
//! more than one thread mutates. One coarse mutex protects all of it;
//! condition variables are signaled only on transitions that can make a
//! wait predicate true (a new pending instruction, a status change, a
//! thread finishing).
//!
//! Contract violations by the instrumented program (posting twice without
//! yielding, yielding without a current task, unknown thread ids) are
//! fatal assertions: they mean the instrumentation and the runtime have
//! gone out of sync and must not be silently tolerated.

use crate::object_state::ObjectState;
use interweave_model::{
    DataRace, Instruction, Object, Operation, PendingOp, State, ThreadId, ThreadStatus,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Condvar, Mutex};

/// The scheduling view the selector computes its decision from, taken
/// under a single lock acquisition.
#[derive(Debug, Clone)]
pub struct SelectorView {
    /// Number of registered threads.
    pub registered: usize,
    /// Number of registered threads that have not finished.
    pub live: usize,
    /// Enabled thread ids, ascending.
    pub enabled: Vec<ThreadId>,
    /// Pending instructions of threads that are not enabled.
    pub blocked: Vec<Instruction>,
}

#[derive(Debug, Default)]
struct PoolInner {
    /// Status per registered thread. Entries are never removed.
    threads: BTreeMap<ThreadId, ThreadStatus>,
    /// Per-thread pending instruction slot.
    pending: BTreeMap<ThreadId, Instruction>,
    /// The instruction currently granted the right to execute.
    current: Option<Instruction>,
    /// Per-object access tracking, created lazily on first reference.
    objects: HashMap<Object, ObjectState>,
    /// Data races accumulated across the run.
    races: Vec<DataRace>,
}

/// Thread registry + per-thread pending-instruction slot.
pub struct TaskPool {
    inner: Mutex<PoolInner>,
    /// Signaled on registration, post, status change and yield.
    task_posted: Condvar,
    /// Signaled when a thread finishes.
    all_finished: Condvar,
    /// Declared number of target-program threads.
    thread_count: usize,
}

impl TaskPool {
    pub fn new(thread_count: usize) -> Self {
        Self {
            inner: Mutex::new(PoolInner::default()),
            task_posted: Condvar::new(),
            all_finished: Condvar::new(),
            thread_count,
        }
    }

    /// Declared thread count this pool was sized for.
    pub fn thread_count(&self) -> usize {
        self.thread_count
    }

    /// Add a thread as START: registered, but its OS thread not yet
    /// executing.
    ///
    /// # Panics
    ///
    /// If the id is already registered.
    pub fn register_thread(&self, tid: ThreadId) {
        let mut inner = self.inner.lock().unwrap();
        let prev = inner.threads.insert(tid, ThreadStatus::Start);
        assert!(prev.is_none(), "thread {} registered twice", tid);
        log::debug!("registered thread {}", tid);
        self.task_posted.notify_all();
    }

    /// Mark a registered thread's OS thread as running; it becomes
    /// ENABLED. The controller's rendezvous waits out the window between
    /// registration and activation, so a thread that is still starting up
    /// can never be mistaken for one with nothing to do.
    ///
    /// # Panics
    ///
    /// If the thread is unknown or already activated.
    pub fn activate_thread(&self, tid: ThreadId) {
        let mut inner = self.inner.lock().unwrap();
        let status = *inner
            .threads
            .get(&tid)
            .unwrap_or_else(|| panic!("activating unregistered thread {}", tid));
        assert_eq!(
            status,
            ThreadStatus::Start,
            "thread {} activated twice",
            tid,
        );
        inner.threads.insert(tid, ThreadStatus::Enabled);
        log::debug!("thread {} running", tid);
        self.task_posted.notify_all();
    }

    /// Record `instruction` as `tid`'s pending task, update the object
    /// state, recompute the thread's enabledness, and accumulate any data
    /// races the new request creates.
    ///
    /// # Panics
    ///
    /// If the thread is unknown, finished, or already has a pending task.
    pub fn post(&self, tid: ThreadId, instruction: Instruction) {
        let mut inner = self.inner.lock().unwrap();

        let status = *inner
            .threads
            .get(&tid)
            .unwrap_or_else(|| panic!("post from unregistered thread {}", tid));
        assert!(status.is_live(), "post from finished thread {}", tid);
        assert_ne!(
            status,
            ThreadStatus::Start,
            "post from thread {} before it started",
            tid,
        );
        assert!(
            !inner.pending.contains_key(&tid),
            "thread {} posted twice without yielding",
            tid,
        );

        if !instruction.op.is_thread_op() {
            let (_, races) = inner
                .objects
                .entry(instruction.object)
                .or_default()
                .request(&instruction);
            for race in &races {
                log::warn!("{}", race);
            }
            inner.races.extend(races);
        }

        let enabled = Self::instruction_enabled(&inner, &instruction);
        inner.threads.insert(
            tid,
            if enabled {
                ThreadStatus::Enabled
            } else {
                ThreadStatus::Disabled
            },
        );
        log::debug!(
            "t{} posted {} ({})",
            tid,
            instruction,
            if enabled { "enabled" } else { "disabled" },
        );
        inner.pending.insert(tid, instruction);

        self.task_posted.notify_all();
    }

    /// Atomically remove and return `tid`'s pending instruction, recording
    /// it as the task currently executing.
    ///
    /// Returns `None` when the thread is not enabled or has nothing
    /// pending — the caller treats that as a selection failure, not a
    /// contract violation.
    ///
    /// # Panics
    ///
    /// If another task is already current.
    pub fn set_current(&self, tid: ThreadId) -> Option<Instruction> {
        let mut inner = self.inner.lock().unwrap();
        assert!(
            inner.current.is_none(),
            "a task is already executing while granting thread {}",
            tid,
        );

        if inner.threads.get(&tid) != Some(&ThreadStatus::Enabled) {
            return None;
        }
        let instruction = inner.pending.remove(&tid)?;
        inner.current = Some(instruction.clone());
        Some(instruction)
    }

    /// Called when the granted thread has executed its one step: mark the
    /// access performed and re-evaluate the enabledness of every thread
    /// with a pending instruction (a lock acquire disables the other
    /// requesters, a release or read enables them).
    ///
    /// # Panics
    ///
    /// If no task is current or the yielding thread is not the one that
    /// was granted.
    pub fn yield_task(&self, tid: ThreadId) {
        let mut inner = self.inner.lock().unwrap();

        let current = inner
            .current
            .take()
            .unwrap_or_else(|| panic!("thread {} yielded without a current task", tid));
        assert_eq!(
            current.tid, tid,
            "thread {} yielded while thread {} was granted",
            tid, current.tid,
        );

        if !current.op.is_thread_op() {
            inner
                .objects
                .get_mut(&current.object)
                .expect("current task's object is tracked")
                .perform(tid);
        }

        Self::reevaluate(&mut inner);
        self.task_posted.notify_all();
    }

    /// Mark a thread FINISHED and enable any JOIN waiting on it.
    ///
    /// # Panics
    ///
    /// If the thread is unknown or still has a pending instruction.
    pub fn finish(&self, tid: ThreadId) {
        let mut inner = self.inner.lock().unwrap();
        assert!(
            inner.threads.contains_key(&tid),
            "finish from unregistered thread {}",
            tid,
        );
        assert!(
            !inner.pending.contains_key(&tid),
            "thread {} finished with a pending instruction",
            tid,
        );
        inner.threads.insert(tid, ThreadStatus::Finished);
        log::debug!("thread {} finished", tid);

        Self::reevaluate(&mut inner);
        self.task_posted.notify_all();
        self.all_finished.notify_all();
    }

    /// Block until `tid`'s registration is visible.
    pub fn wait_registered(&self, tid: ThreadId) {
        let mut inner = self.inner.lock().unwrap();
        while !inner.threads.contains_key(&tid) {
            inner = self.task_posted.wait(inner).unwrap();
        }
    }

    /// Block until the target program is ready for scheduling: every
    /// declared thread has registered, or — for targets that spawn
    /// threads as scheduled SPAWN steps — at least one thread has
    /// registered and every enabled thread has posted.
    pub fn wait_all_registered(&self) {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if inner.threads.len() >= self.thread_count {
                return;
            }
            if !inner.threads.is_empty() && Self::enabled_collected(&inner) {
                return;
            }
            inner = self.task_posted.wait(inner).unwrap();
        }
    }

    /// Block until no thread is still starting up and every ENABLED
    /// thread has a pending instruction.
    ///
    /// This is the rendezvous that lets the controller compute a
    /// scheduling decision without target threads concurrently mutating
    /// the pool: once it returns, every thread that could run is parked
    /// on its gate.
    pub fn wait_enabled_collected(&self) {
        let mut inner = self.inner.lock().unwrap();
        while !Self::enabled_collected(&inner) {
            inner = self.task_posted.wait(inner).unwrap();
        }
    }

    /// Block until every registered thread has FINISHED.
    pub fn wait_all_finished(&self) {
        let mut inner = self.inner.lock().unwrap();
        while inner.threads.values().any(|s| s.is_live()) {
            inner = self.all_finished.wait(inner).unwrap();
        }
    }

    /// Immutable snapshot for use as a recording checkpoint.
    pub fn program_state(&self) -> State {
        let inner = self.inner.lock().unwrap();
        let enabled = inner
            .threads
            .iter()
            .filter(|(_, s)| **s == ThreadStatus::Enabled)
            .map(|(tid, _)| *tid)
            .collect();
        let pending = inner
            .pending
            .iter()
            .map(|(tid, ins)| {
                (
                    *tid,
                    PendingOp {
                        instruction: ins.clone(),
                        enabled: inner.threads.get(tid) == Some(&ThreadStatus::Enabled),
                    },
                )
            })
            .collect();
        State::new(enabled, pending)
    }

    /// The selector's one-lock scheduling view.
    pub fn selector_view(&self) -> SelectorView {
        let inner = self.inner.lock().unwrap();
        SelectorView {
            registered: inner.threads.len(),
            live: inner.threads.values().filter(|s| s.is_live()).count(),
            enabled: inner
                .threads
                .iter()
                .filter(|(_, s)| **s == ThreadStatus::Enabled)
                .map(|(tid, _)| *tid)
                .collect(),
            blocked: inner
                .pending
                .iter()
                .filter(|(tid, _)| inner.threads.get(*tid) != Some(&ThreadStatus::Enabled))
                .map(|(_, ins)| ins.clone())
                .collect(),
        }
    }

    /// Races accumulated so far.
    pub fn data_races(&self) -> Vec<DataRace> {
        self.inner.lock().unwrap().races.clone()
    }

    /// Status of one thread, for assertions in tests and the scheduler.
    pub fn thread_status(&self, tid: ThreadId) -> Option<ThreadStatus> {
        self.inner.lock().unwrap().threads.get(&tid).copied()
    }

    fn enabled_collected(inner: &PoolInner) -> bool {
        inner.threads.values().all(|s| *s != ThreadStatus::Start)
            && inner
                .threads
                .iter()
                .filter(|(_, s)| **s == ThreadStatus::Enabled)
                .all(|(tid, _)| inner.pending.contains_key(tid))
    }

    /// Whether a pending instruction could legally execute next.
    fn instruction_enabled(inner: &PoolInner, ins: &Instruction) -> bool {
        match ins.op {
            Operation::Spawn => true,
            Operation::Join => {
                let target = ins
                    .object
                    .as_thread()
                    .unwrap_or_else(|| panic!("JOIN on a non-thread object {}", ins.object));
                inner.threads.get(&target) == Some(&ThreadStatus::Finished)
            }
            Operation::Lock => inner
                .objects
                .get(&ins.object)
                .map_or(true, |o| o.lock_available(ins.tid)),
            // Memory operations and UNLOCK never block; conflicts surface
            // as data races instead.
            _ => true,
        }
    }

    /// Recompute enabledness for every thread with a pending instruction.
    fn reevaluate(inner: &mut PoolInner) {
        let updates: Vec<(ThreadId, ThreadStatus)> = inner
            .pending
            .iter()
            .map(|(tid, ins)| {
                let status = if Self::instruction_enabled(inner, ins) {
                    ThreadStatus::Enabled
                } else {
                    ThreadStatus::Disabled
                };
                (*tid, status)
            })
            .collect();
        for (tid, status) in updates {
            inner.threads.insert(tid, status);
        }
    }
}
