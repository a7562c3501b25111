//! The controller: owns the pool, the gates and the selector, and drives
//! the whole target program to completion or to a terminal failure state.
//!
//! A [`Scheduler`] is constructed once per process, before the target
//! program body runs, and torn down after it. Instrumented code calls in
//! through a cloneable [`SchedulerHandle`]:
//!
//! - [`attach_current_thread`](SchedulerHandle::attach_current_thread) /
//!   [`spawn_thread`](SchedulerHandle::spawn_thread) — registration
//! - [`wait_registered`](SchedulerHandle::wait_registered) — start-routine
//!   barrier
//! - [`post_task`](SchedulerHandle::post_task) — immediately before a
//!   visible instruction; blocks until granted
//! - [`yield_step`](SchedulerHandle::yield_step) — immediately after it
//! - [`finish`](SchedulerHandle::finish) — thread termination
//!
//! The controller thread is the sole writer of grants and of the recorded
//! [`Execution`]. When a run ends in anything but DONE, every gate is
//! opened unconditionally so the target program continues uncontrolled
//! rather than hanging on a grant nobody will ever issue; from that point
//! the callbacks become no-ops.

use crate::config::RunConfig;
use crate::control::Control;
use crate::error::RuntimeError;
use crate::selector::{PolicyRegistry, Selector};
use crate::task_pool::TaskPool;
use interweave_model::persist::{self, Settings};
use interweave_model::{
    Execution, Instruction, Object, Operation, RaceReport, RunStatus, SourceLocation, ThreadId,
};
use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

thread_local! {
    /// Thread id assigned at registration; the callback surface reads it
    /// instead of threading an explicit tid through instrumented code.
    static CURRENT_TID: Cell<Option<ThreadId>> = const { Cell::new(None) };
}

fn current_tid() -> ThreadId {
    CURRENT_TID
        .get()
        .expect("callback from a thread not registered with the scheduler")
}

/// What a finished run produced.
#[derive(Debug)]
pub struct RunOutcome {
    pub execution: Execution,
    pub races: RaceReport,
}

struct Shared {
    pool: TaskPool,
    control: Control,
    config: RunConfig,
    /// Next thread id to assign; registration-time lock.
    next_tid: Mutex<ThreadId>,
    /// Set when the run went terminal without DONE and all gates were
    /// opened; callbacks are no-ops from then on.
    released: AtomicBool,
}

/// Cloneable callback surface handed to instrumented target code.
#[derive(Clone)]
pub struct SchedulerHandle {
    shared: Arc<Shared>,
}

impl SchedulerHandle {
    /// Register the calling thread (the wrapped entry point uses this for
    /// the target's main thread). Returns the assigned id.
    pub fn attach_current_thread(&self) -> ThreadId {
        let tid = self.register_new_thread();
        self.shared.pool.activate_thread(tid);
        CURRENT_TID.set(Some(tid));
        tid
    }

    /// The id that will be assigned to the next registered thread.
    ///
    /// Ids are sequential, so the front end can name the thread object a
    /// SPAWN instruction targets before creating the thread.
    pub fn next_thread_id(&self) -> ThreadId {
        *self.shared.next_tid.lock().unwrap()
    }

    /// Id of the calling thread, if registered.
    pub fn current_thread_id(&self) -> Option<ThreadId> {
        CURRENT_TID.get()
    }

    /// Create an OS thread for `start_routine` and register it with the
    /// pool and the control gates before returning.
    ///
    /// The thread is registered as START before the OS thread exists and
    /// activated by the wrapper once it runs; current-thread id and
    /// finish-on-return are handled there too, so `start_routine` only
    /// needs to issue `post_task`/`yield_step` pairs.
    pub fn spawn_thread<F>(&self, start_routine: F) -> std::io::Result<(ThreadId, thread::JoinHandle<()>)>
    where
        F: FnOnce() + Send + 'static,
    {
        let tid = self.register_new_thread();
        let handle = self.clone();
        let join = thread::Builder::new()
            .name(format!("target-{}", tid))
            .spawn(move || {
                CURRENT_TID.set(Some(tid));
                handle.shared.pool.activate_thread(tid);
                start_routine();
                // Return from the start routine terminates the thread even
                // when the instrumentation did not call finish explicitly.
                if !handle.shared.released.load(Ordering::SeqCst)
                    && handle
                        .shared
                        .pool
                        .thread_status(tid)
                        .is_some_and(|s| s.is_live())
                {
                    handle.shared.pool.finish(tid);
                }
            })?;
        Ok((tid, join))
    }

    /// Block until the calling thread's registration is visible to the
    /// controller.
    pub fn wait_registered(&self) {
        self.shared.pool.wait_registered(current_tid());
    }

    /// Post the visible instruction the calling thread is about to
    /// execute and block until the controller grants the right to run it.
    pub fn post_task(
        &self,
        op: Operation,
        object: Object,
        is_atomic: bool,
        source_file: &str,
        source_line: u32,
    ) {
        if self.shared.released.load(Ordering::SeqCst) {
            return;
        }
        let tid = current_tid();
        let instruction = Instruction::new(
            tid,
            op,
            object,
            is_atomic,
            SourceLocation::new(source_file, source_line),
        );
        self.shared.pool.post(tid, instruction);
        self.shared.control.wait_for_turn(tid);
    }

    /// Signal that the granted instruction has executed.
    pub fn yield_step(&self) {
        if self.shared.released.load(Ordering::SeqCst) {
            return;
        }
        self.shared.pool.yield_task(current_tid());
    }

    /// Mark the calling thread FINISHED.
    pub fn finish(&self) {
        if self.shared.released.load(Ordering::SeqCst) {
            return;
        }
        self.shared.pool.finish(current_tid());
    }

    fn register_new_thread(&self) -> ThreadId {
        let mut next = self.shared.next_tid.lock().unwrap();
        let tid = *next;
        *next += 1;
        self.shared.pool.register_thread(tid);
        self.shared.control.register_thread(tid);
        tid
    }
}

/// The concurrency-control runtime for one run of a target program.
pub struct Scheduler {
    handle: SchedulerHandle,
    controller: thread::JoinHandle<RunOutcome>,
}

impl Scheduler {
    /// Start a run with the built-in selection policies.
    pub fn start(config: RunConfig) -> Self {
        Self::start_with_policies(config, PolicyRegistry::new())
    }

    /// Start a run with a caller-supplied policy registry.
    pub fn start_with_policies(config: RunConfig, registry: PolicyRegistry) -> Self {
        let shared = Arc::new(Shared {
            pool: TaskPool::new(config.thread_count),
            control: Control::new(),
            config,
            next_tid: Mutex::new(0),
            released: AtomicBool::new(false),
        });

        let loop_shared = shared.clone();
        let controller = thread::Builder::new()
            .name("interweave-controller".to_string())
            .spawn(move || control_loop(loop_shared, registry))
            .expect("failed to spawn controller thread");

        Self {
            handle: SchedulerHandle { shared },
            controller,
        }
    }

    /// The callback surface for instrumented code.
    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }

    /// Wait for the run to reach a terminal status and collect the trace.
    pub fn join(self) -> RunOutcome {
        match self.controller.join() {
            Ok(outcome) => outcome,
            Err(payload) => std::panic::resume_unwind(payload),
        }
    }
}

/// The control loop, run on the controller thread.
fn control_loop(shared: Arc<Shared>, registry: PolicyRegistry) -> RunOutcome {
    let config = &shared.config;
    shared.control.set_owner(thread::current().id());
    log::info!(
        "run starting: {} declared thread(s), policy {:?}, {} recorded step(s)",
        config.thread_count,
        config.policy,
        config.schedule.len(),
    );

    shared.pool.wait_all_registered();
    shared.pool.wait_enabled_collected();

    let policy = registry.build(&config.policy, config.seed);
    let mut selector = Selector::new(config.schedule.clone(), policy);
    let mut execution = Execution::new(
        Arc::new(shared.pool.program_state()),
        config.thread_count,
    );
    let mut step = 0usize;

    loop {
        let selection = selector.select(&shared.pool.selector_view(), step);
        match selection.status {
            RunStatus::Running => {
                let tid = selection.tid.expect("running selection names a thread");
                let Some(instruction) = shared.pool.set_current(tid) else {
                    let err = RuntimeError::Selection {
                        tid,
                        step: step as u64 + 1,
                    };
                    log::error!("{}", err);
                    execution.set_status(RunStatus::Error);
                    break;
                };
                log::debug!("step {}: granting {}", step + 1, instruction);
                execution.push(execution.final_state(), instruction);
                shared.control.grant_execution_right(tid);
                shared.pool.wait_enabled_collected();
                execution.finalize_last(Arc::new(shared.pool.program_state()));
                step += 1;
            }
            RunStatus::Done => {
                execution.set_status(RunStatus::Done);
                break;
            }
            RunStatus::Deadlock => {
                let blocked = shared.pool.selector_view().blocked;
                for instruction in &blocked {
                    log::error!("blocked: {}", instruction);
                }
                log::error!("{}", RuntimeError::Deadlock { blocked });
                execution.set_status(RunStatus::Deadlock);
                break;
            }
            RunStatus::Blocked => {
                log::error!("no thread can run and nothing is pending; target is stuck");
                execution.set_status(RunStatus::Blocked);
                break;
            }
            RunStatus::Error => unreachable!("the selector never returns ERROR"),
        }
    }

    if execution.status != RunStatus::Done {
        // Never leave target threads parked on gates nobody will signal:
        // they continue uncontrolled and the callbacks become no-ops.
        shared.released.store(true, Ordering::SeqCst);
        shared.control.grant_execution_right_all();
    }
    execution.finalize_last(Arc::new(shared.pool.program_state()));

    let races = RaceReport::new(shared.pool.data_races());
    log::info!(
        "run finished: status {}, {} transition(s), {} data race(s)",
        execution.status,
        execution.len(),
        races.len(),
    );

    persist_outcome(config, &execution, &races);
    RunOutcome { execution, races }
}

/// A run always leaves its effective settings, a trace file and a race
/// report behind, possibly empty; persistence failures are logged, never
/// turned into a hang.
fn persist_outcome(config: &RunConfig, execution: &Execution, races: &RaceReport) {
    if let Err(err) = std::fs::create_dir_all(&config.output_dir) {
        log::error!(
            "cannot create output directory {}: {}",
            config.output_dir.display(),
            err,
        );
        return;
    }
    // The settings a random run actually used; a later run can re-derive
    // the same interleaving from them without the full trace.
    let settings = Settings {
        policy: config.policy.clone(),
        seed: config.seed,
    };
    if let Err(err) = persist::save_settings(&settings, &config.settings_path()) {
        log::error!("{}", RuntimeError::Persist(err));
    }
    if let Err(err) = persist::save_execution(execution, &config.trace_path()) {
        log::error!("{}", RuntimeError::Persist(err));
    }
    if let Err(err) = persist::save_condensed(&execution.condensed(), &config.trace_short_path()) {
        log::error!("{}", RuntimeError::Persist(err));
    }
    if let Err(err) = persist::save_races(races, &config.races_path()) {
        log::error!("{}", RuntimeError::Persist(err));
    }
}
