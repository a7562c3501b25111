//! End-to-end runs of simulated instrumented targets: record, replay,
//! race detection and deadlock detection against real OS threads.

use interweave_model::persist;
use interweave_model::{Object, Operation, RunStatus, ThreadId};
use interweave_runtime::{RunConfig, RunOutcome, Scheduler, SchedulerHandle};
use tempfile::TempDir;

const X: Object = Object {
    address: 0x1000,
    index: None,
};
const M: Object = Object {
    address: 0x2000,
    index: None,
};
const A: Object = Object {
    address: 0x3000,
    index: None,
};
const B: Object = Object {
    address: 0x3008,
    index: None,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// One visible step: post, wait for the grant, "execute", yield.
fn step(h: &SchedulerHandle, op: Operation, object: Object, line: u32) {
    h.post_task(op, object, false, "target.c", line);
    h.yield_step();
}

/// Main thread body: spawn both workers, join both, finish. Returns once
/// the whole target program is done (or released uncontrolled).
fn drive_main(
    h: &SchedulerHandle,
    worker1: impl FnOnce(SchedulerHandle) + Send + 'static,
    worker2: impl FnOnce(SchedulerHandle) + Send + 'static,
) {
    h.attach_current_thread();
    h.wait_registered();

    let w1 = h.clone();
    let tid1 = h.next_thread_id();
    h.post_task(Operation::Spawn, Object::thread(tid1), false, "target.c", 1);
    let (tid1, join1) = h.spawn_thread(move || worker1(w1)).unwrap();
    h.yield_step();

    let w2 = h.clone();
    let tid2 = h.next_thread_id();
    h.post_task(Operation::Spawn, Object::thread(tid2), false, "target.c", 2);
    let (tid2, join2) = h.spawn_thread(move || worker2(w2)).unwrap();
    h.yield_step();

    h.post_task(Operation::Join, Object::thread(tid1), false, "target.c", 3);
    join1.join().unwrap();
    h.yield_step();

    h.post_task(Operation::Join, Object::thread(tid2), false, "target.c", 4);
    join2.join().unwrap();
    h.yield_step();

    h.finish();
}

fn run_locked_counter(config: RunConfig) -> RunOutcome {
    init_logging();
    let scheduler = Scheduler::start(config);
    let h = scheduler.handle();
    drive_main(
        &h,
        |h| {
            step(&h, Operation::Lock, M, 10);
            step(&h, Operation::Read, X, 11);
            step(&h, Operation::Write, X, 12);
            step(&h, Operation::Unlock, M, 13);
        },
        |h| {
            step(&h, Operation::Lock, M, 20);
            step(&h, Operation::Read, X, 21);
            step(&h, Operation::Write, X, 22);
            step(&h, Operation::Unlock, M, 23);
        },
    );
    scheduler.join()
}

#[test]
fn locked_counter_runs_to_done() {
    let dir = TempDir::new().unwrap();
    let config = RunConfig::new(3, dir.path()).with_policy("non-preemptive");
    let outcome = run_locked_counter(config);

    assert_eq!(outcome.execution.status, RunStatus::Done);
    assert_eq!(outcome.execution.thread_count, 3);
    assert!(outcome.execution.contains_locks);
    // 2 spawns + 2 joins + 2 * 4 worker steps
    assert_eq!(outcome.execution.len(), 12);
    assert!(
        outcome.races.is_empty(),
        "lock-protected accesses must not race: {:?}",
        outcome.races,
    );
}

#[test]
fn transitions_are_one_scheduling_round_each() {
    let dir = TempDir::new().unwrap();
    let config = RunConfig::new(3, dir.path()).with_policy("non-preemptive");
    let outcome = run_locked_counter(config);

    // one grant per recording round: indices are the sequence 1..=n, and
    // each round's pre-state shows the granted instruction pending and
    // its thread enabled
    for (i, t) in outcome.execution.transitions.iter().enumerate() {
        assert_eq!(t.index, i as u64 + 1);
        assert_eq!(t.pre.pending_of(t.instruction.tid), Some(&t.instruction));
        assert!(t.pre.enabled.contains(&t.instruction.tid));
        assert!(t.post.is_some(), "every round's outcome is back-filled");
    }
}

#[test]
fn trace_artifacts_round_trip() {
    let dir = TempDir::new().unwrap();
    let config = RunConfig::new(3, dir.path()).with_policy("non-preemptive");
    let outcome = run_locked_counter(config);

    let loaded = persist::load_execution(&dir.path().join("trace.json")).unwrap();
    assert_eq!(loaded, outcome.execution);

    let short = persist::load_condensed(&dir.path().join("trace.short.json")).unwrap();
    assert_eq!(short, outcome.execution.condensed());

    let races = persist::load_races(&dir.path().join("races.json")).unwrap();
    assert_eq!(races, outcome.races);
}

#[test]
fn replay_reproduces_the_instruction_sequence() {
    let record_dir = TempDir::new().unwrap();
    let recorded = run_locked_counter(
        RunConfig::new(3, record_dir.path()).with_policy("random").with_seed(1234),
    );
    assert_eq!(recorded.execution.status, RunStatus::Done);

    let schedule: Vec<ThreadId> = recorded.execution.interleaving();
    let replay_dir = TempDir::new().unwrap();
    let replayed = run_locked_counter(
        RunConfig::new(3, replay_dir.path())
            .with_schedule(schedule)
            // a different policy must not matter while the schedule lasts
            .with_policy("non-preemptive"),
    );

    assert_eq!(replayed.execution.status, RunStatus::Done);
    assert_eq!(
        replayed.execution.condensed(),
        recorded.execution.condensed(),
        "same schedule must realize the same instruction sequence",
    );
}

#[test]
fn unlocked_accesses_are_reported_as_one_race() {
    let dir = TempDir::new().unwrap();
    // non-preemptive keeps the main thread running through both spawns,
    // so both workers' accesses are pending together
    let config = RunConfig::new(3, dir.path()).with_policy("non-preemptive");

    init_logging();
    let scheduler = Scheduler::start(config);
    let h = scheduler.handle();
    drive_main(
        &h,
        |h| step(&h, Operation::Write, X, 10),
        |h| step(&h, Operation::Read, X, 20),
    );
    let outcome = scheduler.join();

    assert_eq!(outcome.execution.status, RunStatus::Done);
    assert_eq!(outcome.races.len(), 1, "exactly one pair, reported once");
    let race = &outcome.races.races[0];
    assert_ne!(race.first.tid, race.second.tid, "no self races");
    assert_eq!(race.first.object, X);
    assert_eq!(race.second.object, X);
    assert!(
        race.first.op == Operation::Write || race.second.op == Operation::Write,
        "at least one side is a write",
    );
}

#[test]
fn lock_cycle_terminates_as_deadlock() {
    let dir = TempDir::new().unwrap();
    let config = RunConfig::new(3, dir.path()).with_policy("non-preemptive");

    init_logging();
    let scheduler = Scheduler::start(config);
    let h = scheduler.handle();
    drive_main(
        &h,
        |h| {
            step(&h, Operation::Lock, A, 10);
            step(&h, Operation::Lock, B, 11);
            step(&h, Operation::Unlock, B, 12);
            step(&h, Operation::Unlock, A, 13);
        },
        |h| {
            step(&h, Operation::Lock, B, 20);
            step(&h, Operation::Lock, A, 21);
            step(&h, Operation::Unlock, A, 22);
            step(&h, Operation::Unlock, B, 23);
        },
    );
    let outcome = scheduler.join();

    assert_eq!(outcome.execution.status, RunStatus::Deadlock);
    // final state: both workers' lock requests and main's join are stuck
    let blocked = outcome.execution.final_state().blocked_instructions();
    assert!(
        blocked.iter().any(|i| i.op == Operation::Lock && i.object == A),
        "a blocked LOCK on A is reported: {:?}",
        blocked,
    );
    assert!(
        blocked.iter().any(|i| i.op == Operation::Lock && i.object == B),
        "a blocked LOCK on B is reported: {:?}",
        blocked,
    );
    assert!(outcome.races.is_empty());

    // the run still leaves its artifacts behind
    assert!(dir.path().join("trace.json").exists());
    assert!(dir.path().join("races.json").exists());
}

#[test]
fn recorded_interleaving_grants_one_thread_per_step() {
    let dir = TempDir::new().unwrap();
    let config = RunConfig::new(3, dir.path()).with_policy("random").with_seed(7);
    let outcome = run_locked_counter(config);

    // the realized interleaving has exactly one thread id per round and
    // main (tid 0) bracketed the workers with spawns and joins
    let interleaving = outcome.execution.interleaving();
    assert_eq!(interleaving.len(), outcome.execution.len());
    assert_eq!(interleaving[0], 0, "the first step is main's first spawn");
    assert_eq!(interleaving[interleaving.len() - 1], 0, "the last is main's join");
}
