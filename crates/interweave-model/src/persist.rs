//! Persisted run state: settings, schedules, traces, race reports.
//!
//! All artifacts are JSON and round-trip under value equality. A run
//! consumes [`Settings`] and (for replay) a [`Schedule`], and produces the
//! full [`Execution`](crate::execution::Execution) trace, a condensed
//! index+instruction form, and a [`RaceReport`](crate::race::RaceReport).

use crate::execution::{CondensedStep, Execution};
use crate::race::RaceReport;
use crate::thread::ThreadId;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur loading or saving persisted state.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Run settings: which selection policy drives the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Selection-policy tag ("random", "non-preemptive", or a registered
    /// custom name).
    pub policy: String,
    /// Seed for the random policy. Recorded so a random run can be
    /// re-derived.
    #[serde(default)]
    pub seed: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            policy: "random".to_string(),
            seed: 0,
        }
    }
}

/// A replay schedule: declared thread count plus the ordered thread ids to
/// force at each step. An empty step list means "record, don't replay".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub thread_count: usize,
    #[serde(default)]
    pub steps: Vec<ThreadId>,
}

impl Schedule {
    pub fn new(thread_count: usize) -> Self {
        Self {
            thread_count,
            steps: Vec::new(),
        }
    }

    pub fn with_steps(thread_count: usize, steps: Vec<ThreadId>) -> Self {
        Self {
            thread_count,
            steps,
        }
    }
}

pub fn save_settings(settings: &Settings, path: &Path) -> Result<(), PersistError> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, settings)?;
    Ok(())
}

pub fn load_settings(path: &Path) -> Result<Settings, PersistError> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(file)?)
}

pub fn save_schedule(schedule: &Schedule, path: &Path) -> Result<(), PersistError> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, schedule)?;
    Ok(())
}

pub fn load_schedule(path: &Path) -> Result<Schedule, PersistError> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(file)?)
}

/// Save the full transition trace.
pub fn save_execution(execution: &Execution, path: &Path) -> Result<(), PersistError> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, execution)?;
    Ok(())
}

pub fn load_execution(path: &Path) -> Result<Execution, PersistError> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(file)?)
}

/// Save the condensed index+instruction-only trace.
pub fn save_condensed(steps: &[CondensedStep], path: &Path) -> Result<(), PersistError> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, steps)?;
    Ok(())
}

pub fn load_condensed(path: &Path) -> Result<Vec<CondensedStep>, PersistError> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(file)?)
}

pub fn save_races(report: &RaceReport, path: &Path) -> Result<(), PersistError> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, report)?;
    Ok(())
}

pub fn load_races(path: &Path) -> Result<RaceReport, PersistError> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(file)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::RunStatus;
    use crate::instruction::{Instruction, Operation, SourceLocation};
    use crate::object::Object;
    use crate::race::DataRace;
    use crate::state::{PendingOp, State};
    use std::collections::{BTreeMap, BTreeSet};
    use std::io::Write as _;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn ins(tid: ThreadId, op: Operation, object: Object) -> Instruction {
        Instruction::new(tid, op, object, false, SourceLocation::new("prog.c", 10))
    }

    fn snapshot(enabled: &[ThreadId], pending: &[(ThreadId, Instruction, bool)]) -> Arc<State> {
        Arc::new(State::new(
            enabled.iter().copied().collect::<BTreeSet<_>>(),
            pending
                .iter()
                .map(|(tid, i, e)| {
                    (
                        *tid,
                        PendingOp {
                            instruction: i.clone(),
                            enabled: *e,
                        },
                    )
                })
                .collect::<BTreeMap<_, _>>(),
        ))
    }

    /// An 8-transition run: spawn, load, store, lock, unlock, lock, unlock,
    /// join — two threads, one shared location, one lock.
    fn eight_step_execution() -> Execution {
        let x = Object::new(0x1000);
        let m = Object::new(0x2000);
        let steps = [
            ins(0, Operation::Spawn, Object::thread(1)),
            ins(1, Operation::Read, x),
            ins(1, Operation::Write, x),
            ins(0, Operation::Lock, m),
            ins(0, Operation::Unlock, m),
            ins(1, Operation::Lock, m),
            ins(1, Operation::Unlock, m),
            ins(0, Operation::Join, Object::thread(1)),
        ];

        let initial = snapshot(&[0], &[(0, steps[0].clone(), true)]);
        let mut exec = Execution::new(initial, 2);
        for step in &steps {
            exec.push(exec.final_state(), step.clone());
            let post = snapshot(&[0, 1], &[(step.tid, step.clone(), true)]);
            exec.finalize_last(post);
        }
        exec.set_status(RunStatus::Done);
        exec
    }

    #[test]
    fn settings_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");

        let settings = Settings {
            policy: "non-preemptive".to_string(),
            seed: 99,
        };
        save_settings(&settings, &path).unwrap();
        assert_eq!(load_settings(&path).unwrap(), settings);
    }

    #[test]
    fn schedule_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("schedule.json");

        let schedule = Schedule::with_steps(3, vec![0, 1, 1, 2, 0]);
        save_schedule(&schedule, &path).unwrap();
        assert_eq!(load_schedule(&path).unwrap(), schedule);
    }

    #[test]
    fn execution_round_trip_eight_transitions() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("trace.json");

        let exec = eight_step_execution();
        save_execution(&exec, &path).unwrap();
        let loaded = load_execution(&path).unwrap();

        assert_eq!(loaded, exec);
        assert_eq!(loaded.len(), 8);
        assert_eq!(loaded.status, RunStatus::Done);
        assert!(loaded.contains_locks);
        assert_eq!(loaded.interleaving(), vec![0, 1, 1, 0, 0, 1, 1, 0]);
    }

    #[test]
    fn condensed_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("trace.short.json");

        let exec = eight_step_execution();
        let short = exec.condensed();
        save_condensed(&short, &path).unwrap();
        assert_eq!(load_condensed(&path).unwrap(), short);
    }

    #[test]
    fn race_report_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("races.json");

        let x = Object::new(0x1000);
        let report = RaceReport::new(vec![DataRace::new(
            ins(0, Operation::Write, x),
            ins(1, Operation::Read, x),
        )]);
        save_races(&report, &path).unwrap();
        assert_eq!(load_races(&path).unwrap(), report);
    }

    #[test]
    fn malformed_input_is_an_error_not_a_panic() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        let mut f = File::create(&path).unwrap();
        f.write_all(b"not json at all {{{").unwrap();

        assert!(matches!(
            load_settings(&path),
            Err(PersistError::Json(_))
        ));
        assert!(matches!(
            load_schedule(dir.path().join("missing.json").as_path()),
            Err(PersistError::Io(_))
        ));
    }
}
