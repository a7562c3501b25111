//! Run configuration from persisted settings and schedule files.
//!
//! Malformed or missing input never aborts a run: the loader falls back
//! to safe defaults (empty schedule, random policy, one thread) with a
//! logged warning.

use interweave_model::persist::{self, Schedule, Settings};
use interweave_model::ThreadId;
use std::path::{Path, PathBuf};

/// Settings file name inside a run directory.
pub const SETTINGS_FILE: &str = "settings.json";
/// Schedule file name inside a run directory.
pub const SCHEDULE_FILE: &str = "schedule.json";
/// Full trace artifact written at run end.
pub const TRACE_FILE: &str = "trace.json";
/// Condensed index+instruction trace written at run end.
pub const TRACE_SHORT_FILE: &str = "trace.short.json";
/// Race report written at run end.
pub const RACES_FILE: &str = "races.json";

/// Everything a run needs up front.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Declared number of target-program threads.
    pub thread_count: usize,
    /// Thread ids to force at each step; empty means record-only.
    pub schedule: Vec<ThreadId>,
    /// Selection-policy tag.
    pub policy: String,
    /// Seed for the random policy.
    pub seed: u64,
    /// Directory the trace and race report are written to.
    pub output_dir: PathBuf,
}

impl RunConfig {
    /// Record-mode config with default policy.
    pub fn new(thread_count: usize, output_dir: impl Into<PathBuf>) -> Self {
        let settings = Settings::default();
        Self {
            thread_count,
            schedule: Vec::new(),
            policy: settings.policy,
            seed: settings.seed,
            output_dir: output_dir.into(),
        }
    }

    /// Force a recorded interleaving for replay.
    pub fn with_schedule(mut self, schedule: Vec<ThreadId>) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn with_policy(mut self, policy: impl Into<String>) -> Self {
        self.policy = policy.into();
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Load settings and schedule from a run directory, falling back to
    /// defaults on anything unreadable. Artifacts are written back to the
    /// same directory.
    pub fn load(dir: &Path) -> Self {
        let settings = match persist::load_settings(&dir.join(SETTINGS_FILE)) {
            Ok(settings) => settings,
            Err(err) => {
                log::warn!(
                    "unreadable settings in {}: {}; using defaults",
                    dir.display(),
                    err,
                );
                Settings::default()
            }
        };
        let schedule = match persist::load_schedule(&dir.join(SCHEDULE_FILE)) {
            Ok(schedule) => schedule,
            Err(err) => {
                log::warn!(
                    "unreadable schedule in {}: {}; recording with a single declared thread",
                    dir.display(),
                    err,
                );
                Schedule::new(1)
            }
        };

        Self {
            thread_count: schedule.thread_count,
            schedule: schedule.steps,
            policy: settings.policy,
            seed: settings.seed,
            output_dir: dir.to_path_buf(),
        }
    }

    pub fn settings_path(&self) -> PathBuf {
        self.output_dir.join(SETTINGS_FILE)
    }

    pub fn trace_path(&self) -> PathBuf {
        self.output_dir.join(TRACE_FILE)
    }

    pub fn trace_short_path(&self) -> PathBuf {
        self.output_dir.join(TRACE_SHORT_FILE)
    }

    pub fn races_path(&self) -> PathBuf {
        self.output_dir.join(RACES_FILE)
    }
}
