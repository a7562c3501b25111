//! Record/replay concurrency-control runtime for instrumented
//! multithreaded programs.
//!
//! This crate drives a target program's threads through one controlled
//! interleaving at a time: exactly one target thread executes a visible
//! instruction while every other thread is parked, the realized
//! interleaving is recorded as an [`Execution`](interweave_model::Execution),
//! data races and deadlocks are detected along the way, and a previously
//! recorded schedule can be replayed deterministically.
//!
//! # Architecture
//!
//! ```text
//! target thread          controller thread          shared state
//! ─────────────          ─────────────────          ────────────
//! post_task()  ───────▶  TaskPool (pending,         ObjectState per
//! wait_for_turn()        enabledness, races)        shared location
//!      ▲                      │
//!      │                 Selector (replay /
//!      │                 random / non-preemptive)
//!      │                      │
//! Control gate ◀──────── grant_execution_right()
//! yield_step() ───────▶  record Transition,
//! finish()               back-fill post State
//! ```
//!
//! The [`TaskPool`](task_pool::TaskPool) is the only structure mutated by
//! more than one thread and sits behind a single coarse lock. The
//! [`Control`](control::Control) gates are written only by the controller.
//! Everything recorded ends up in the model crate's passive value types.
//!
//! # Components
//!
//! 1. **[`object_state`]** — per-object pending-access tracking, the source
//!    of data-race detection and lock enabledness
//! 2. **[`task_pool`]** — thread registry, pending-instruction slots, the
//!    controller/target rendezvous point
//! 3. **[`control`]** — per-thread wake/park gates, owner-checked
//! 4. **[`selector`]** — replay-first thread selection with pluggable
//!    policies (random, non-preemptive, custom by name)
//! 5. **[`scheduler`]** — the control loop and the callback surface the
//!    instrumented program calls into
//! 6. **[`config`]** — persisted settings/schedule loading with safe
//!    defaults

pub mod config;
pub mod control;
pub mod error;
pub mod object_state;
pub mod scheduler;
pub mod selector;
pub mod task_pool;

pub use config::RunConfig;
pub use control::Control;
pub use error::RuntimeError;
pub use scheduler::{RunOutcome, Scheduler, SchedulerHandle};
pub use selector::{PolicyRegistry, Selection, SelectionPolicy, Selector};
pub use task_pool::TaskPool;
