//! Program model for the interweave concurrency-testing runtime.
//!
//! This crate defines the value types that describe a controlled execution
//! of a multithreaded target program, and the persisted formats that let a
//! run be replayed or inspected after the fact:
//!
//! 1. **[`thread`]** — thread identity and scheduling status
//! 2. **[`object`]** — identity of a shared memory location or lock
//! 3. **[`instruction`]** — one synchronization-relevant event
//! 4. **[`state`]** — an immutable recording checkpoint
//! 5. **[`execution`]** — the recorded trace: transitions + terminal status
//! 6. **[`race`]** — detected data-race pairs
//! 7. **[`persist`]** — save/load for settings, schedules, traces, races
//!
//! Everything here is passive data: no threads, no locks, no side effects
//! beyond (de)serialization. The runtime crate builds these values and the
//! model guarantees they round-trip through JSON under value equality.
//!
//! # Trace structure
//!
//! ```text
//! Execution
//!   ├── initial: State ──────────┐
//!   ├── Transition 1 {pre ───────┘, instruction, post ──┐}
//!   ├── Transition 2 {pre ───────────────────────────────┘, ...}
//!   └── ...
//! ```
//!
//! Adjacent transitions share their bracketing [`State`](state::State)
//! through `Arc` — a state is created once by the controller and referenced
//! by the transition it closes and the transition it opens.

pub mod execution;
pub mod instruction;
pub mod object;
pub mod persist;
pub mod race;
pub mod state;
pub mod thread;

pub use execution::{Execution, RunStatus, Transition};
pub use instruction::{AccessClass, Instruction, Operation, SourceLocation};
pub use object::Object;
pub use race::{DataRace, RaceReport};
pub use state::{PendingOp, State};
pub use thread::{ThreadId, ThreadStatus};
