//! Detected data races.

use crate::instruction::Instruction;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A pair of concurrently-pending memory instructions on the same object
/// from different threads, at least one a write.
///
/// `first` is the instruction that was already pending when `second` was
/// requested. The pair is unordered for equality purposes: `(a, b)` and
/// `(b, a)` describe the same race.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct DataRace {
    pub first: Instruction,
    pub second: Instruction,
}

impl DataRace {
    pub fn new(first: Instruction, second: Instruction) -> Self {
        debug_assert_ne!(first.tid, second.tid, "a thread cannot race with itself");
        Self { first, second }
    }
}

impl PartialEq for DataRace {
    fn eq(&self, other: &Self) -> bool {
        (self.first == other.first && self.second == other.second)
            || (self.first == other.second && self.second == other.first)
    }
}

impl fmt::Display for DataRace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "data race on {}: {} <-> {}", self.first.object, self.first, self.second)
    }
}

/// All races detected during one run; the persisted race-report artifact.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RaceReport {
    pub races: Vec<DataRace>,
}

impl RaceReport {
    pub fn new(races: Vec<DataRace>) -> Self {
        Self { races }
    }

    pub fn is_empty(&self) -> bool {
        self.races.is_empty()
    }

    pub fn len(&self) -> usize {
        self.races.len()
    }
}
