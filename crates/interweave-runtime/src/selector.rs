//! Thread selection: replay-first, then a pluggable policy.
//!
//! The [`Selector`] is the template every run goes through:
//!
//! 1. A recorded schedule step, when one exists, is followed absolutely —
//!    deterministic replay is uniform across all policies.
//! 2. With no recorded step left, the pool's [`SelectorView`] decides
//!    between the terminal statuses (DONE, DEADLOCK, BLOCKED).
//! 3. Otherwise a [`SelectionPolicy`] picks one thread from the enabled
//!    set. Policies only ever see that case.
//!
//! Policies are looked up by name in a [`PolicyRegistry`]; an unknown name
//! falls back to non-preemptive with a logged warning, never a hard
//! failure.

use crate::task_pool::SelectorView;
use interweave_model::{RunStatus, ThreadId};
use rand::RngCore;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use std::collections::HashMap;

/// One scheduling decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub status: RunStatus,
    /// The chosen thread; present iff `status` is `Running`.
    pub tid: Option<ThreadId>,
}

impl Selection {
    fn running(tid: ThreadId) -> Self {
        Self {
            status: RunStatus::Running,
            tid: Some(tid),
        }
    }

    fn terminal(status: RunStatus) -> Self {
        debug_assert!(status.is_terminal());
        Self { status, tid: None }
    }
}

/// A policy over the enabled set. Only consulted when no recorded
/// schedule step applies and the enabled set is non-empty.
pub trait SelectionPolicy: Send {
    fn name(&self) -> &'static str;

    /// Pick one thread. `enabled` is non-empty and ascending;
    /// `previous` is the thread granted in the preceding round.
    fn choose(&mut self, enabled: &[ThreadId], previous: Option<ThreadId>) -> ThreadId;
}

/// Uniform-random choice among enabled threads, from a seeded PRNG so a
/// run is reproducible from its settings.
pub struct RandomPolicy {
    rng: ChaCha20Rng,
}

impl RandomPolicy {
    pub fn new(seed: u64) -> Self {
        let mut key = [0u8; 32];
        // Domain-separated seed for the selection RNG
        let derived = seed.wrapping_add(0x53_454c_4543_5430); // "SELECT0"
        key[..8].copy_from_slice(&derived.to_le_bytes());
        Self {
            rng: ChaCha20Rng::from_seed(key),
        }
    }
}

impl SelectionPolicy for RandomPolicy {
    fn name(&self) -> &'static str {
        "random"
    }

    fn choose(&mut self, enabled: &[ThreadId], _previous: Option<ThreadId>) -> ThreadId {
        let index = (self.rng.next_u64() % enabled.len() as u64) as usize;
        enabled[index]
    }
}

/// Keep running the previous thread while it stays enabled; otherwise the
/// lowest enabled id. Minimizes preemptions, which keeps traces short and
/// readable.
#[derive(Default)]
pub struct NonPreemptivePolicy;

impl SelectionPolicy for NonPreemptivePolicy {
    fn name(&self) -> &'static str {
        "non-preemptive"
    }

    fn choose(&mut self, enabled: &[ThreadId], previous: Option<ThreadId>) -> ThreadId {
        if let Some(prev) = previous {
            if enabled.contains(&prev) {
                return prev;
            }
        }
        enabled[0]
    }
}

type PolicyFactory = Box<dyn Fn(u64) -> Box<dyn SelectionPolicy> + Send + Sync>;

/// Named policy constructors. Ships with the built-ins; custom policies
/// register alongside them.
pub struct PolicyRegistry {
    factories: HashMap<String, PolicyFactory>,
}

impl PolicyRegistry {
    /// Registry with the built-in policies: "random", "non-preemptive".
    pub fn new() -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
        };
        registry.register("random", |seed| Box::new(RandomPolicy::new(seed)));
        registry.register("non-preemptive", |_| Box::new(NonPreemptivePolicy));
        registry
    }

    /// Register a custom policy under `name`, replacing any previous
    /// registration.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        factory: impl Fn(u64) -> Box<dyn SelectionPolicy> + Send + Sync + 'static,
    ) {
        self.factories.insert(name.into(), Box::new(factory));
    }

    /// Build the policy for a settings tag. Unknown tags fall back to
    /// non-preemptive with a warning.
    pub fn build(&self, tag: &str, seed: u64) -> Box<dyn SelectionPolicy> {
        match self.factories.get(tag) {
            Some(factory) => factory(seed),
            None => {
                log::warn!(
                    "unknown selection policy {:?}, falling back to non-preemptive",
                    tag,
                );
                Box::new(NonPreemptivePolicy)
            }
        }
    }
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Replay-first selection template.
pub struct Selector {
    schedule: Vec<ThreadId>,
    policy: Box<dyn SelectionPolicy>,
    previous: Option<ThreadId>,
}

impl Selector {
    pub fn new(schedule: Vec<ThreadId>, policy: Box<dyn SelectionPolicy>) -> Self {
        Self {
            schedule,
            policy,
            previous: None,
        }
    }

    /// Name of the underlying policy.
    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    /// Decide which thread runs at `step`, from one consistent scheduling
    /// view of the pool.
    pub fn select(&mut self, view: &SelectorView, step: usize) -> Selection {
        // Deterministic replay takes absolute precedence.
        if let Some(&tid) = self.schedule.get(step) {
            self.previous = Some(tid);
            return Selection::running(tid);
        }

        if view.registered == 0 || view.live == 0 {
            return Selection::terminal(RunStatus::Done);
        }
        if view.enabled.is_empty() {
            return if view.blocked.is_empty() {
                Selection::terminal(RunStatus::Blocked)
            } else {
                Selection::terminal(RunStatus::Deadlock)
            };
        }

        let tid = self.policy.choose(&view.enabled, self.previous);
        self.previous = Some(tid);
        Selection::running(tid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task_pool::TaskPool;
    use interweave_model::{Instruction, Object, Operation, SourceLocation};

    fn ins(tid: ThreadId, op: Operation, object: Object) -> Instruction {
        Instruction::new(tid, op, object, false, SourceLocation::new("sel.c", 1))
    }

    fn pool_with_posts(n: ThreadId, posts: &[(ThreadId, Operation, Object)]) -> TaskPool {
        let pool = TaskPool::new(n as usize);
        for tid in 0..n {
            pool.register_thread(tid);
            pool.activate_thread(tid);
        }
        for (tid, op, obj) in posts {
            pool.post(*tid, ins(*tid, *op, *obj));
        }
        pool
    }

    #[test]
    fn recorded_schedule_takes_precedence() {
        let pool = pool_with_posts(2, &[]);
        // even a nonsensical schedule entry is followed; the scheduler
        // surfaces the inconsistency, not the selector
        let mut selector = Selector::new(vec![1, 0, 1], Box::new(NonPreemptivePolicy));
        assert_eq!(selector.select(&pool.selector_view(), 0), Selection::running(1));
        assert_eq!(selector.select(&pool.selector_view(), 2), Selection::running(1));
    }

    #[test]
    fn done_when_all_threads_finished() {
        let pool = pool_with_posts(2, &[]);
        pool.finish(0);
        pool.finish(1);
        let mut selector = Selector::new(vec![], Box::new(NonPreemptivePolicy));
        assert_eq!(
            selector.select(&pool.selector_view(), 0).status,
            RunStatus::Done,
        );
    }

    #[test]
    fn deadlock_when_enabled_empty_with_blocked_instructions() {
        let x = Object::new(0x1);
        let y = Object::new(0x2);
        let pool = pool_with_posts(2, &[(0, Operation::Lock, x), (1, Operation::Lock, y)]);
        pool.set_current(0).unwrap();
        pool.yield_task(0);
        pool.set_current(1).unwrap();
        pool.yield_task(1);
        pool.post(0, ins(0, Operation::Lock, y));
        pool.post(1, ins(1, Operation::Lock, x));

        let mut selector = Selector::new(vec![], Box::new(NonPreemptivePolicy));
        let selection = selector.select(&pool.selector_view(), 0);
        assert_eq!(selection.status, RunStatus::Deadlock);
        assert_eq!(selection.tid, None);
    }

    #[test]
    fn blocked_when_enabled_empty_with_nothing_pending() {
        // live threads with neither an enabled instruction nor a blocked
        // one: stuck outside the runtime's view (uninstrumented waits)
        let view = SelectorView {
            registered: 2,
            live: 1,
            enabled: Vec::new(),
            blocked: Vec::new(),
        };
        let mut selector = Selector::new(vec![], Box::new(NonPreemptivePolicy));
        let selection = selector.select(&view, 0);
        assert_eq!(selection.status, RunStatus::Blocked);
        assert_eq!(selection.tid, None);
    }

    #[test]
    fn non_preemptive_prefers_previous_then_lowest() {
        let mut policy = NonPreemptivePolicy;
        assert_eq!(policy.choose(&[0, 1, 2], None), 0);
        assert_eq!(policy.choose(&[0, 1, 2], Some(2)), 2);
        assert_eq!(policy.choose(&[0, 1], Some(2)), 0);
    }

    #[test]
    fn random_policy_deterministic_per_seed() {
        let draw = |seed: u64| -> Vec<ThreadId> {
            let mut policy = RandomPolicy::new(seed);
            (0..32).map(|_| policy.choose(&[0, 1, 2, 3], None)).collect()
        };
        assert_eq!(draw(42), draw(42));
        assert_ne!(draw(42), draw(43));
    }

    #[test]
    fn random_policy_stays_in_enabled_set() {
        let mut policy = RandomPolicy::new(7);
        for _ in 0..64 {
            let tid = policy.choose(&[3, 5], None);
            assert!(tid == 3 || tid == 5);
        }
    }

    #[test]
    fn unknown_policy_falls_back_to_non_preemptive() {
        let registry = PolicyRegistry::new();
        let policy = registry.build("definitely-not-registered", 0);
        assert_eq!(policy.name(), "non-preemptive");
    }

    #[test]
    fn custom_policy_registration() {
        struct HighestId;
        impl SelectionPolicy for HighestId {
            fn name(&self) -> &'static str {
                "highest-id"
            }
            fn choose(&mut self, enabled: &[ThreadId], _: Option<ThreadId>) -> ThreadId {
                *enabled.last().unwrap()
            }
        }

        let mut registry = PolicyRegistry::new();
        registry.register("highest-id", |_| Box::new(HighestId));
        let mut policy = registry.build("highest-id", 0);
        assert_eq!(policy.name(), "highest-id");
        assert_eq!(policy.choose(&[0, 4, 9], None), 9);
    }
}
