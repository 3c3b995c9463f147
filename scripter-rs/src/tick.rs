//! Per-tick callback lists.
//!
//! Scripts (through `onUpdate` / `onFixedUpdate`) and hosts (through
//! [`Interpreter::on_tick`](crate::script::Interpreter::on_tick)) register
//! callables against a [`TickPhase`], and remove them again by the returned
//! id (`offUpdate` / `offFixedUpdate`, `clearTicks`).  The host drives the phases; each run
//! calls every callback of the phase in registration order with no
//! arguments.
//!
//! [`FixedStep`] converts the host's variable frame time into a whole number
//! of fixed-rate steps for the `FixedUpdate` phase.

use std::fmt;
use std::time::Duration;

use crate::script::Callable;

// ── TickPhase ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TickPhase {
    /// Once per host frame.
    Update,
    /// Zero or more times per host frame, at a fixed rate.
    FixedUpdate,
}

impl fmt::Display for TickPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TickPhase::Update => "update",
            TickPhase::FixedUpdate => "fixed-update",
        })
    }
}

// ── TickCallbacks ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Entry {
    id: u32,
    phase: TickPhase,
    callback: Callable,
}

/// Registered callbacks of both phases.
#[derive(Debug)]
pub struct TickCallbacks {
    entries: Vec<Entry>,
    next_id: u32,
}

impl Default for TickCallbacks {
    fn default() -> Self {
        Self::new()
    }
}

impl TickCallbacks {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 1,
        }
    }

    /// Register `callback` for `phase`.  Returns an id for [`Self::remove`].
    pub fn register(&mut self, phase: TickPhase, callback: Callable) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push(Entry { id, phase, callback });
        id
    }

    /// Remove the `phase` callback registered as `id`.  Returns `true` if
    /// found.
    pub fn remove(&mut self, phase: TickPhase, id: u32) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id || e.phase != phase);
        self.entries.len() < before
    }

    /// Remove every callback of both phases.  Returns how many there were.
    pub fn clear(&mut self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        removed
    }

    /// The callbacks of `phase`, in registration order.
    ///
    /// Returned by value: a callback may register further callbacks while the
    /// phase runs, and those only take effect from the next run.
    pub fn snapshot(&self, phase: TickPhase) -> Vec<Callable> {
        self.entries
            .iter()
            .filter(|e| e.phase == phase)
            .map(|e| e.callback.clone())
            .collect()
    }

    pub fn count(&self, phase: TickPhase) -> usize {
        self.entries.iter().filter(|e| e.phase == phase).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ── FixedStep ─────────────────────────────────────────────────────────────────

/// Accumulates frame time and reports how many fixed steps are due.
#[derive(Debug, Clone)]
pub struct FixedStep {
    step: Duration,
    pending: Duration,
}

impl FixedStep {
    /// A zero `step` is clamped to one millisecond.
    pub fn new(step: Duration) -> Self {
        Self {
            step: step.max(Duration::from_millis(1)),
            pending: Duration::ZERO,
        }
    }

    pub fn step(&self) -> Duration {
        self.step
    }

    /// Add `elapsed` and return the number of whole steps now due.  The
    /// remainder carries over to the next call, so steps do not drift.
    pub fn advance(&mut self, elapsed: Duration) -> u32 {
        self.pending += elapsed;
        let mut due = 0;
        while self.pending >= self.step {
            self.pending -= self.step;
            due += 1;
        }
        due
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::{Builtin, Value};

    fn noop(name: &str) -> Callable {
        Callable::Builtin(Builtin::new(name, 0, |_, _| Ok(Value::Empty)))
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn register_and_remove() {
        let mut t = TickCallbacks::new();
        let id = t.register(TickPhase::Update, noop("a"));
        assert_eq!(t.len(), 1);
        assert!(!t.remove(TickPhase::FixedUpdate, id));
        assert!(t.remove(TickPhase::Update, id));
        assert!(t.is_empty());
        assert!(!t.remove(TickPhase::Update, id));
    }

    #[test]
    fn snapshot_filters_by_phase_in_order() {
        let mut t = TickCallbacks::new();
        t.register(TickPhase::Update, noop("a"));
        t.register(TickPhase::FixedUpdate, noop("b"));
        t.register(TickPhase::Update, noop("c"));
        let names: Vec<String> = t
            .snapshot(TickPhase::Update)
            .iter()
            .map(|c| c.name().to_owned())
            .collect();
        assert_eq!(names, ["a", "c"]);
        assert_eq!(t.count(TickPhase::FixedUpdate), 1);
    }

    #[test]
    fn clear_removes_all() {
        let mut t = TickCallbacks::new();
        t.register(TickPhase::Update, noop("a"));
        t.register(TickPhase::FixedUpdate, noop("b"));
        assert_eq!(t.clear(), 2);
        assert!(t.is_empty());
        assert_eq!(t.clear(), 0);
    }

    #[test]
    fn fixed_step_carries_remainder() {
        let mut s = FixedStep::new(ms(20));
        assert_eq!(s.advance(ms(15)), 0);
        assert_eq!(s.advance(ms(15)), 1); // 30ms → 1 step, 10ms left
        assert_eq!(s.advance(ms(50)), 3); // 60ms → 3 steps
        assert_eq!(s.advance(ms(0)), 0);
    }

    #[test]
    fn fixed_step_zero_is_clamped() {
        let mut s = FixedStep::new(Duration::ZERO);
        assert_eq!(s.step(), ms(1));
        assert_eq!(s.advance(ms(3)), 3);
    }
}
