//! Stack growth for the recursive parser and evaluator.
//!
//! Nesting depth in a script is bounded only by memory: every recursive
//! entry point (expression and statement parsing, evaluation, execution and
//! user calls) goes through [`ensure_sufficient_stack`], which moves onto a
//! fresh heap-allocated segment when the red zone is reached.

/// Minimum stack space kept free before recursing.
const RED_ZONE: usize = 100 * 1024;

/// Stack segment allocated when the red zone is reached.
const STACK_PER_RECURSION: usize = 1024 * 1024;

#[inline]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}
