//! Resolution of call sites to [`Callable`]s, and invocation.
//!
//! Every decision about what a name or token *means* is made here, once:
//! an operator token registered in the action table yields an
//! [`Callable::Action`], `name[index]` yields an [`Callable::ArrayElement`],
//! a bound identifier yields its binding, and anything else becomes a
//! [`Callable::LiteralFallback`].  Call sites match on the result and never
//! re-inspect the token text.

use std::ops::{Deref, DerefMut};
use std::rc::Rc;

use tracing::trace;

use super::callable::{Callable, LiteralToken, UserFunction};
use super::error::{Result, ScriptError};
use super::interp::{ControlFlow, Interpreter};
use super::location::{element_at, Location};
use super::scope::{Binding, Frame};
use super::stack::ensure_sufficient_stack;
use super::value::Value;

// ── FrameGuard ────────────────────────────────────────────────────────────────

/// Pops the scope stack back to its depth at construction when dropped.
///
/// Holds `&mut Interpreter` and derefs to it, so code inside the frame uses
/// the guard exactly like the interpreter.  Error returns and panics both run
/// `Drop`, which is what keeps push/pop balanced.
pub struct FrameGuard<'a> {
    interp: &'a mut Interpreter,
    depth: usize,
}

impl<'a> FrameGuard<'a> {
    pub fn push(interp: &'a mut Interpreter, frame: Frame) -> Self {
        let depth = interp.scope.depth();
        interp.scope.push(frame);
        FrameGuard { interp, depth }
    }
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        self.interp.scope.unwind_to(self.depth);
    }
}

impl Deref for FrameGuard<'_> {
    type Target = Interpreter;

    fn deref(&self) -> &Interpreter {
        self.interp
    }
}

impl DerefMut for FrameGuard<'_> {
    fn deref_mut(&mut self) -> &mut Interpreter {
        self.interp
    }
}

// ── Dispatch ──────────────────────────────────────────────────────────────────

impl Interpreter {
    /// Run `f` with `frame` pushed; the frame is popped on every exit path.
    pub fn with_frame<T>(&mut self, frame: Frame, f: impl FnOnce(&mut Interpreter) -> T) -> T {
        let mut guard = FrameGuard::push(self, frame);
        f(&mut guard)
    }

    /// Resolve `name` (optionally followed by an operator token) to a binding.
    pub fn resolve_callable(&self, name: &str, token: Option<&str>) -> Binding {
        self.resolve_callable_at(name, token, "")
    }

    /// Like [`resolve_callable`](Self::resolve_callable); `rest` is the source
    /// following `name`, quoted by the parse error if the literal fallback
    /// fails.
    pub fn resolve_callable_at(&self, name: &str, token: Option<&str>, rest: &str) -> Binding {
        if let Some(op) = token.and_then(|t| self.actions.get(t)) {
            trace!(name, token = %op.token, "dispatch: action");
            return Binding::Callable(Callable::Action {
                target: name.into(),
                rest: rest.into(),
                op: op.clone(),
            });
        }
        if name.ends_with(']') {
            if let Some(element) = self.scope.resolve_indexed(name) {
                trace!(name, "dispatch: array element");
                return Binding::Callable(element);
            }
        }
        if let Some(binding) = self.scope.resolve(name) {
            trace!(name, "dispatch: bound");
            return binding.clone();
        }
        trace!(name, "dispatch: literal fallback");
        Binding::Callable(Callable::LiteralFallback(LiteralToken::new(name, rest)))
    }

    /// Invoke `callable` with already-evaluated arguments.
    pub fn invoke(&mut self, callable: &Callable, args: Vec<Value>) -> Result<Value> {
        match callable {
            Callable::Builtin(b) => {
                b.check_arity(args.len())?;
                let func = Rc::clone(&b.func);
                func(self, &args)
            }
            Callable::UserDefined(func) => self.call_user(func, args),
            Callable::Action { target, rest, op } => {
                let operand = args.into_iter().next().unwrap_or_default();
                let loc = Location::Variable {
                    name: Rc::clone(target),
                    rest: Rc::clone(rest),
                };
                op.apply(self, &loc, operand)
            }
            Callable::ArrayElement { array, index } => element_at(array, *index),
            Callable::LiteralFallback(lit) => lit.parse(),
        }
    }

    /// Read the value a binding denotes without calling it: variables yield
    /// their value, array elements and literals are evaluated, and every other
    /// callable yields a function reference.
    pub fn binding_value(&mut self, binding: Binding) -> Result<Value> {
        match binding {
            Binding::Variable(v) => Ok(v),
            Binding::Callable(c @ (Callable::ArrayElement { .. } | Callable::LiteralFallback(_))) => {
                self.invoke(&c, Vec::new())
            }
            Binding::Callable(c) => Ok(Value::Function(c)),
        }
    }

    /// Call whatever `binding` denotes.  Variables must hold a function.
    pub fn call_binding(&mut self, binding: Binding, args: Vec<Value>) -> Result<Value> {
        match binding {
            Binding::Callable(c) => self.invoke(&c, args),
            Binding::Variable(v) => {
                let callable = v.as_function()?;
                self.invoke(&callable, args)
            }
        }
    }

    #[tracing::instrument(level = "debug", skip_all, fields(function = %func.name))]
    fn call_user(&mut self, func: &Rc<UserFunction>, args: Vec<Value>) -> Result<Value> {
        let frame = func.activate(args);
        let body = Rc::clone(&func.body);
        ensure_sufficient_stack(|| {
            self.with_frame(frame, |interp| match interp.exec_block(&body)? {
                Some(ControlFlow::Return(v)) => Ok(v),
                Some(ControlFlow::Break | ControlFlow::Continue) => Err(ScriptError::runtime(
                    format!("break or continue outside a loop in {}", func.name),
                )),
                None => Ok(Value::Empty),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::callable::Builtin;

    #[test]
    fn action_token_wins() {
        let interp = Interpreter::new();
        assert!(matches!(
            interp.resolve_callable("x", Some("+=")),
            Binding::Callable(Callable::Action { ref target, .. }) if &**target == "x"
        ));
    }

    #[test]
    fn unregistered_token_falls_through() {
        let interp = Interpreter::new();
        assert!(matches!(
            interp.resolve_callable("x", Some("<>=")),
            Binding::Callable(Callable::LiteralFallback(_))
        ));
    }

    #[test]
    fn indexed_then_bound_then_literal() {
        let mut interp = Interpreter::new();
        interp.bind_global("a", Value::array(vec![Value::from("z")]));
        assert!(matches!(
            interp.resolve_callable("a[0]", None),
            Binding::Callable(Callable::ArrayElement { index: 0, .. })
        ));
        assert!(matches!(interp.resolve_callable("a", None), Binding::Variable(_)));
        assert!(matches!(
            interp.resolve_callable("'quoted'", None),
            Binding::Callable(Callable::LiteralFallback(_))
        ));
    }

    #[test]
    fn literal_fallback_invocation() {
        let mut interp = Interpreter::new();
        let Binding::Callable(c) = interp.resolve_callable("12.5", None) else {
            panic!("expected a callable");
        };
        assert_eq!(interp.invoke(&c, vec![]).unwrap(), Value::Number(12.5));
        let Binding::Callable(c) = interp.resolve_callable_at("nope", None, "(1)") else {
            panic!("expected a callable");
        };
        assert_eq!(
            interp.invoke(&c, vec![]).unwrap_err(),
            ScriptError::parse("nope", "(1)")
        );
    }

    #[test]
    fn builtin_arity_is_checked_before_running() {
        let mut interp = Interpreter::empty();
        let b = Callable::Builtin(Builtin::new("two", 2, |_, _| panic!("must not run")));
        assert!(matches!(
            interp.invoke(&b, vec![Value::Empty]),
            Err(ScriptError::ArgumentCount { required: 2, actual: 1, .. })
        ));
    }

    #[test]
    fn action_invocation_updates_variable() {
        let mut interp = Interpreter::new();
        interp.bind_global("n", Value::Number(4.0));
        let Binding::Callable(add) = interp.resolve_callable("n", Some("+=")) else {
            panic!("expected an action");
        };
        assert_eq!(interp.invoke(&add, vec![Value::Number(3.0)]).unwrap(), Value::Number(7.0));
        let Binding::Callable(inc) = interp.resolve_callable("n", Some("++")) else {
            panic!("expected an action");
        };
        interp.invoke(&inc, vec![]).unwrap();
        assert_eq!(interp.get_global("n"), Some(Value::Number(8.0)));
    }

    #[test]
    fn frame_guard_pops_on_error() {
        let mut interp = Interpreter::empty();
        let result: Result<()> = interp.with_frame(Frame::new(None), |inner| {
            inner.with_frame(Frame::new(None), |_| Err(ScriptError::runtime("boom")))
        });
        assert!(result.is_err());
        assert_eq!(interp.scope.depth(), 0);
    }
}
