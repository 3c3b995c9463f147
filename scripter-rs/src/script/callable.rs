//! Callable kinds.
//!
//! Resolution of an identifier, an indexed identifier, or an operator token
//! always yields one variant of the closed [`Callable`] enum.  Variants are
//! prototypes: they are shared immutably and never hold per-call state.
//! Invocation (see [`dispatch`](super::dispatch)) builds a fresh activation
//! frame for each call, so recursive and re-entrant calls cannot observe each
//! other's bindings.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::LazyLock;

use regex::Regex;

use super::error::{Result, ScriptError};
use super::interp::Interpreter;
use super::location::Location;
use super::scope::{Binding, Frame};
use super::stmt::Stmt;
use super::value::{ArrayRef, Value};

/// Native implementation signature shared by builtins and bound
/// pseudo-methods.
pub type NativeFn = dyn Fn(&mut Interpreter, &[Value]) -> Result<Value>;

/// Combining function of a compound action operator (`current op operand`).
pub type CombineFn = dyn Fn(&Value, &Value) -> Result<Value>;

/// Registered action operators, keyed by token text.
pub type ActionTable = HashMap<Rc<str>, ActionOperator>;

// ── Callable ──────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub enum Callable {
    /// Script function: parameter list + body.
    UserDefined(Rc<UserFunction>),
    /// Host-native function with a declared minimum arity.
    Builtin(Builtin),
    /// Operator token bound to the identifier it assigns to; `rest` is the
    /// source after the identifier.
    Action {
        target: Rc<str>,
        rest: Rc<str>,
        op: ActionOperator,
    },
    /// An element of a container, addressed by index.
    ArrayElement { array: ArrayRef, index: i64 },
    /// Raw token text with no binding, parsed as a quoted string or number
    /// when invoked.
    LiteralFallback(LiteralToken),
}

impl Callable {
    pub fn name(&self) -> &str {
        match self {
            Callable::UserDefined(f) => &f.name,
            Callable::Builtin(b) => &b.name,
            Callable::Action { op, .. } => &op.token,
            Callable::ArrayElement { .. } => "[]",
            Callable::LiteralFallback(lit) => &lit.raw,
        }
    }

    /// `true` when both handles refer to the same function prototype.
    pub fn same_prototype(&self, other: &Callable) -> bool {
        match (self, other) {
            (Callable::UserDefined(a), Callable::UserDefined(b)) => Rc::ptr_eq(a, b),
            (Callable::Builtin(a), Callable::Builtin(b)) => Rc::ptr_eq(&a.func, &b.func),
            _ => false,
        }
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callable::UserDefined(func) => f
                .debug_struct("UserDefined")
                .field("name", &func.name)
                .field("params", &func.params)
                .finish(),
            Callable::Builtin(b) => fmt::Debug::fmt(b, f),
            Callable::Action { target, op, .. } => f
                .debug_struct("Action")
                .field("target", target)
                .field("token", &op.token)
                .finish(),
            Callable::ArrayElement { index, .. } => {
                f.debug_struct("ArrayElement").field("index", index).finish()
            }
            Callable::LiteralFallback(lit) => {
                f.debug_tuple("LiteralFallback").field(&lit.raw).finish()
            }
        }
    }
}

// ── UserFunction ──────────────────────────────────────────────────────────────

/// A function declared by a script.
#[derive(Debug)]
pub struct UserFunction {
    pub name: Rc<str>,
    pub params: Vec<Rc<str>>,
    pub body: Rc<[Stmt]>,
}

impl UserFunction {
    /// Build the activation frame for one call.  Missing arguments are bound
    /// to [`Value::Empty`]; extra arguments are ignored.
    pub fn activate(&self, args: Vec<Value>) -> Frame {
        let mut frame = Frame::new(Some(Rc::clone(&self.name)));
        let mut args = args.into_iter();
        for param in &self.params {
            let value = args.next().unwrap_or_default();
            frame.bind(Rc::clone(param), Binding::Variable(value));
        }
        frame
    }
}

// ── Builtin ───────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct Builtin {
    pub name: Rc<str>,
    pub min_arity: usize,
    pub func: Rc<NativeFn>,
}

impl Builtin {
    pub fn new(
        name: impl Into<Rc<str>>,
        min_arity: usize,
        func: impl Fn(&mut Interpreter, &[Value]) -> Result<Value> + 'static,
    ) -> Self {
        Builtin {
            name: name.into(),
            min_arity,
            func: Rc::new(func),
        }
    }

    pub fn check_arity(&self, actual: usize) -> Result<()> {
        if actual < self.min_arity {
            return Err(ScriptError::ArgumentCount {
                function: self.name.to_string(),
                required: self.min_arity,
                actual,
            });
        }
        Ok(())
    }
}

impl fmt::Debug for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builtin")
            .field("name", &self.name)
            .field("min_arity", &self.min_arity)
            .finish_non_exhaustive()
    }
}

// ── ActionOperator ────────────────────────────────────────────────────────────

#[derive(Clone)]
pub enum ActionKind {
    /// `=`
    Assign,
    /// `+=`, `-=`, … : `current combine operand`.
    Compound(Rc<CombineFn>),
    /// `++` / `--`: add a fixed delta, no operand.
    Step(f64),
}

/// An operator token registered in the interpreter's action table.
#[derive(Clone)]
pub struct ActionOperator {
    pub token: Rc<str>,
    pub kind: ActionKind,
}

impl ActionOperator {
    pub fn assign(token: &str) -> Self {
        ActionOperator {
            token: token.into(),
            kind: ActionKind::Assign,
        }
    }

    pub fn compound(
        token: &str,
        combine: impl Fn(&Value, &Value) -> Result<Value> + 'static,
    ) -> Self {
        ActionOperator {
            token: token.into(),
            kind: ActionKind::Compound(Rc::new(combine)),
        }
    }

    pub fn step(token: &str, delta: f64) -> Self {
        ActionOperator {
            token: token.into(),
            kind: ActionKind::Step(delta),
        }
    }

    /// Whether the operator is written with a right-hand operand.
    pub fn takes_operand(&self) -> bool {
        !matches!(self.kind, ActionKind::Step(_))
    }

    /// Apply the operator to an already-resolved location and return the
    /// stored value.  The location is read at most once and written once.
    pub fn apply(&self, interp: &mut Interpreter, loc: &Location, operand: Value) -> Result<Value> {
        let new_value = match &self.kind {
            ActionKind::Assign => operand,
            ActionKind::Compound(combine) => combine(&loc.read(interp)?, &operand)?,
            ActionKind::Step(delta) => Value::Number(loc.read(interp)?.as_number()? + delta),
        };
        loc.write(interp, new_value.clone())?;
        Ok(new_value)
    }
}

impl fmt::Debug for ActionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ActionOperator").field(&self.token).finish()
    }
}

// ── LiteralToken ──────────────────────────────────────────────────────────────

static NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?$").expect("number pattern")
});

/// Unbound raw token text plus the source that followed it, kept for the
/// parse error raised when the text is not a literal either.
#[derive(Debug, Clone)]
pub struct LiteralToken {
    pub raw: Rc<str>,
    pub rest: Rc<str>,
}

impl LiteralToken {
    pub fn new(raw: impl Into<Rc<str>>, rest: impl Into<Rc<str>>) -> Self {
        LiteralToken {
            raw: raw.into(),
            rest: rest.into(),
        }
    }

    /// Interpret the raw text as a quoted string or a number.
    pub fn parse(&self) -> Result<Value> {
        parse_literal(&self.raw).ok_or_else(|| ScriptError::parse(&*self.raw, &self.rest))
    }
}

/// Parse `"text"`, `'text'` or a decimal number literal.
pub fn parse_literal(raw: &str) -> Option<Value> {
    let raw = raw.trim();
    for quote in ['"', '\''] {
        if raw.len() >= 2 && raw.starts_with(quote) && raw.ends_with(quote) {
            return Some(Value::string(&raw[1..raw.len() - 1]));
        }
    }
    if NUMBER.is_match(raw) {
        return raw.parse::<f64>().ok().map(Value::Number);
    }
    None
}
