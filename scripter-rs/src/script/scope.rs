//! Identifier resolution: the global table plus a stack of activation frames.
//!
//! Lookup checks the *top* frame only, then the globals.  Frames below the
//! top are invisible, so a function body sees its own locals and the global
//! table, never its caller's locals.
//!
//! Frames are pushed and popped by the dispatcher through
//! [`FrameGuard`](super::dispatch::FrameGuard); `push_frame`/`pop_frame` are
//! the primitive operations behind it.

use std::collections::HashMap;
use std::rc::Rc;

use tracing::debug;

use super::callable::Callable;
use super::value::Value;

// ── Binding ───────────────────────────────────────────────────────────────────

/// The entity an identifier is bound to.
#[derive(Debug, Clone)]
pub enum Binding {
    Variable(Value),
    Callable(Callable),
}

impl Binding {
    /// Read the binding as a value; callables become function references.
    pub fn to_value(&self) -> Value {
        match self {
            Binding::Variable(v) => v.clone(),
            Binding::Callable(c) => Value::Function(c.clone()),
        }
    }
}

// ── Frame ─────────────────────────────────────────────────────────────────────

/// One activation: local bindings plus an optional diagnostic name.
#[derive(Debug, Default)]
pub struct Frame {
    name: Option<Rc<str>>,
    bindings: HashMap<Rc<str>, Binding>,
}

impl Frame {
    pub fn new(name: Option<Rc<str>>) -> Self {
        Frame {
            name,
            bindings: HashMap::new(),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn bind(&mut self, name: Rc<str>, binding: Binding) {
        self.bindings.insert(name, binding);
    }

    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.bindings.get(name)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

// ── ScopeStack ────────────────────────────────────────────────────────────────

/// Global bindings (depth 0) and the activation stack above them.
#[derive(Debug, Default)]
pub struct ScopeStack {
    globals: HashMap<Rc<str>, Binding>,
    frames: Vec<Frame>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of active frames; 0 means only the globals are in scope.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Diagnostic name of the innermost frame.
    pub fn frame_name(&self) -> Option<&str> {
        self.frames.last().and_then(Frame::name)
    }

    pub fn push_frame(&mut self, name: Option<&str>) {
        self.push(Frame::new(name.map(Rc::from)));
    }

    /// Push a prepared activation (parameters already bound).
    pub fn push(&mut self, frame: Frame) {
        debug!(depth = self.frames.len() + 1, frame = ?frame.name(), "push frame");
        self.frames.push(frame);
    }

    pub fn pop_frame(&mut self) -> Option<Frame> {
        let frame = self.frames.pop();
        debug!(depth = self.frames.len(), "pop frame");
        frame
    }

    /// Pop frames until at most `depth` remain.  Returns how many were popped.
    pub fn unwind_to(&mut self, depth: usize) -> usize {
        let extra = self.frames.len().saturating_sub(depth);
        self.frames.truncate(depth);
        extra
    }

    /// Look up `name` in the top frame, then in the globals.  `None` is the
    /// unresolved signal; callers decide on a fallback.
    pub fn resolve(&self, name: &str) -> Option<&Binding> {
        self.frames
            .last()
            .and_then(|f| f.get(name))
            .or_else(|| self.globals.get(name))
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }

    /// Bind in the top frame if one is active, otherwise globally.
    pub fn bind(&mut self, name: impl Into<Rc<str>>, binding: Binding) {
        match self.frames.last_mut() {
            Some(frame) => frame.bind(name.into(), binding),
            None => {
                self.globals.insert(name.into(), binding);
            }
        }
    }

    pub fn bind_global(&mut self, name: impl Into<Rc<str>>, binding: Binding) {
        self.globals.insert(name.into(), binding);
    }

    pub fn global(&self, name: &str) -> Option<&Binding> {
        self.globals.get(name)
    }

    /// Remove `name` from the top frame if it is bound there, otherwise from
    /// the globals.  This is the only way a global entry disappears.
    pub fn unbind(&mut self, name: &str) -> bool {
        if let Some(frame) = self.frames.last_mut() {
            if frame.bindings.remove(name).is_some() {
                return true;
            }
        }
        self.globals.remove(name).is_some()
    }

    /// Store `value` where `resolve` would find `name`; bind it with
    /// [`bind`](Self::bind) when it is unresolved.
    pub fn assign(&mut self, name: &str, value: Value) {
        if let Some(frame) = self.frames.last_mut() {
            if let Some(slot) = frame.bindings.get_mut(name) {
                *slot = Binding::Variable(value);
                return;
            }
        }
        if let Some(slot) = self.globals.get_mut(name) {
            *slot = Binding::Variable(value);
            return;
        }
        self.bind(name, Binding::Variable(value));
    }

    /// Resolve `name[index]` to an [`Callable::ArrayElement`].
    ///
    /// `index` is an integer literal or an identifier bound to an integral
    /// number.  Returns `None` (never an error) when the brackets are
    /// malformed, the base is unresolved or not an array; the index is not
    /// range-checked here.
    pub fn resolve_indexed(&self, text: &str) -> Option<Callable> {
        let inner = text.trim().strip_suffix(']')?;
        let open = inner.rfind('[')?;
        let (base, index) = (inner[..open].trim(), inner[open + 1..].trim());
        if base.is_empty() || index.is_empty() {
            return None;
        }
        let index = match index.parse::<i64>() {
            Ok(i) => i,
            Err(_) => match self.resolve(index)? {
                Binding::Variable(v) => v.as_integer().ok()?,
                Binding::Callable(_) => return None,
            },
        };
        match self.resolve(base)? {
            Binding::Variable(Value::Array(array)) => Some(Callable::ArrayElement {
                array: Rc::clone(array),
                index,
            }),
            _ => None,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn var(n: f64) -> Binding {
        Binding::Variable(Value::Number(n))
    }

    fn number(stack: &ScopeStack, name: &str) -> Option<f64> {
        stack.resolve(name).and_then(|b| b.to_value().as_number().ok())
    }

    #[test]
    fn bind_without_frame_is_global() {
        let mut stack = ScopeStack::new();
        stack.bind("x", var(1.0));
        assert_eq!(stack.depth(), 0);
        assert!(stack.global("x").is_some());
    }

    #[test]
    fn local_shadows_global_until_pop() {
        let mut stack = ScopeStack::new();
        stack.bind("x", var(1.0));
        stack.push_frame(Some("f"));
        stack.bind("x", var(2.0));
        assert_eq!(number(&stack, "x"), Some(2.0));
        stack.pop_frame();
        assert_eq!(number(&stack, "x"), Some(1.0));
    }

    #[test]
    fn only_top_frame_is_visible() {
        let mut stack = ScopeStack::new();
        stack.push_frame(Some("outer"));
        stack.bind("y", var(5.0));
        stack.push_frame(Some("inner"));
        assert!(stack.resolve("y").is_none());
        stack.pop_frame();
        assert_eq!(number(&stack, "y"), Some(5.0));
    }

    #[test]
    fn assign_updates_global_from_frame() {
        let mut stack = ScopeStack::new();
        stack.bind("g", var(1.0));
        stack.push_frame(None);
        stack.assign("g", Value::Number(9.0));
        stack.assign("fresh", Value::Number(3.0));
        stack.pop_frame();
        assert_eq!(number(&stack, "g"), Some(9.0));
        assert!(stack.resolve("fresh").is_none());
    }

    #[test]
    fn unbind_is_explicit() {
        let mut stack = ScopeStack::new();
        stack.bind("x", var(1.0));
        stack.push_frame(None);
        stack.pop_frame();
        assert!(stack.is_bound("x"));
        assert!(stack.unbind("x"));
        assert!(!stack.is_bound("x"));
        assert!(!stack.unbind("x"));
    }

    #[test]
    fn unwind_to_depth() {
        let mut stack = ScopeStack::new();
        for i in 0..5 {
            stack.push_frame(Some(&format!("f{i}")));
        }
        assert_eq!(stack.frame_name(), Some("f4"));
        assert_eq!(stack.unwind_to(2), 3);
        assert_eq!(stack.depth(), 2);
        assert_eq!(stack.unwind_to(4), 0);
    }

    #[test]
    fn resolve_indexed_array() {
        let mut stack = ScopeStack::new();
        stack.bind(
            "a",
            Binding::Variable(Value::array(vec![1i64.into(), 2i64.into(), 3i64.into()])),
        );
        stack.bind("i", var(2.0));
        assert!(matches!(
            stack.resolve_indexed("a[1]"),
            Some(Callable::ArrayElement { index: 1, .. })
        ));
        assert!(matches!(
            stack.resolve_indexed("a[ i ]"),
            Some(Callable::ArrayElement { index: 2, .. })
        ));
        // Not range-checked at resolution time.
        assert!(stack.resolve_indexed("a[10]").is_some());
    }

    #[test]
    fn resolve_indexed_misses_are_none() {
        let mut stack = ScopeStack::new();
        stack.bind("n", var(1.0));
        assert!(stack.resolve_indexed("missing[0]").is_none());
        assert!(stack.resolve_indexed("n[0]").is_none());
        assert!(stack.resolve_indexed("[0]").is_none());
        assert!(stack.resolve_indexed("a[").is_none());
        assert!(stack.resolve_indexed("a[]").is_none());
        assert!(stack.resolve_indexed("plain").is_none());
    }
}
