//! Script interpreter: executes parsed statement lists.
//!
//! An [`Interpreter`] owns everything one script environment needs: the scope
//! stack, the action-operator table, the per-tick callback lists and the
//! console output buffer.  Builtins are ordinary global bindings.  Separate
//! interpreters share nothing.

use std::rc::Rc;

use tracing::{debug, warn};

use super::builtins;
use super::callable::{ActionOperator, ActionTable, Builtin, Callable};
use super::error::{Result, ScriptError};
use super::expr::{parse_expr, Expr};
use super::object::ObjectReference;
use super::scope::{Binding, ScopeStack};
use super::stack::ensure_sufficient_stack;
use super::stmt::{parse_program, Program, Stmt};
use super::value::Value;
use crate::tick::{TickCallbacks, TickPhase};

// ── ControlFlow ───────────────────────────────────────────────────────────────

/// Non-error control-flow signals that unwind statement execution.
#[derive(Debug)]
pub enum ControlFlow {
    Break,
    Continue,
    Return(Value),
}

// ── Interpreter ───────────────────────────────────────────────────────────────

/// The script interpreter.
pub struct Interpreter {
    /// Globals and activation frames.
    pub(crate) scope: ScopeStack,
    /// Action operators by token.
    pub(crate) actions: ActionTable,
    /// Callbacks run by [`Interpreter::run_tick`].
    pub ticks: TickCallbacks,
    /// Lines produced by `print`.
    pub output: Vec<String>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    /// An interpreter with the default action operators and builtin catalog.
    pub fn new() -> Self {
        let mut interp = Self::empty();
        builtins::register_all(&mut interp);
        interp
    }

    /// An interpreter with the default action operators and no builtins.
    pub fn empty() -> Self {
        let mut interp = Interpreter {
            scope: ScopeStack::new(),
            actions: ActionTable::new(),
            ticks: TickCallbacks::new(),
            output: Vec::new(),
        };
        interp.register_default_actions();
        interp
    }

    fn register_default_actions(&mut self) {
        self.register_action_operator(ActionOperator::assign("="));
        self.register_action("+=", Value::arith_add);
        self.register_action("-=", Value::arith_sub);
        self.register_action("*=", Value::arith_mul);
        self.register_action("/=", Value::arith_div);
        self.register_action("%=", Value::arith_rem);
        self.register_action_operator(ActionOperator::step("++", 1.0));
        self.register_action_operator(ActionOperator::step("--", -1.0));
    }

    // ── Registration ──────────────────────────────────────────────────────────

    /// Bind a native function globally.  Calls with fewer than `min_arity`
    /// arguments fail with [`ScriptError::ArgumentCount`].
    pub fn register_builtin(
        &mut self,
        name: &str,
        min_arity: usize,
        func: impl Fn(&mut Interpreter, &[Value]) -> Result<Value> + 'static,
    ) {
        debug!(name, min_arity, "register builtin");
        let builtin = Builtin::new(name, min_arity, func);
        self.scope
            .bind_global(name, Binding::Callable(Callable::Builtin(builtin)));
    }

    /// Register a compound operator: `target <token> operand` stores
    /// `combine(current, operand)` into `target`.
    pub fn register_action(
        &mut self,
        token: &str,
        combine: impl Fn(&Value, &Value) -> Result<Value> + 'static,
    ) {
        self.register_action_operator(ActionOperator::compound(token, combine));
    }

    pub fn register_action_operator(&mut self, op: ActionOperator) {
        debug!(token = %op.token, "register action");
        self.actions.insert(Rc::clone(&op.token), op);
    }

    pub fn bind_global(&mut self, name: &str, value: Value) {
        self.scope.bind_global(name, Binding::Variable(value));
    }

    pub fn bind_object(&mut self, name: &str, object: impl ObjectReference + 'static) {
        self.bind_global(name, Value::object(object));
    }

    /// Remove a binding (top frame first, then global).
    pub fn unbind(&mut self, name: &str) -> bool {
        self.scope.unbind(name)
    }

    /// Current value of a global; functions come back as function values.
    pub fn get_global(&self, name: &str) -> Option<Value> {
        self.scope.global(name).map(Binding::to_value)
    }

    pub fn scope(&self) -> &ScopeStack {
        &self.scope
    }

    /// Drain the lines produced by `print`.
    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.output)
    }

    // ── Parse / execute ───────────────────────────────────────────────────────

    /// Parse a script against this interpreter's action table.
    pub fn parse(&self, src: &str) -> Result<Program> {
        parse_program(src, &self.actions)
    }

    /// Run a parsed program.  Returns the value of a top-level `return`, or
    /// `Empty`.
    pub fn run(&mut self, program: &Program) -> Result<Value> {
        self.top_level(|interp| match interp.exec_block(&program.stmts)? {
            Some(ControlFlow::Return(v)) => Ok(v),
            Some(ControlFlow::Break | ControlFlow::Continue) | None => Ok(Value::Empty),
        })
    }

    /// Parse and run a script.
    pub fn exec_script(&mut self, src: &str) -> Result<Value> {
        let program = self.parse(src)?;
        self.run(&program)
    }

    /// Parse and evaluate a single expression.
    pub fn eval_expr(&mut self, src: &str) -> Result<Value> {
        let expr: Expr = parse_expr(src, &self.actions)?;
        self.top_level(|interp| expr.evaluate(interp))
    }

    /// Resolve a single token (`name`, `name[index]`, or a literal) through
    /// the dispatcher and return the value it denotes.
    pub fn lookup(&mut self, token: &str) -> Result<Value> {
        let binding = self.resolve_callable(token.trim(), None);
        self.top_level(|interp| interp.binding_value(binding))
    }

    /// Call a bound function by name from the host.
    pub fn call_function(&mut self, name: &str, args: Vec<Value>) -> Result<Value> {
        let binding = self.resolve_callable(name, None);
        self.top_level(|interp| interp.call_binding(binding, args))
    }

    /// Restore the frame depth if `f` fails.
    fn top_level<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let depth = self.scope.depth();
        let result = f(self);
        if let Err(e) = &result {
            let popped = self.scope.unwind_to(depth);
            if popped > 0 {
                warn!(popped, error = %e, "unwound frames after failed evaluation");
            }
        }
        result
    }

    /// Execute a pre-parsed block of statements.
    pub fn exec_block(&mut self, stmts: &[Stmt]) -> Result<Option<ControlFlow>> {
        for stmt in stmts {
            if let Some(cf) = self.exec_stmt(stmt)? {
                return Ok(Some(cf));
            }
        }
        Ok(None)
    }

    /// Execute a single statement.
    pub fn exec_stmt(&mut self, stmt: &Stmt) -> Result<Option<ControlFlow>> {
        ensure_sufficient_stack(|| self.exec_stmt_inner(stmt))
    }

    fn exec_stmt_inner(&mut self, stmt: &Stmt) -> Result<Option<ControlFlow>> {
        match stmt {
            Stmt::Var { name, init } => {
                let value = match init {
                    Some(e) => e.evaluate(self)?,
                    None => Value::Empty,
                };
                self.scope.bind(Rc::clone(name), Binding::Variable(value));
                Ok(None)
            }

            Stmt::Expr(e) => {
                e.evaluate(self)?;
                Ok(None)
            }

            Stmt::If {
                cond,
                then_block,
                else_block,
            } => {
                if self.condition(cond)? {
                    self.exec_block(then_block)
                } else {
                    self.exec_block(else_block)
                }
            }

            Stmt::While { cond, body } => {
                while self.condition(cond)? {
                    match self.exec_block(body)? {
                        Some(ControlFlow::Break) => break,
                        Some(ret @ ControlFlow::Return(_)) => return Ok(Some(ret)),
                        Some(ControlFlow::Continue) | None => {}
                    }
                }
                Ok(None)
            }

            Stmt::For {
                init,
                cond,
                step,
                body,
            } => {
                if let Some(init) = init {
                    self.exec_stmt(init)?;
                }
                loop {
                    if let Some(cond) = cond {
                        if !self.condition(cond)? {
                            break;
                        }
                    }
                    match self.exec_block(body)? {
                        Some(ControlFlow::Break) => break,
                        Some(ret @ ControlFlow::Return(_)) => return Ok(Some(ret)),
                        Some(ControlFlow::Continue) | None => {}
                    }
                    if let Some(step) = step {
                        step.evaluate(self)?;
                    }
                }
                Ok(None)
            }

            Stmt::Function(func) => {
                let callable = Callable::UserDefined(Rc::clone(func));
                self.scope
                    .bind(Rc::clone(&func.name), Binding::Callable(callable));
                Ok(None)
            }

            Stmt::Return(value) => {
                let v = match value {
                    Some(e) => e.evaluate(self)?,
                    None => Value::Empty,
                };
                Ok(Some(ControlFlow::Return(v)))
            }

            Stmt::Break => Ok(Some(ControlFlow::Break)),
            Stmt::Continue => Ok(Some(ControlFlow::Continue)),
            Stmt::Block(stmts) => self.exec_block(stmts),
        }
    }

    /// Conditions must be booleans; there is no truthiness.
    fn condition(&mut self, cond: &Expr) -> Result<bool> {
        cond.evaluate(self)?.as_bool()
    }

    // ── Ticks ─────────────────────────────────────────────────────────────────

    /// Register a callback for `phase`.  Returns an id for
    /// [`off_tick`](Self::off_tick).
    pub fn on_tick(&mut self, phase: TickPhase, callback: Callable) -> u32 {
        let id = self.ticks.register(phase, callback);
        debug!(%phase, id, "tick callback registered");
        id
    }

    /// Remove the `phase` callback registered as `id`.  Removing during a
    /// run takes effect from the next run.
    pub fn off_tick(&mut self, phase: TickPhase, id: u32) -> bool {
        let removed = self.ticks.remove(phase, id);
        debug!(%phase, id, removed, "tick callback removed");
        removed
    }

    /// Remove every tick callback.  Returns how many were registered.
    pub fn clear_ticks(&mut self) -> usize {
        self.ticks.clear()
    }

    /// Run every callback of `phase`.  A failing callback is logged and its
    /// error collected; the remaining callbacks still run.
    pub fn run_tick(&mut self, phase: TickPhase) -> Vec<ScriptError> {
        let mut errors = Vec::new();
        for callback in self.ticks.snapshot(phase) {
            let result = self.top_level(|interp| interp.invoke(&callback, Vec::new()));
            if let Err(e) = result {
                warn!(%phase, callback = callback.name(), error = %e, "tick callback failed");
                errors.push(e);
            }
        }
        errors
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn run(src: &str) -> Interpreter {
        let mut interp = Interpreter::new();
        interp.exec_script(src).expect("script failed");
        interp
    }

    fn output(src: &str) -> Vec<String> {
        run(src).output
    }

    fn global(interp: &Interpreter, name: &str) -> Value {
        interp.get_global(name).unwrap_or_default()
    }

    #[test]
    fn print_basic() {
        assert_eq!(output("print('hello')"), vec!["hello"]);
        assert_eq!(output("print('a', 1, true)"), vec!["a 1 true"]);
    }

    #[test]
    fn if_true_and_false() {
        let interp = run("var x = 1; if (x == 1) { result = 'one' } else { result = 'other' }");
        assert_eq!(global(&interp, "result"), Value::from("one"));
        let interp = run("var x = 2; if (x == 1) { result = 'one' } else { result = 'other' }");
        assert_eq!(global(&interp, "result"), Value::from("other"));
    }

    #[test]
    fn non_boolean_condition_is_type_mismatch() {
        let mut interp = Interpreter::new();
        assert!(matches!(
            interp.exec_script("if (1) { }"),
            Err(ScriptError::TypeMismatch { expected: "boolean", found: "number" })
        ));
    }

    #[test]
    fn while_loop_with_break_and_continue() {
        let interp = run(
            "var i = 0; var sum = 0
             while (true) {
                 i++
                 if (i > 10) break
                 if (i % 2 == 0) continue
                 sum += i
             }",
        );
        assert_eq!(global(&interp, "sum"), Value::Number(25.0));
    }

    #[test]
    fn for_loop() {
        let interp = run("var s = ''; for (var i = 0; i < 3; i++) { s += i }");
        assert_eq!(global(&interp, "s"), Value::from("012"));
    }

    #[test]
    fn function_call_and_return() {
        let interp = run("function sq(n) { return n * n }\nr = sq(9)");
        assert_eq!(global(&interp, "r"), Value::Number(81.0));
    }

    #[test]
    fn missing_arguments_are_empty() {
        let interp = run("function f(a, b) { return typeof(b) }\nr = f(1)");
        assert_eq!(global(&interp, "r"), Value::from("empty"));
    }

    #[test]
    fn local_scope_isolation() {
        let interp = run(
            "x = 'global'
             function f() { var x = 'local'; seen = x }
             f()",
        );
        assert_eq!(global(&interp, "x"), Value::from("global"));
        assert_eq!(global(&interp, "seen"), Value::from("local"));
    }

    #[test]
    fn callee_cannot_see_caller_locals() {
        let mut interp = Interpreter::new();
        let err = interp
            .exec_script(
                "function inner() { return secret }
                 function outer() { var secret = 1; return inner() }
                 outer()",
            )
            .unwrap_err();
        assert!(matches!(err, ScriptError::Parse { ref token, .. } if token == "secret"));
        assert_eq!(interp.scope().depth(), 0);
    }

    #[test]
    fn recursion() {
        let interp = run("function fib(n) { if (n < 2) return n; return fib(n - 1) + fib(n - 2) }\nr = fib(15)");
        assert_eq!(global(&interp, "r"), Value::Number(610.0));
    }

    #[test]
    fn deep_recursion_restores_depth() {
        let mut interp = Interpreter::new();
        let v = interp
            .exec_script("function down(n) { if (n == 0) return 0; return down(n - 1) }\nreturn down(2000)")
            .unwrap();
        assert_eq!(v, Value::Number(0.0));
        assert_eq!(interp.scope().depth(), 0);
    }

    #[test]
    fn error_mid_call_restores_depth() {
        let mut interp = Interpreter::new();
        interp
            .exec_script("function boom(n) { if (n == 0) return 1 / 0; return boom(n - 1) }")
            .unwrap();
        assert!(interp.exec_script("boom(20)").is_err());
        assert_eq!(interp.scope().depth(), 0);
    }

    #[test]
    fn break_outside_loop_in_function_is_error() {
        let mut interp = Interpreter::new();
        assert!(matches!(
            interp.exec_script("function f() { break }\nf()"),
            Err(ScriptError::Runtime(_))
        ));
    }

    #[test]
    fn top_level_return_value() {
        let mut interp = Interpreter::new();
        assert_eq!(interp.exec_script("return 6 * 7").unwrap(), Value::Number(42.0));
        assert_eq!(interp.exec_script("x = 1").unwrap(), Value::Empty);
    }

    #[test]
    fn program_can_run_twice() {
        let mut interp = Interpreter::new();
        let program = interp.parse("n = n + 1").unwrap();
        interp.bind_global("n", Value::Number(0.0));
        interp.run(&program).unwrap();
        interp.run(&program).unwrap();
        assert_eq!(global(&interp, "n"), Value::Number(2.0));
    }

    #[test]
    fn lookup_tokens() {
        let mut interp = Interpreter::new();
        interp.bind_global("a", Value::array(vec![1i64.into(), 2i64.into(), 3i64.into()]));
        assert_eq!(interp.lookup("a[1]").unwrap(), Value::Number(2.0));
        assert_eq!(
            interp.lookup("a[10]").unwrap_err(),
            ScriptError::IndexOutOfRange { index: 10, len: 3 }
        );
        assert!(matches!(interp.lookup("missing[0]"), Err(ScriptError::Parse { .. })));
        assert_eq!(interp.lookup("'text'").unwrap(), Value::from("text"));
        assert_eq!(interp.lookup("-2.5").unwrap(), Value::Number(-2.5));
        assert!(matches!(interp.lookup("print").unwrap(), Value::Function(_)));
    }

    #[test]
    fn host_calls_script_function() {
        let mut interp = run("function greet(who) { return 'hi ' + who }");
        assert_eq!(
            interp.call_function("greet", vec![Value::from("bob")]).unwrap(),
            Value::from("hi bob")
        );
    }

    #[test]
    fn unbind_removes_global() {
        let mut interp = run("x = 1");
        assert!(interp.unbind("x"));
        assert!(interp.get_global("x").is_none());
    }

    #[test]
    fn tick_failure_does_not_stop_later_callbacks() {
        let mut interp = run(
            "count = 0
             onUpdate(function () { count += 1 })
             onUpdate(function () { return 1 / 0 })
             onUpdate(function () { count += 10 })
             onFixedUpdate(function () { count += 100 })",
        );
        let errors = interp.run_tick(TickPhase::Update);
        assert_eq!(errors.len(), 1);
        assert_eq!(global(&interp, "count"), Value::Number(11.0));
        assert!(interp.run_tick(TickPhase::FixedUpdate).is_empty());
        assert_eq!(global(&interp, "count"), Value::Number(111.0));
        assert_eq!(interp.scope().depth(), 0);
    }

    #[test]
    fn take_output_drains() {
        let mut interp = run("print(1)\nprint(2)");
        assert_eq!(interp.take_output(), vec!["1", "2"]);
        assert!(interp.output.is_empty());
    }

    #[test]
    fn interpreters_are_isolated() {
        let a = run("shared = 1");
        let b = Interpreter::new();
        assert!(a.get_global("shared").is_some());
        assert!(b.get_global("shared").is_none());
    }
}
