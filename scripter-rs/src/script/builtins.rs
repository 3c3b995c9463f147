//! Built-in functions registered by [`Interpreter::new`].
//!
//! Each function receives the already-evaluated arguments; arity has been
//! checked against the registered minimum before it runs, so indexing up to
//! that minimum is safe.

use regex::Regex;

use super::callable::Callable;
use super::error::{Result, ScriptError};
use super::interp::Interpreter;
use super::object::MapObject;
use super::value::Value;
use crate::tick::TickPhase;

/// Register the default builtin catalog on `interp`.
pub fn register_all(interp: &mut Interpreter) {
    // ── Console / introspection ──────────────────────────────────────────────
    interp.register_builtin("print", 0, |interp, args| {
        let mut line = String::new();
        for (i, a) in args.iter().enumerate() {
            if i > 0 {
                line.push(' ');
            }
            line.push_str(&a.to_string());
        }
        interp.output.push(line);
        Ok(Value::Empty)
    });
    interp.register_builtin("typeof", 1, |_, args| Ok(Value::from(args[0].type_name())));
    interp.register_builtin("len", 1, |_, args| {
        let n = match &args[0] {
            Value::Array(items) => items.borrow().len(),
            other => other.as_string()?.chars().count(),
        };
        Ok(Value::Number(n as f64))
    });

    // ── Conversion ───────────────────────────────────────────────────────────
    interp.register_builtin("toNumber", 1, |_, args| match &args[0] {
        Value::Number(n) => Ok(Value::Number(*n)),
        other => {
            let s = other.as_string()?;
            s.trim()
                .parse::<f64>()
                .map(Value::Number)
                .map_err(|_| ScriptError::runtime(format!("toNumber: cannot convert '{s}'")))
        }
    });
    interp.register_builtin("toString", 1, |_, args| Ok(Value::from(args[0].to_string())));

    // ── Containers ───────────────────────────────────────────────────────────
    interp.register_builtin("object", 0, |_, _| Ok(Value::object(MapObject::new())));
    interp.register_builtin("add", 2, |_, args| {
        let array = args[0].as_array()?;
        let index = match args.get(2) {
            Some(v) => v.as_integer()?,
            None => -1,
        };
        {
            let mut items = array.borrow_mut();
            let len = items.len();
            if index < 0 {
                items.push(args[1].clone());
            } else if (index as usize) <= len {
                items.insert(index as usize, args[1].clone());
            } else {
                return Err(ScriptError::IndexOutOfRange { index, len });
            }
        }
        Ok(Value::Array(array))
    });

    // ── Math ─────────────────────────────────────────────────────────────────
    interp.register_builtin("abs", 1, |_, args| Ok(Value::Number(get_num(args, 0)?.abs())));
    interp.register_builtin("floor", 1, |_, args| {
        Ok(Value::Number(get_num(args, 0)?.floor()))
    });
    interp.register_builtin("sqrt", 1, |_, args| {
        let n = get_num(args, 0)?;
        if n < 0.0 {
            return Err(ScriptError::runtime(format!("sqrt: negative argument {n}")));
        }
        Ok(Value::Number(n.sqrt()))
    });
    interp.register_builtin("min", 2, |_, args| {
        Ok(Value::Number(get_num(args, 0)?.min(get_num(args, 1)?)))
    });
    interp.register_builtin("max", 2, |_, args| {
        Ok(Value::Number(get_num(args, 0)?.max(get_num(args, 1)?)))
    });

    // ── Strings ──────────────────────────────────────────────────────────────
    interp.register_builtin("matches", 2, |_, args| {
        let text = args[0].as_string()?;
        let pattern = args[1].as_string()?;
        let re = Regex::new(&pattern)
            .map_err(|e| ScriptError::runtime(format!("matches: bad pattern: {e}")))?;
        Ok(Value::Bool(re.is_match(&text)))
    });

    // ── Ticks ────────────────────────────────────────────────────────────────
    interp.register_builtin("onUpdate", 1, |interp, args| {
        register_tick(interp, TickPhase::Update, &args[0])
    });
    interp.register_builtin("onFixedUpdate", 1, |interp, args| {
        register_tick(interp, TickPhase::FixedUpdate, &args[0])
    });
    interp.register_builtin("offUpdate", 1, |interp, args| {
        remove_tick(interp, TickPhase::Update, &args[0])
    });
    interp.register_builtin("offFixedUpdate", 1, |interp, args| {
        remove_tick(interp, TickPhase::FixedUpdate, &args[0])
    });
    interp.register_builtin("clearTicks", 0, |interp, _| {
        Ok(Value::Number(interp.clear_ticks() as f64))
    });
}

fn register_tick(interp: &mut Interpreter, phase: TickPhase, f: &Value) -> Result<Value> {
    let callable: Callable = f.as_function()?;
    let id = interp.on_tick(phase, callable);
    Ok(Value::Number(f64::from(id)))
}

/// Ids that are not whole numbers in range never match a callback.
fn remove_tick(interp: &mut Interpreter, phase: TickPhase, id: &Value) -> Result<Value> {
    let removed = u32::try_from(id.as_integer()?)
        .map(|id| interp.off_tick(phase, id))
        .unwrap_or(false);
    Ok(Value::Bool(removed))
}

fn get_num(args: &[Value], idx: usize) -> Result<f64> {
    args.get(idx).unwrap_or(&Value::Empty).as_number()
}
