//! Addressable storage locations (l-values).
//!
//! An assignment target is resolved to a [`Location`] exactly once: receiver
//! and index sub-expressions are evaluated while building it.  Reading and
//! writing then operate on the stored handle, so `obj().x += 1` calls `obj()`
//! a single time.

use std::rc::Rc;

use super::callable::{Builtin, Callable};
use super::error::{Result, ScriptError};
use super::interp::Interpreter;
use super::value::{ArrayRef, ObjectRef, Value};

#[derive(Debug, Clone)]
pub enum Location {
    /// A name looked up through the scope stack on every access; `rest` is
    /// the source after it, quoted if the name is unbound when read.
    Variable { name: Rc<str>, rest: Rc<str> },
    /// A named property of an object.
    Property { object: ObjectRef, name: Rc<str> },
    /// An element of an array.
    Element { array: ArrayRef, index: i64 },
    /// A pseudo-member of a non-object receiver (`"abc".length`).  Read-only.
    Member { receiver: Value, name: Rc<str> },
}

impl Location {
    pub fn read(&self, interp: &Interpreter) -> Result<Value> {
        match self {
            Location::Variable { name, rest } => interp
                .scope
                .resolve(name)
                .map(|b| b.to_value())
                .ok_or_else(|| ScriptError::parse(&**name, rest)),
            Location::Property { object, name } => object.get_property(name),
            Location::Element { array, index } => element_at(array, *index),
            Location::Member { receiver, name } => member_of(receiver, name),
        }
    }

    pub fn write(&self, interp: &mut Interpreter, value: Value) -> Result<()> {
        match self {
            Location::Variable { name, .. } => {
                interp.scope.assign(name, value);
                Ok(())
            }
            Location::Property { object, name } => object.set_property(name, value),
            Location::Element { array, index } => {
                let mut items = array.borrow_mut();
                let len = items.len();
                match slot_index(*index, len) {
                    Some(i) => {
                        items[i] = value;
                        Ok(())
                    }
                    None => Err(ScriptError::IndexOutOfRange { index: *index, len }),
                }
            }
            Location::Member { receiver, name } => Err(ScriptError::runtime(format!(
                "cannot assign to {name} on type {}",
                receiver.type_name()
            ))),
        }
    }
}

fn slot_index(index: i64, len: usize) -> Option<usize> {
    usize::try_from(index).ok().filter(|&i| i < len)
}

/// Read `array[index]`.
pub fn element_at(array: &ArrayRef, index: i64) -> Result<Value> {
    let items = array.borrow();
    slot_index(index, items.len())
        .map(|i| items[i].clone())
        .ok_or(ScriptError::IndexOutOfRange {
            index,
            len: items.len(),
        })
}

/// Read `receiver.name`.
///
/// Strings expose `length` plus the one-argument methods `startsWith`,
/// `endsWith` and `contains`, returned as builtins bound to the receiver.
/// Arrays expose `length`.  Any other receiver must be an object.
pub fn member_of(receiver: &Value, name: &str) -> Result<Value> {
    match receiver {
        Value::Str(s) => string_member(s, name),
        Value::Array(items) if name == "length" => Ok(Value::Number(items.borrow().len() as f64)),
        Value::Array(_) => Err(ScriptError::PropertyNotFound {
            property: name.to_owned(),
            type_name: receiver.type_name(),
        }),
        _ => receiver.as_object()?.get_property(name),
    }
}

fn string_member(s: &Rc<str>, name: &str) -> Result<Value> {
    let test: fn(&str, &str) -> bool = match name {
        "length" => return Ok(Value::Number(s.chars().count() as f64)),
        "startsWith" => |s: &str, p: &str| s.starts_with(p),
        "endsWith" => |s: &str, p: &str| s.ends_with(p),
        "contains" => |s: &str, p: &str| s.contains(p),
        _ => {
            return Err(ScriptError::PropertyNotFound {
                property: name.to_owned(),
                type_name: "string",
            })
        }
    };
    let receiver = Rc::clone(s);
    let method = Builtin::new(name, 1, move |_, args| {
        Ok(Value::Bool(test(&receiver, &args[0].as_string()?)))
    });
    Ok(Value::Function(Callable::Builtin(method)))
}
