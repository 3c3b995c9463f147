//! Runtime value type for the scripting language.
//!
//! A [`Value`] is a tagged union whose kind is fixed at construction.  The
//! `as_*` accessors are strict: asking for the wrong kind fails with
//! [`ScriptError::TypeMismatch`].  The only implicit conversion is
//! number/boolean → string in [`Value::as_string`]; objects and functions
//! never coerce.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use super::callable::Callable;
use super::error::{Result, ScriptError};
use super::object::ObjectReference;
use super::stack::ensure_sufficient_stack;

/// Shared handle to a host or script object.
pub type ObjectRef = Rc<dyn ObjectReference>;

/// Shared, mutable array storage.  Arrays are reference values: copying the
/// [`Value`] copies the handle, not the elements.
pub type ArrayRef = Rc<RefCell<Vec<Value>>>;

// ── Kind ──────────────────────────────────────────────────────────────────────

/// The construction kind of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Empty,
    Bool,
    Number,
    Str,
    Object,
    Function,
    Array,
}

impl Kind {
    /// Name used in diagnostics and returned by `typeof()`.
    pub fn name(self) -> &'static str {
        match self {
            Kind::Empty => "empty",
            Kind::Bool => "boolean",
            Kind::Number => "number",
            Kind::Str => "string",
            Kind::Object => "object",
            Kind::Function => "function",
            Kind::Array => "array",
        }
    }
}

// ── Value ─────────────────────────────────────────────────────────────────────

/// A script runtime value.
#[derive(Clone, Default)]
pub enum Value {
    /// No value; also the argument sentinel for zero-arity calls.
    #[default]
    Empty,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    Object(ObjectRef),
    Function(Callable),
    Array(ArrayRef),
}

impl Value {
    pub fn bool(b: bool) -> Self {
        Value::Bool(b)
    }

    pub fn number(n: f64) -> Self {
        Value::Number(n)
    }

    pub fn string(s: impl Into<Rc<str>>) -> Self {
        Value::Str(s.into())
    }

    pub fn object(obj: impl ObjectReference + 'static) -> Self {
        Value::Object(Rc::new(obj))
    }

    pub fn function(callable: Callable) -> Self {
        Value::Function(callable)
    }

    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    pub fn kind(&self) -> Kind {
        match self {
            Value::Empty => Kind::Empty,
            Value::Bool(_) => Kind::Bool,
            Value::Number(_) => Kind::Number,
            Value::Str(_) => Kind::Str,
            Value::Object(_) => Kind::Object,
            Value::Function(_) => Kind::Function,
            Value::Array(_) => Kind::Array,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.kind().name()
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Value::Str(_))
    }

    fn mismatch<T>(&self, expected: Kind) -> Result<T> {
        Err(ScriptError::type_mismatch(expected.name(), self.type_name()))
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Value::Bool(b) => Ok(*b),
            _ => self.mismatch(Kind::Bool),
        }
    }

    pub fn as_number(&self) -> Result<f64> {
        match self {
            Value::Number(n) => Ok(*n),
            _ => self.mismatch(Kind::Number),
        }
    }

    /// Read as a string.  Numbers and booleans are formatted; every other
    /// non-string kind is a mismatch.
    pub fn as_string(&self) -> Result<Rc<str>> {
        match self {
            Value::Str(s) => Ok(Rc::clone(s)),
            Value::Number(_) | Value::Bool(_) => Ok(self.to_string().into()),
            _ => self.mismatch(Kind::Str),
        }
    }

    pub fn as_object(&self) -> Result<ObjectRef> {
        match self {
            Value::Object(o) => Ok(Rc::clone(o)),
            _ => self.mismatch(Kind::Object),
        }
    }

    pub fn as_function(&self) -> Result<Callable> {
        match self {
            Value::Function(f) => Ok(f.clone()),
            _ => self.mismatch(Kind::Function),
        }
    }

    pub fn as_array(&self) -> Result<ArrayRef> {
        match self {
            Value::Array(a) => Ok(Rc::clone(a)),
            _ => self.mismatch(Kind::Array),
        }
    }

    /// Read a number that must be integral (array indices, counts).
    pub fn as_integer(&self) -> Result<i64> {
        let n = self.as_number()?;
        if n.fract() != 0.0 || !n.is_finite() {
            return Err(ScriptError::runtime(format!("{n} is not an integer")));
        }
        Ok(n as i64)
    }

    // ── Operators ─────────────────────────────────────────────────────────────

    /// `+`: string concatenation when either side is a string, otherwise
    /// numeric addition.
    pub fn arith_add(&self, rhs: &Value) -> Result<Value> {
        if self.is_string() || rhs.is_string() {
            let mut s = self.as_string()?.to_string();
            s.push_str(&rhs.as_string()?);
            return Ok(Value::string(s));
        }
        Ok(Value::Number(self.as_number()? + rhs.as_number()?))
    }

    pub fn arith_sub(&self, rhs: &Value) -> Result<Value> {
        Ok(Value::Number(self.as_number()? - rhs.as_number()?))
    }

    pub fn arith_mul(&self, rhs: &Value) -> Result<Value> {
        Ok(Value::Number(self.as_number()? * rhs.as_number()?))
    }

    pub fn arith_div(&self, rhs: &Value) -> Result<Value> {
        let (a, b) = (self.as_number()?, rhs.as_number()?);
        if b == 0.0 {
            return Err(ScriptError::runtime("division by zero"));
        }
        Ok(Value::Number(a / b))
    }

    pub fn arith_rem(&self, rhs: &Value) -> Result<Value> {
        let (a, b) = (self.as_number()?, rhs.as_number()?);
        if b == 0.0 {
            return Err(ScriptError::runtime("modulo by zero"));
        }
        Ok(Value::Number(a % b))
    }

    pub fn arith_neg(&self) -> Result<Value> {
        Ok(Value::Number(-self.as_number()?))
    }

    pub fn logical_not(&self) -> Result<Value> {
        Ok(Value::Bool(!self.as_bool()?))
    }

    /// Equality used by `==`: values of different kinds are never equal and
    /// shared kinds compare by identity.
    pub fn loose_eq(&self, rhs: &Value) -> bool {
        match (self, rhs) {
            (Value::Empty, Value::Empty) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => a.same_prototype(b),
            _ => false,
        }
    }

    /// Ordering used by `<`, `<=`, `>`, `>=`.  Only numbers and strings are
    /// ordered.
    pub fn compare(&self, rhs: &Value) -> Result<Ordering> {
        match (self, rhs) {
            (Value::Number(a), Value::Number(b)) => a
                .partial_cmp(b)
                .ok_or_else(|| ScriptError::runtime("cannot order NaN")),
            (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
            (Value::Str(_), other) => other.mismatch(Kind::Str),
            (other, _) => other.mismatch(Kind::Number),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.loose_eq(other)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Empty => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{n}")
                }
            }
            Value::Str(s) => write!(f, "{s}"),
            Value::Object(o) => write!(f, "[object {}]", o.type_name()),
            Value::Function(c) => write!(f, "[function {}]", c.name()),
            Value::Array(items) => {
                let Some(_open) = OpenArray::enter(items) else {
                    return write!(f, "[...]");
                };
                ensure_sufficient_stack(|| {
                    write!(f, "[")?;
                    for (i, v) in items.borrow().iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{v}")?;
                    }
                    write!(f, "]")
                })
            }
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Empty => write!(f, "Empty"),
            Value::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            Value::Number(n) => f.debug_tuple("Number").field(n).finish(),
            Value::Str(s) => f.debug_tuple("Str").field(s).finish(),
            Value::Object(o) => f.debug_tuple("Object").field(o).finish(),
            Value::Function(c) => f.debug_tuple("Function").field(c).finish(),
            Value::Array(_) => write!(f, "Array({self})"),
        }
    }
}

thread_local! {
    /// Arrays whose elements are being formatted on this thread.
    static OPEN_ARRAYS: RefCell<HashSet<*const RefCell<Vec<Value>>>> =
        RefCell::new(HashSet::new());
}

/// Marks an array as being formatted; an array that contains itself prints
/// as `[...]` on re-entry.
struct OpenArray(*const RefCell<Vec<Value>>);

impl OpenArray {
    fn enter(items: &ArrayRef) -> Option<OpenArray> {
        let ptr = Rc::as_ptr(items);
        OPEN_ARRAYS
            .with(|open| open.borrow_mut().insert(ptr))
            .then(|| OpenArray(ptr))
    }
}

impl Drop for OpenArray {
    fn drop(&mut self) {
        OPEN_ARRAYS.with(|open| open.borrow_mut().remove(&self.0));
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s.into())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::array(items)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::object::MapObject;

    #[test]
    fn display_numbers() {
        assert_eq!(Value::Number(42.0).to_string(), "42");
        assert_eq!(Value::Number(-7.0).to_string(), "-7");
        assert_eq!(Value::Number(2.5).to_string(), "2.5");
    }

    #[test]
    fn display_array() {
        let v = Value::array(vec![1i64.into(), "a".into(), true.into()]);
        assert_eq!(v.to_string(), "[1, a, true]");
    }

    #[test]
    fn display_self_containing_array() {
        let v = Value::array(vec![1i64.into()]);
        let a = v.as_array().unwrap();
        a.borrow_mut().push(v.clone());
        assert_eq!(v.to_string(), "[1, [...]]");
        assert_eq!(format!("{v:?}"), "Array([1, [...]])");
        // Unwind the cycle so the test does not leak it.
        a.borrow_mut().clear();
    }

    #[test]
    fn display_shared_array_twice() {
        let inner = Value::array(vec![2i64.into()]);
        let v = Value::array(vec![inner.clone(), inner]);
        assert_eq!(v.to_string(), "[[2], [2]]");
    }

    #[test]
    fn display_mutually_nested_arrays() {
        let a = Value::array(vec![]);
        let b = Value::array(vec![a.clone()]);
        a.as_array().unwrap().borrow_mut().push(b.clone());
        assert_eq!(a.to_string(), "[[[...]]]");
        assert_eq!(b.to_string(), "[[[...]]]");
        a.as_array().unwrap().borrow_mut().clear();
    }

    #[test]
    fn matching_accessor_succeeds() {
        assert!(Value::Bool(true).as_bool().unwrap());
        assert_eq!(Value::Number(3.0).as_number().unwrap(), 3.0);
        assert_eq!(&*Value::from("x").as_string().unwrap(), "x");
        assert!(Value::object(MapObject::new()).as_object().is_ok());
        assert!(Value::array(vec![]).as_array().is_ok());
    }

    #[test]
    fn wrong_accessor_is_type_mismatch() {
        let err = Value::from("x").as_number().unwrap_err();
        assert_eq!(
            err,
            ScriptError::TypeMismatch {
                expected: "number",
                found: "string"
            }
        );
        assert!(Value::Number(1.0).as_bool().is_err());
        assert!(Value::Empty.as_array().is_err());
    }

    #[test]
    fn string_coercion_from_number_and_bool() {
        assert_eq!(&*Value::Number(1.0).as_string().unwrap(), "1");
        assert_eq!(&*Value::Bool(false).as_string().unwrap(), "false");
    }

    #[test]
    fn objects_never_coerce_to_string() {
        let obj = Value::object(MapObject::new());
        assert!(matches!(
            obj.as_string(),
            Err(ScriptError::TypeMismatch { found: "object", .. })
        ));
    }

    #[test]
    fn add_concatenates_strings() {
        let v = Value::from("n=").arith_add(&Value::Number(4.0)).unwrap();
        assert_eq!(v, Value::from("n=4"));
        assert_eq!(
            Value::Number(1.0).arith_add(&Value::Number(2.0)).unwrap(),
            Value::Number(3.0)
        );
    }

    #[test]
    fn div_by_zero() {
        assert!(Value::Number(1.0).arith_div(&Value::Number(0.0)).is_err());
        assert!(Value::Number(1.0).arith_rem(&Value::Number(0.0)).is_err());
    }

    #[test]
    fn equality_across_kinds_is_false() {
        assert_ne!(Value::Number(1.0), Value::from("1"));
        assert_eq!(Value::Empty, Value::Empty);
    }

    #[test]
    fn arrays_compare_by_identity() {
        let a = Value::array(vec![1i64.into()]);
        let b = Value::array(vec![1i64.into()]);
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn ordering() {
        assert_eq!(
            Value::Number(1.0).compare(&Value::Number(2.0)).unwrap(),
            Ordering::Less
        );
        assert_eq!(
            Value::from("b").compare(&Value::from("a")).unwrap(),
            Ordering::Greater
        );
        assert!(Value::Bool(true).compare(&Value::Bool(false)).is_err());
    }
}
