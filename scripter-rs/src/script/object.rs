//! Named-property surface used by property-access nodes.
//!
//! Host objects implement [`ObjectReference`]; scripts see them as
//! `Value::Object` and reach their properties with `receiver.name`.  Objects
//! are shared (`Rc`), so implementations use interior mutability for
//! [`ObjectReference::set_property`].

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;

use super::error::{Result, ScriptError};
use super::value::Value;

/// Property get/set surface of an object value.
pub trait ObjectReference: fmt::Debug {
    /// Name reported by `typeof()` and in diagnostics.
    fn type_name(&self) -> &'static str {
        "object"
    }

    fn get_property(&self, name: &str) -> Result<Value>;

    fn set_property(&self, name: &str, value: Value) -> Result<()>;
}

/// A plain script object backed by a property map.
///
/// Reading a property that was never set fails with
/// [`ScriptError::PropertyNotFound`].
#[derive(Debug, Default)]
pub struct MapObject {
    props: RefCell<HashMap<String, Value>>,
}

impl MapObject {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style initial property.
    pub fn with(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props.borrow_mut().insert(name.into(), value.into());
        self
    }

    pub fn len(&self) -> usize {
        self.props.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.props.borrow().is_empty()
    }
}

impl ObjectReference for MapObject {
    fn get_property(&self, name: &str) -> Result<Value> {
        self.props
            .borrow()
            .get(name)
            .cloned()
            .ok_or_else(|| ScriptError::PropertyNotFound {
                property: name.to_owned(),
                type_name: self.type_name(),
            })
    }

    fn set_property(&self, name: &str, value: Value) -> Result<()> {
        self.props.borrow_mut().insert(name.to_owned(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get() {
        let obj = MapObject::new();
        obj.set_property("x", Value::Number(1.0)).unwrap();
        assert_eq!(obj.get_property("x").unwrap(), Value::Number(1.0));
        assert_eq!(obj.len(), 1);
    }

    #[test]
    fn missing_property() {
        let obj = MapObject::new().with("a", true);
        assert!(matches!(
            obj.get_property("b"),
            Err(ScriptError::PropertyNotFound { ref property, .. }) if property == "b"
        ));
    }
}
