//! Scripting core.
//!
//! A tree-walking interpreter for a small embedded scripting language:
//!
//! - Tagged runtime [`Value`]s with strict accessors
//! - Local-over-global identifier resolution ([`ScopeStack`])
//! - Dispatch of identifiers, `name[index]` and operator tokens to a closed
//!   set of [`Callable`] kinds
//! - Assignment through resolved [`Location`]s
//! - Host-registered builtins, action operators and objects
//!
//! # Quick start
//!
//! ```rust
//! use scripter::script::{Interpreter, Value};
//!
//! let mut interp = Interpreter::new();
//! interp.exec_script("var x = 6\nprint(x * 7)").unwrap();
//! assert_eq!(interp.output, vec!["42"]);
//! assert_eq!(interp.eval_expr("'abc'.length").unwrap(), Value::Number(3.0));
//! ```

pub mod builtins;
pub mod callable;
pub mod dispatch;
pub mod error;
pub mod expr;
pub mod interp;
pub mod location;
pub mod object;
pub mod scope;
pub mod stack;
pub mod stmt;
pub mod value;

// Re-exports for convenience.
pub use callable::{ActionOperator, Builtin, Callable, UserFunction};
pub use dispatch::FrameGuard;
pub use error::{ScriptError, MAX_ERROR_CHARS};
pub use interp::{ControlFlow, Interpreter};
pub use location::Location;
pub use object::{MapObject, ObjectReference};
pub use scope::{Binding, Frame, ScopeStack};
pub use stmt::Program;
pub use value::{Kind, Value};
