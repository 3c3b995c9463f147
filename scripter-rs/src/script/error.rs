//! Error taxonomy for parsing and evaluating scripts.
//!
//! Every failure that can abort a top-level evaluation is a [`ScriptError`].
//! Identifier misses are *not* errors: the resolver returns `None` and the
//! dispatcher falls back to literal parsing, which only turns into
//! [`ScriptError::Parse`] when the raw token is neither a quoted string nor
//! a number.

use thiserror::Error;

/// Maximum number of source characters quoted in a parse error snippet.
pub const MAX_ERROR_CHARS: usize = 30;

/// Result alias used throughout the scripting core.
pub type Result<T> = std::result::Result<T, ScriptError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScriptError {
    /// Malformed token or expression, or an identifier that is neither bound
    /// nor parseable as a literal.
    #[error("couldn't parse [{token}] in {snippet}...")]
    Parse { token: String, snippet: String },

    /// A [`Value`](super::Value) accessor was used on a value of another kind.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// A builtin was called with fewer arguments than it declares.
    #[error("{function}: expected at least {required} argument(s), got {actual}")]
    ArgumentCount {
        function: String,
        required: usize,
        actual: usize,
    },

    /// Unknown property or pseudo-method on a receiver.
    #[error("there is no property or function named {property} on type {type_name}")]
    PropertyNotFound {
        property: String,
        type_name: &'static str,
    },

    /// Array element access outside the container bounds.
    #[error("index {index} is out of range for an array of length {len}")]
    IndexOutOfRange { index: i64, len: usize },

    #[error("{0}")]
    Runtime(String),
}

impl ScriptError {
    /// Build a [`ScriptError::Parse`] for `token`, quoting at most
    /// [`MAX_ERROR_CHARS`] characters of `rest` (the source that follows it).
    pub fn parse(token: impl Into<String>, rest: &str) -> Self {
        ScriptError::Parse {
            token: token.into(),
            snippet: rest.chars().take(MAX_ERROR_CHARS).collect(),
        }
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        ScriptError::Runtime(message.into())
    }

    pub fn type_mismatch(expected: &'static str, found: &'static str) -> Self {
        ScriptError::TypeMismatch { expected, found }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_snippet_is_bounded() {
        let rest = "x".repeat(100);
        let ScriptError::Parse { snippet, .. } = ScriptError::parse("@", &rest) else {
            panic!("expected a parse error");
        };
        assert_eq!(snippet.chars().count(), MAX_ERROR_CHARS);
    }

    #[test]
    fn display_messages() {
        let e = ScriptError::ArgumentCount {
            function: "abs".into(),
            required: 1,
            actual: 0,
        };
        assert_eq!(e.to_string(), "abs: expected at least 1 argument(s), got 0");
        let e = ScriptError::parse("foo", "(1)");
        assert_eq!(e.to_string(), "couldn't parse [foo] in (1)...");
    }
}
