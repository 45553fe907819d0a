//! Named expression table
//!
//! [`ExpressionTable`] is a ready-made [`ExpressionEvaluator`] mapping tags
//! to plain Rust functions.
//!
//! ```rust
//! use stataggr::engine::expression::ExpressionTable;
//! use stataggr::engine::traits::ExpressionEvaluator;
//! use stataggr::error::ExpressionError;
//! use stataggr::types::Value;
//!
//! let table = ExpressionTable::new().with("ms_to_s", |v: Value| {
//!     v.as_i64()
//!         .map(|ms| Value::Long(ms / 1000))
//!         .ok_or_else(|| ExpressionError::new("expected an integer"))
//! });
//!
//! assert_eq!(table.evaluate("ms_to_s", Value::Long(4500)).unwrap(), Value::Long(4));
//! assert!(table.supports("ms_to_s"));
//! assert!(!table.supports("s_to_ms"));
//! ```

use super::traits::ExpressionEvaluator;
use crate::error::ExpressionError;
use crate::types::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

type ExpressionFn = Arc<dyn Fn(Value) -> Result<Value, ExpressionError> + Send + Sync>;

/// Table of named pure functions
#[derive(Clone, Default)]
pub struct ExpressionTable {
    expressions: HashMap<String, ExpressionFn>,
}

impl ExpressionTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an expression, replacing any previous one with the same tag
    pub fn with<F>(mut self, tag: impl Into<String>, expression: F) -> Self
    where
        F: Fn(Value) -> Result<Value, ExpressionError> + Send + Sync + 'static,
    {
        self.expressions.insert(tag.into(), Arc::new(expression));
        self
    }

    /// Registered tags
    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.expressions.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }
}

impl ExpressionEvaluator for ExpressionTable {
    fn evaluate(&self, tag: &str, value: Value) -> Result<Value, ExpressionError> {
        match self.expressions.get(tag) {
            Some(expression) => expression(value),
            None => Err(ExpressionError::new(format!("unknown expression '{}'", tag))),
        }
    }

    fn supports(&self, tag: &str) -> bool {
        self.expressions.contains_key(tag)
    }
}

impl fmt::Debug for ExpressionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpressionTable")
            .field("tags", &self.tags())
            .finish()
    }
}
