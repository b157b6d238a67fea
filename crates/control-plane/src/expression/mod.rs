//! Expression evaluation.
//!
//! Called elements of call activities, multi-instance cardinalities and
//! delegate expressions may be expressions evaluated against the variables
//! of the migrated instance.

pub mod jinja;

pub use jinja::{is_expression, TemplateEvaluator};

use serde_json::{Map, Value};

use crate::error::AppResult;

/// Evaluates expressions against a variable scope.
pub trait ExpressionEvaluator: Send + Sync {
    /// Evaluate `expression` and return its typed value.
    fn evaluate(&self, expression: &str, scope: &Map<String, Value>) -> AppResult<Value>;
}
