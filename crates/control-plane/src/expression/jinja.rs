//! Jinja2-style expression evaluation using minijinja.
//!
//! `${name}` and `#{name}` placeholders are rewritten to `{{ name }}`
//! before evaluation, so models written for either syntax share one
//! evaluator.

use minijinja::{Environment, Error, ErrorKind, UndefinedBehavior, Value};
use serde_json::Map;

use super::ExpressionEvaluator;
use crate::error::{AppError, AppResult};

/// Expression evaluator with custom filters.
pub struct TemplateEvaluator {
    env: Environment<'static>,
}

impl Default for TemplateEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEvaluator {
    /// Create a new evaluator with custom filters.
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);

        env.add_filter("int", filter_int);
        env.add_filter("string", filter_string);
        env.add_filter("lower", filter_lower);
        env.add_filter("upper", filter_upper);
        env.add_filter("length", filter_length);

        Self { env }
    }

    /// Render an expression to a string.
    pub fn render(&self, expression: &str, scope: &Map<String, serde_json::Value>) -> AppResult<String> {
        let template = normalize(expression);
        self.env
            .render_str(&template, Value::from_serialize(scope))
            .map_err(|e| AppError::Template(format!("Template render error: {}", e)))
    }
}

impl ExpressionEvaluator for TemplateEvaluator {
    fn evaluate(
        &self,
        expression: &str,
        scope: &Map<String, serde_json::Value>,
    ) -> AppResult<serde_json::Value> {
        if !is_expression(expression) {
            return Ok(serde_json::Value::String(expression.to_string()));
        }

        // A lone `{{ expr }}` keeps its type; anything else renders to text
        let template = normalize(expression);
        if let Some(inner) = single_expression(&template) {
            let compiled = self
                .env
                .compile_expression(inner)
                .map_err(|e| AppError::Template(format!("Expression parse error: {}", e)))?;
            let value = compiled
                .eval(Value::from_serialize(scope))
                .map_err(|e| AppError::Template(format!("Expression evaluation error: {}", e)))?;
            return serde_json::to_value(&value).map_err(AppError::from);
        }

        self.render(expression, scope).map(serde_json::Value::String)
    }
}

/// Check if a string contains expression syntax.
pub fn is_expression(s: &str) -> bool {
    ((s.contains("${") || s.contains("#{")) && s.contains('}'))
        || (s.contains("{{") && s.contains("}}"))
}

/// Rewrite `${x}` and `#{x}` placeholders to `{{ x }}`.
fn normalize(expression: &str) -> String {
    let mut out = String::with_capacity(expression.len() + 8);
    let mut rest = expression;
    loop {
        let next = [rest.find("${"), rest.find("#{")]
            .into_iter()
            .flatten()
            .min();
        let Some(start) = next else {
            out.push_str(rest);
            break;
        };
        let Some(len) = rest[start + 2..].find('}') else {
            out.push_str(rest);
            break;
        };
        out.push_str(&rest[..start]);
        out.push_str("{{ ");
        out.push_str(rest[start + 2..start + 2 + len].trim());
        out.push_str(" }}");
        rest = &rest[start + 2 + len + 1..];
    }
    out
}

fn single_expression(template: &str) -> Option<&str> {
    let trimmed = template.trim();
    let inner = trimmed.strip_prefix("{{")?.strip_suffix("}}")?;
    if inner.contains("{{") || inner.contains("}}") {
        return None;
    }
    Some(inner.trim())
}

fn filter_int(value: &Value) -> Result<i64, Error> {
    if let Ok(i) = i64::try_from(value.clone()) {
        return Ok(i);
    }
    if let Some(s) = value.as_str() {
        return s.trim().parse::<i64>().map_err(|_| {
            Error::new(ErrorKind::InvalidOperation, format!("cannot convert '{}' to int", s))
        });
    }
    Err(Error::new(ErrorKind::InvalidOperation, "cannot convert to int"))
}

fn filter_string(value: &Value) -> String {
    value.to_string()
}

fn filter_lower(value: &Value) -> String {
    value.to_string().to_lowercase()
}

fn filter_upper(value: &Value) -> String {
    value.to_string().to_uppercase()
}

fn filter_length(value: &Value) -> Result<usize, Error> {
    value
        .len()
        .ok_or_else(|| Error::new(ErrorKind::InvalidOperation, "value has no length"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scope(value: serde_json::Value) -> Map<String, serde_json::Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_is_expression() {
        assert!(is_expression("${procKey}"));
        assert!(is_expression("#{procKey}"));
        assert!(is_expression("{{ procKey }}"));
        assert!(!is_expression("procA"));
    }

    #[test]
    fn test_normalize_placeholders() {
        assert_eq!(normalize("${a}-#{ b }"), "{{ a }}-{{ b }}");
        assert_eq!(normalize("plain"), "plain");
    }

    #[test]
    fn test_evaluate_keeps_type() {
        let evaluator = TemplateEvaluator::new();
        let vars = scope(json!({"count": 3, "items": [1, 2]}));
        assert_eq!(evaluator.evaluate("${count}", &vars).unwrap(), json!(3));
        assert_eq!(evaluator.evaluate("{{ items | length }}", &vars).unwrap(), json!(2));
    }

    #[test]
    fn test_evaluate_renders_mixed_text() {
        let evaluator = TemplateEvaluator::new();
        let vars = scope(json!({"region": "eu"}));
        assert_eq!(
            evaluator.evaluate("billing-${region}", &vars).unwrap(),
            json!("billing-eu")
        );
    }

    #[test]
    fn test_literal_passes_through() {
        let evaluator = TemplateEvaluator::new();
        assert_eq!(evaluator.evaluate("procA", &Map::new()).unwrap(), json!("procA"));
    }

    #[test]
    fn test_undefined_variable_fails() {
        let evaluator = TemplateEvaluator::new();
        let err = evaluator.evaluate("${missing}", &Map::new()).unwrap_err();
        assert!(matches!(err, AppError::Template(_)));
    }
}
