//! Structural template resolution over arbitrary JSON values.
//!
//! The template language has two markers, both spelled as single-key-bearing
//! objects: `{"$ref": "dotted.path"}` substitutes a context path and
//! `{"$expr": {...}}` evaluates an expression. Everything else resolves
//! structurally: objects per key, arrays per element, scalars verbatim.

use crate::context::StepContext;
use crate::expressions::{self, ExpressionError};
use crate::paths::resolve_path;
use serde_json::{Map, Value};

/// Resolve a template value against the step context and run state.
pub fn resolve(
    value: &Value,
    ctx: &StepContext,
    state: &Map<String, Value>,
) -> Result<Value, ExpressionError> {
    match value {
        Value::Object(map) => {
            if let Some(reference) = map.get("$ref") {
                let path = match reference {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                return Ok(resolve_path(&path, ctx, state));
            }
            if let Some(expr) = map.get("$expr") {
                let Value::Object(expr) = expr else {
                    return Err(ExpressionError::Malformed);
                };
                return expressions::eval_expr(expr, ctx, state);
            }
            let mut out = Map::with_capacity(map.len());
            for (key, inner) in map {
                out.insert(key.clone(), resolve(inner, ctx, state)?);
            }
            Ok(Value::Object(out))
        }
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(resolve(item, ctx, state)?);
            }
            Ok(Value::Array(out))
        }
        scalar => Ok(scalar.clone()),
    }
}
