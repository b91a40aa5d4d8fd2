//! Closed registry of pure expression operators.
//!
//! Expressions are objects carrying an `op` field plus operator-specific
//! operands. Declared operands are recursively resolved (references and
//! nested expressions included) before the operator's own logic runs, so
//! operators only ever see plain values. The registry is closed: an unknown
//! `op` is an error, not a no-op.

use crate::context::StepContext;
use crate::templates;
use crate::utils::value_ext::{display_string, is_truthy};
use miette::Diagnostic;
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors raised by expression evaluation and template resolution.
///
/// These propagate to the executing node as a failure; a broken expression
/// never degrades to a silent null.
#[derive(Debug, Error, Diagnostic)]
pub enum ExpressionError {
    #[error("unknown expression operator: {op}")]
    #[diagnostic(code(agentgraph::expr::unknown_operator))]
    UnknownOperator { op: String },

    #[error("lookup source is not an array")]
    #[diagnostic(code(agentgraph::expr::lookup_source))]
    LookupSourceNotArray,

    #[error("lookup found no match")]
    #[diagnostic(code(agentgraph::expr::lookup_no_match))]
    LookupNoMatch,

    #[error("lookup select field not found")]
    #[diagnostic(code(agentgraph::expr::lookup_select))]
    LookupSelectMissing,

    #[error("expression must be an object")]
    #[diagnostic(code(agentgraph::expr::malformed))]
    Malformed,
}

/// Evaluate one expression object against the step context and run state.
pub fn eval_expr(
    expr: &Map<String, Value>,
    ctx: &StepContext,
    state: &Map<String, Value>,
) -> Result<Value, ExpressionError> {
    let op = expr.get("op").and_then(Value::as_str).unwrap_or_default();
    match op {
        "concat" => eval_concat(expr, ctx, state),
        "coalesce" => eval_coalesce(expr, ctx, state),
        "get" => eval_get(expr, ctx, state),
        "len" => eval_len(expr, ctx, state),
        "eq" => {
            let left = operand(expr, "left", ctx, state)?;
            let right = operand(expr, "right", ctx, state)?;
            Ok(Value::Bool(left == right))
        }
        "not" => {
            let arg = operand(expr, "arg", ctx, state)?;
            Ok(Value::Bool(!is_truthy(&arg)))
        }
        "lookup" => eval_lookup(expr, ctx, state),
        "count_where" => eval_count_where(expr, ctx, state),
        "any" => eval_any(expr, ctx, state),
        "unique" => eval_unique(expr, ctx, state),
        "filter" => eval_filter(expr, ctx, state),
        other => Err(ExpressionError::UnknownOperator {
            op: other.to_string(),
        }),
    }
}

/// Resolve a declared operand, treating an absent key as null.
fn operand(
    expr: &Map<String, Value>,
    key: &str,
    ctx: &StepContext,
    state: &Map<String, Value>,
) -> Result<Value, ExpressionError> {
    match expr.get(key) {
        Some(raw) => templates::resolve(raw, ctx, state),
        None => Ok(Value::Null),
    }
}

fn eval_concat(
    expr: &Map<String, Value>,
    ctx: &StepContext,
    state: &Map<String, Value>,
) -> Result<Value, ExpressionError> {
    let mut out = String::new();
    if let Some(args) = expr.get("args").and_then(Value::as_array) {
        for raw in args {
            let resolved = templates::resolve(raw, ctx, state)?;
            out.push_str(&display_string(&resolved));
        }
    }
    Ok(Value::String(out))
}

fn eval_coalesce(
    expr: &Map<String, Value>,
    ctx: &StepContext,
    state: &Map<String, Value>,
) -> Result<Value, ExpressionError> {
    if let Some(args) = expr.get("args").and_then(Value::as_array) {
        for raw in args {
            let resolved = templates::resolve(raw, ctx, state)?;
            if !resolved.is_null() {
                return Ok(resolved);
            }
        }
    }
    Ok(Value::Null)
}

fn eval_get(
    expr: &Map<String, Value>,
    ctx: &StepContext,
    state: &Map<String, Value>,
) -> Result<Value, ExpressionError> {
    let obj = operand(expr, "obj", ctx, state)?;
    let key = operand(expr, "key", ctx, state)?;
    let default = operand(expr, "default", ctx, state)?;
    if let (Value::Object(map), Value::String(key)) = (&obj, &key)
        && let Some(found) = map.get(key)
    {
        return Ok(found.clone());
    }
    Ok(default)
}

fn eval_len(
    expr: &Map<String, Value>,
    ctx: &StepContext,
    state: &Map<String, Value>,
) -> Result<Value, ExpressionError> {
    let arg = operand(expr, "arg", ctx, state)?;
    let len = match &arg {
        Value::Array(items) => items.len(),
        Value::Object(map) => map.len(),
        Value::String(s) => s.chars().count(),
        _ => 0,
    };
    Ok(Value::from(len))
}

fn eval_lookup(
    expr: &Map<String, Value>,
    ctx: &StepContext,
    state: &Map<String, Value>,
) -> Result<Value, ExpressionError> {
    let source = operand(expr, "from", ctx, state)?;
    let Value::Array(items) = source else {
        return Err(ExpressionError::LookupSourceNotArray);
    };
    let clause = expr.get("match").and_then(Value::as_object);
    let field = clause
        .and_then(|m| m.get("field"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    let equals = match clause.and_then(|m| m.get("equals")) {
        Some(raw) => templates::resolve(raw, ctx, state)?,
        None => Value::Null,
    };
    let select = expr.get("select").and_then(Value::as_str).unwrap_or_default();
    for item in &items {
        let Value::Object(map) = item else { continue };
        if map.get(field).unwrap_or(&Value::Null) == &equals {
            return match map.get(select) {
                Some(found) => Ok(found.clone()),
                None => Err(ExpressionError::LookupSelectMissing),
            };
        }
    }
    Err(ExpressionError::LookupNoMatch)
}

fn eval_count_where(
    expr: &Map<String, Value>,
    ctx: &StepContext,
    state: &Map<String, Value>,
) -> Result<Value, ExpressionError> {
    let items = operand(expr, "from", ctx, state)?;
    let field = expr.get("field").and_then(Value::as_str).unwrap_or_default();
    let equals = operand(expr, "equals", ctx, state)?;
    let Value::Array(items) = items else {
        return Ok(Value::from(0));
    };
    let count = items
        .iter()
        .filter(|item| item.get(field).unwrap_or(&Value::Null) == &equals)
        .count();
    Ok(Value::from(count))
}

fn eval_any(
    expr: &Map<String, Value>,
    ctx: &StepContext,
    state: &Map<String, Value>,
) -> Result<Value, ExpressionError> {
    let items = operand(expr, "from", ctx, state)?;
    let field = expr.get("field").and_then(Value::as_str).unwrap_or_default();
    let equals = operand(expr, "equals", ctx, state)?;
    let Value::Array(items) = items else {
        return Ok(Value::Bool(false));
    };
    let hit = items
        .iter()
        .any(|item| item.get(field).unwrap_or(&Value::Null) == &equals);
    Ok(Value::Bool(hit))
}

fn eval_unique(
    expr: &Map<String, Value>,
    ctx: &StepContext,
    state: &Map<String, Value>,
) -> Result<Value, ExpressionError> {
    let items = operand(expr, "from", ctx, state)?;
    let Value::Array(items) = items else {
        return Ok(Value::Array(Vec::new()));
    };
    let mut seen: Vec<Value> = Vec::new();
    let mut out: Vec<Value> = Vec::new();
    match expr.get("by").and_then(Value::as_str) {
        Some(by) => {
            for item in items {
                let key = item.get(by).cloned().unwrap_or(Value::Null);
                // Items without a usable key are dropped, not deduped as null.
                if key.is_null() || seen.contains(&key) {
                    continue;
                }
                seen.push(key);
                out.push(item);
            }
        }
        None => {
            for item in items {
                if seen.contains(&item) {
                    continue;
                }
                seen.push(item.clone());
                out.push(item);
            }
        }
    }
    Ok(Value::Array(out))
}

fn eval_filter(
    expr: &Map<String, Value>,
    ctx: &StepContext,
    state: &Map<String, Value>,
) -> Result<Value, ExpressionError> {
    let items = operand(expr, "from", ctx, state)?;
    let Value::Array(items) = items else {
        return Ok(Value::Array(Vec::new()));
    };
    let Some(clause) = expr.get("where").and_then(Value::as_object) else {
        return Ok(Value::Array(items));
    };
    let field = clause.get("field").and_then(Value::as_str).unwrap_or_default();

    let eq = match clause.get("eq") {
        Some(raw) => Some(templates::resolve(raw, ctx, state)?),
        None => None,
    };
    let ne = match clause.get("ne") {
        Some(raw) => Some(templates::resolve(raw, ctx, state)?),
        None => None,
    };
    let starts_with = clause.get("starts_with").and_then(Value::as_str);
    let not_starts_with = clause.get("not_starts_with").and_then(Value::as_str);
    let contains = clause.get("contains").and_then(Value::as_str);
    let not_null = clause.get("not_null").and_then(Value::as_bool).unwrap_or(false);

    let keep = |item: &Value| -> bool {
        let candidate = item.get(field).cloned().unwrap_or(Value::Null);
        if let Some(expected) = &eq
            && &candidate != expected
        {
            return false;
        }
        if let Some(excluded) = &ne
            && &candidate == excluded
        {
            return false;
        }
        if let Some(prefix) = starts_with
            && !candidate.as_str().is_some_and(|s| s.starts_with(prefix))
        {
            return false;
        }
        if let Some(prefix) = not_starts_with
            && candidate.as_str().is_some_and(|s| s.starts_with(prefix))
        {
            return false;
        }
        if let Some(needle) = contains
            && !candidate.as_str().is_some_and(|s| s.contains(needle))
        {
            return false;
        }
        if not_null && candidate.is_null() {
            return false;
        }
        true
    };

    Ok(Value::Array(items.into_iter().filter(|i| keep(i)).collect()))
}
