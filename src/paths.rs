//! Dotted-path resolution over the template context roots.
//!
//! Paths are total: a missing root, key, or non-object intermediate resolves
//! to null instead of erroring, so graph authors can reference state that may
//! not exist yet. Only object-key traversal is supported; array indexing is
//! handled by expression operators, not paths.

use crate::context::StepContext;
use serde_json::{Map, Value};

/// Resolve a dotted path like `state.user.name` against the step context and
/// the run state. Recognized roots are `state`, `inputs`, `run`, `result`,
/// and `loop`; anything else resolves to null. `inputs` is shorthand for
/// `state.inputs`, so a rewrite of that key is visible to later templates in
/// the same node visit.
pub fn resolve_path(path: &str, ctx: &StepContext, state: &Map<String, Value>) -> Value {
    let mut segments = path.split('.');
    let root = match segments.next() {
        Some(root) if !root.is_empty() => root,
        _ => return Value::Null,
    };

    match root {
        "state" => match segments.next() {
            None => Value::Object(state.clone()),
            Some(first) => {
                let start = match state.get(first) {
                    Some(v) => v.clone(),
                    None => return Value::Null,
                };
                walk(start, segments)
            }
        },
        "inputs" => walk(
            state.get("inputs").cloned().unwrap_or(Value::Null),
            segments,
        ),
        "run" => walk(ctx.run.clone().unwrap_or(Value::Null), segments),
        "result" => walk(ctx.result.clone().unwrap_or(Value::Null), segments),
        "loop" => walk(ctx.loop_scope.clone().unwrap_or(Value::Null), segments),
        _ => Value::Null,
    }
}

fn walk<'a>(start: Value, segments: impl Iterator<Item = &'a str>) -> Value {
    let mut current = start;
    for segment in segments {
        current = match current {
            Value::Object(mut map) => map.remove(segment).unwrap_or(Value::Null),
            _ => return Value::Null,
        };
    }
    current
}
