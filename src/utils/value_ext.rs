//! JSON value helpers shared by the template language and the runner.
//!
//! These encode the coercion rules the whole runtime agrees on: what counts
//! as "truthy" in a `when` clause, how a resolved `next` value becomes a node
//! id, and how values are stringified by `concat`.

use serde_json::Value;

/// Truthiness of a JSON value, used by the `not` operator and loop `when`
/// clauses. Null, `false`, zero, and empty strings/arrays/objects are falsy;
/// everything else is truthy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Coerce a resolved routing value into a node id. Null means "no next node";
/// strings pass through; anything else uses its compact JSON rendering.
pub fn coerce_node_id(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Stringification used by the `concat` operator: strings verbatim, numbers
/// and booleans via `Display`, null as the empty string, composites as
/// compact JSON.
pub fn display_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Human-readable type name for error messages.
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn truthiness_follows_emptiness() {
        assert!(!is_truthy(&Value::Null));
        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!([])));
        assert!(!is_truthy(&json!({})));
        assert!(is_truthy(&json!(1)));
        assert!(is_truthy(&json!("x")));
        assert!(is_truthy(&json!([0])));
    }

    #[test]
    fn node_id_coercion() {
        assert_eq!(coerce_node_id(&Value::Null), None);
        assert_eq!(coerce_node_id(&json!("end")), Some("end".to_string()));
        assert_eq!(coerce_node_id(&json!(7)), Some("7".to_string()));
    }

    #[test]
    fn concat_stringification() {
        assert_eq!(display_string(&json!("a")), "a");
        assert_eq!(display_string(&json!(2)), "2");
        assert_eq!(display_string(&Value::Null), "");
        assert_eq!(display_string(&json!([1, 2])), "[1,2]");
    }
}
