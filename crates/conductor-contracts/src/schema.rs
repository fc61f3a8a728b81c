//! Primitive JSON-schema checks used for wiring compatibility and routing.
//!
//! Only the `type` keyword is interpreted. A schema without a recognizable
//! `type` is untyped and compatible with everything.

use conductor_protocol::ValidationIssue;
use serde_json::Value;

use crate::shape::{ROOT_PATH, is_integer, json_type_name};

/// The declared primitive type of a schema, if any.
pub fn schema_type(schema: Option<&Value>) -> Option<&str> {
    schema?.get("type")?.as_str()
}

/// Two declared types can be wired together.
///
/// Untyped on either side is compatible; `number` and `integer` accept each
/// other.
pub fn types_compatible(source: Option<&str>, target: Option<&str>) -> bool {
    match (source, target) {
        (None, _) | (_, None) => true,
        (Some(source), Some(target)) if source == target => true,
        (Some(source), Some(target)) => is_numeric(source) && is_numeric(target),
    }
}

fn is_numeric(type_name: &str) -> bool {
    matches!(type_name, "number" | "integer")
}

/// Does `data` satisfy the primitive `type` declared by `schema`?
pub fn value_matches(schema: Option<&Value>, data: &Value) -> bool {
    match schema_type(schema) {
        None => true,
        Some("string") => data.is_string(),
        Some("number") => data.is_number(),
        Some("integer") => is_integer(data),
        Some("boolean") => data.is_boolean(),
        Some("array") => data.is_array(),
        Some("object") => data.is_object(),
        Some("null") => data.is_null(),
        Some(_) => true,
    }
}

/// Issue describing a primitive type mismatch, or `None` when `data` fits.
pub fn check_value(schema: Option<&Value>, data: &Value, label: &str) -> Option<ValidationIssue> {
    if value_matches(schema, data) {
        return None;
    }
    let expected = schema_type(schema).unwrap_or("unknown");
    Some(ValidationIssue::new(
        ROOT_PATH,
        format!(
            "{label} expects {expected}, received {}",
            json_type_name(data)
        ),
        "invalid_type",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn untyped_and_numeric_pairs_are_compatible() {
        assert!(types_compatible(None, Some("string")));
        assert!(types_compatible(Some("string"), None));
        assert!(types_compatible(Some("string"), Some("string")));
        assert!(types_compatible(Some("integer"), Some("number")));
        assert!(!types_compatible(Some("string"), Some("number")));
        assert!(!types_compatible(Some("array"), Some("object")));
    }

    #[test]
    fn value_matches_primitive_types() {
        let number = json!({ "type": "number" });
        assert!(value_matches(Some(&number), &json!(1.5)));
        assert!(!value_matches(Some(&number), &json!("1.5")));
        assert!(value_matches(None, &json!("anything")));
        assert!(value_matches(Some(&json!({ "type": "integer" })), &json!(2)));
        assert!(!value_matches(Some(&json!({ "type": "integer" })), &json!(2.5)));
        assert!(value_matches(Some(&json!({ "description": "loose" })), &json!([])));
    }

    #[test]
    fn check_value_names_the_label() {
        let schema = json!({ "type": "number" });
        let issue = check_value(Some(&schema), &json!("hello"), "say:say:text").unwrap();
        assert_eq!(issue.message, "say:say:text expects number, received string");
        assert_eq!(issue.code, "invalid_type");
    }
}
