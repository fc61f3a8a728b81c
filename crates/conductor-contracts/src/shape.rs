//! A small interpreter for declarative value shapes.
//!
//! A [`Shape`] describes what a JSON value must look like; [`Shape::check`]
//! walks the value and reports every mismatch as a [`ValidationIssue`] with a
//! dotted path, a human message, and a machine code.

use conductor_protocol::ValidationIssue;
use serde_json::Value;

pub const ROOT_PATH: &str = "<root>";

#[derive(Debug, Clone)]
pub enum Shape {
    Any,
    String { min_len: usize },
    Number,
    Integer,
    Boolean,
    OneOf(&'static [&'static str]),
    Array { items: Box<Shape>, min_items: usize },
    /// Object with declared fields; undeclared keys are allowed.
    Object(Vec<Field>),
    /// Object with arbitrary keys whose values share one shape.
    Record(Box<Shape>),
}

#[derive(Debug, Clone)]
pub struct Field {
    pub name: &'static str,
    pub shape: Shape,
    pub required: bool,
}

pub fn required(name: &'static str, shape: Shape) -> Field {
    Field {
        name,
        shape,
        required: true,
    }
}

pub fn optional(name: &'static str, shape: Shape) -> Field {
    Field {
        name,
        shape,
        required: false,
    }
}

impl Shape {
    pub fn string() -> Self {
        Self::String { min_len: 0 }
    }

    pub fn non_empty() -> Self {
        Self::String { min_len: 1 }
    }

    pub fn array(items: Shape) -> Self {
        Self::Array {
            items: Box::new(items),
            min_items: 0,
        }
    }

    pub fn non_empty_array(items: Shape) -> Self {
        Self::Array {
            items: Box::new(items),
            min_items: 1,
        }
    }

    pub fn object(fields: impl IntoIterator<Item = Field>) -> Self {
        Self::Object(fields.into_iter().collect())
    }

    /// Any JSON object.
    pub fn any_object() -> Self {
        Self::Record(Box::new(Self::Any))
    }

    pub fn record(values: Shape) -> Self {
        Self::Record(Box::new(values))
    }

    pub fn check(&self, value: &Value) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        let mut path = Vec::new();
        self.walk(value, &mut path, &mut issues);
        issues
    }

    pub fn accepts(&self, value: &Value) -> bool {
        self.check(value).is_empty()
    }

    fn walk(&self, value: &Value, path: &mut Vec<String>, issues: &mut Vec<ValidationIssue>) {
        match self {
            Self::Any => {}
            Self::String { min_len } => match value.as_str() {
                Some(text) if text.chars().count() < *min_len => issues.push(issue(
                    path,
                    format!("String must contain at least {min_len} character(s)"),
                    "too_small",
                )),
                Some(_) => {}
                None => issues.push(type_issue(path, "string", value)),
            },
            Self::Number => {
                if !value.is_number() {
                    issues.push(type_issue(path, "number", value));
                }
            }
            Self::Integer => {
                if !is_integer(value) {
                    issues.push(type_issue(path, "integer", value));
                }
            }
            Self::Boolean => {
                if !value.is_boolean() {
                    issues.push(type_issue(path, "boolean", value));
                }
            }
            Self::OneOf(options) => match value.as_str() {
                Some(text) if options.contains(&text) => {}
                Some(text) => {
                    let expected = options
                        .iter()
                        .map(|option| format!("'{option}'"))
                        .collect::<Vec<_>>()
                        .join(" | ");
                    issues.push(issue(
                        path,
                        format!("Invalid enum value. Expected {expected}, received '{text}'"),
                        "invalid_enum_value",
                    ));
                }
                None => issues.push(type_issue(path, "string", value)),
            },
            Self::Array { items, min_items } => match value.as_array() {
                Some(values) => {
                    if values.len() < *min_items {
                        issues.push(issue(
                            path,
                            format!("Array must contain at least {min_items} element(s)"),
                            "too_small",
                        ));
                    }
                    for (index, item) in values.iter().enumerate() {
                        path.push(index.to_string());
                        items.walk(item, path, issues);
                        path.pop();
                    }
                }
                None => issues.push(type_issue(path, "array", value)),
            },
            Self::Object(fields) => match value.as_object() {
                Some(object) => {
                    for field in fields {
                        path.push(field.name.to_owned());
                        match object.get(field.name) {
                            Some(Value::Null) | None if field.required => {
                                issues.push(issue(path, "Required", "invalid_type"));
                            }
                            Some(Value::Null) | None => {}
                            Some(inner) => field.shape.walk(inner, path, issues),
                        }
                        path.pop();
                    }
                }
                None => issues.push(type_issue(path, "object", value)),
            },
            Self::Record(values) => match value.as_object() {
                Some(object) => {
                    for (key, inner) in object {
                        path.push(key.clone());
                        values.walk(inner, path, issues);
                        path.pop();
                    }
                }
                None => issues.push(type_issue(path, "object", value)),
            },
        }
    }
}

/// Join path segments with `.`; the empty path renders as `<root>`.
pub fn render_path(path: &[String]) -> String {
    if path.is_empty() {
        ROOT_PATH.to_owned()
    } else {
        path.join(".")
    }
}

pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(number) if number.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub(crate) fn is_integer(value: &Value) -> bool {
    match value {
        Value::Number(number) => {
            number.is_i64() || number.is_u64() || number.as_f64().is_some_and(|f| f.fract() == 0.0)
        }
        _ => false,
    }
}

fn issue(path: &[String], message: impl Into<String>, code: &str) -> ValidationIssue {
    ValidationIssue::new(render_path(path), message, code)
}

fn type_issue(path: &[String], expected: &str, value: &Value) -> ValidationIssue {
    issue(
        path,
        format!("Expected {expected}, received {}", json_type_name(value)),
        "invalid_type",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn edge_shape() -> Shape {
        Shape::object([
            required("id", Shape::non_empty()),
            required(
                "from",
                Shape::object([
                    required("moduleId", Shape::non_empty()),
                    required("port", Shape::non_empty()),
                ]),
            ),
            optional("enabled", Shape::Boolean),
        ])
    }

    #[test]
    fn accepts_matching_value() {
        let value = json!({ "id": "e1", "from": { "moduleId": "pdf", "port": "out" } });
        assert!(edge_shape().accepts(&value));
    }

    #[test]
    fn reports_nested_paths_and_codes() {
        let value = json!({ "id": "", "from": { "moduleId": 3 }, "enabled": "yes" });
        let issues = edge_shape().check(&value);
        let paths: Vec<_> = issues.iter().map(|issue| issue.path.as_str()).collect();
        assert_eq!(paths, vec!["id", "from.moduleId", "from.port", "enabled"]);
        assert_eq!(issues[0].code, "too_small");
        assert_eq!(issues[1].message, "Expected string, received integer");
        assert_eq!(issues[2].message, "Required");
    }

    #[test]
    fn root_type_mismatch_uses_root_path() {
        let issues = edge_shape().check(&json!("nope"));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].path, ROOT_PATH);
    }

    #[test]
    fn array_items_are_indexed() {
        let shape = Shape::non_empty_array(Shape::OneOf(&["main", "pip"]));
        let issues = shape.check(&json!(["main", "dock"]));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].path, "1");
        assert_eq!(issues[0].code, "invalid_enum_value");
        assert_eq!(shape.check(&json!([]))[0].code, "too_small");
    }

    #[test]
    fn integer_accepts_whole_floats() {
        assert!(Shape::Integer.accepts(&json!(3)));
        assert!(Shape::Integer.accepts(&json!(3.0)));
        assert!(!Shape::Integer.accepts(&json!(3.5)));
    }
}
