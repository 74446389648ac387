//! Request body validation.
//!
//! [`Schema`] is a small JSON schema used to validate request bodies before a
//! handler runs. Unlike a fail-fast validator it collects every violation, so
//! the client gets one message per offending field.
//!
//! Reasons follow the familiar `Required` / `Expected string, received number`
//! wording; the classifier lower-cases them when building the envelope.

use crate::error::PipelineError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// One segment of a path into a JSON document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    /// Object key.
    Key(String),
    /// Array index.
    Index(usize),
}

impl PathSegment {
    /// Creates a key segment.
    #[must_use]
    pub fn key(key: impl Into<String>) -> Self {
        Self::Key(key.into())
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => f.write_str(key),
            Self::Index(index) => write!(f, "{index}"),
        }
    }
}

/// A single validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldViolation {
    /// Location of the offending value.
    pub path: Vec<PathSegment>,
    /// Why it was rejected.
    pub reason: String,
}

impl FieldViolation {
    /// Creates a violation.
    #[must_use]
    pub fn new(path: Vec<PathSegment>, reason: impl Into<String>) -> Self {
        Self {
            path,
            reason: reason.into(),
        }
    }

    /// Joins the given segments with `.`.
    #[must_use]
    pub fn join(segments: &[PathSegment]) -> String {
        segments
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Returns the full dotted path (`items.0.name`).
    #[must_use]
    pub fn field(&self) -> String {
        Self::join(&self.path)
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field(), self.reason)
    }
}

/// Shape of an acceptable request body.
///
/// # Example
///
/// ```
/// use vigil_core::Schema;
///
/// let schema = Schema::object([
///     ("name", Schema::string().min_length(1).required()),
///     ("age", Schema::integer().required()),
/// ]);
///
/// let violations = schema.violations(&serde_json::json!({ "name": "Tom" }));
/// assert_eq!(violations.len(), 1);
/// assert_eq!(violations[0].to_string(), "age: Required");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Schema {
    /// String type.
    String {
        /// Absence is a violation.
        #[serde(default)]
        required: bool,
        /// Minimum length in characters.
        min_length: Option<usize>,
        /// Maximum length in characters.
        max_length: Option<usize>,
    },
    /// Integer type.
    Integer {
        /// Absence is a violation.
        #[serde(default)]
        required: bool,
        /// Minimum value.
        minimum: Option<i64>,
        /// Maximum value.
        maximum: Option<i64>,
    },
    /// Number (float) type.
    Number {
        /// Absence is a violation.
        #[serde(default)]
        required: bool,
        /// Minimum value.
        minimum: Option<f64>,
        /// Maximum value.
        maximum: Option<f64>,
    },
    /// Boolean type.
    Boolean {
        /// Absence is a violation.
        #[serde(default)]
        required: bool,
    },
    /// Array type.
    Array {
        /// Absence is a violation.
        #[serde(default)]
        required: bool,
        /// Element schema.
        items: Box<Schema>,
        /// Element-count lower bound.
        min_items: Option<usize>,
    },
    /// Object type. Properties are validated in declaration order.
    Object {
        /// Absence is a violation.
        #[serde(default)]
        required: bool,
        /// Checked in insertion order.
        properties: IndexMap<String, Schema>,
    },
}

impl Schema {
    /// Any string.
    #[must_use]
    pub fn string() -> Self {
        Self::String {
            required: false,
            min_length: None,
            max_length: None,
        }
    }

    /// A whole number.
    #[must_use]
    pub fn integer() -> Self {
        Self::Integer {
            required: false,
            minimum: None,
            maximum: None,
        }
    }

    /// Any JSON number.
    #[must_use]
    pub fn number() -> Self {
        Self::Number {
            required: false,
            minimum: None,
            maximum: None,
        }
    }

    /// `true` or `false`.
    #[must_use]
    pub fn boolean() -> Self {
        Self::Boolean { required: false }
    }

    /// An array whose elements all match `items`.
    #[must_use]
    pub fn array(items: Self) -> Self {
        Self::Array {
            required: false,
            items: Box::new(items),
            min_items: None,
        }
    }

    /// Creates an object schema from `(name, schema)` pairs.
    #[must_use]
    pub fn object<'a>(properties: impl IntoIterator<Item = (&'a str, Self)>) -> Self {
        Self::Object {
            required: false,
            properties: properties
                .into_iter()
                .map(|(name, schema)| (name.to_string(), schema))
                .collect(),
        }
    }

    /// Reports `Required` when the field is absent, and rejects `null`.
    #[must_use]
    pub fn required(mut self) -> Self {
        match &mut self {
            Self::String { required, .. }
            | Self::Integer { required, .. }
            | Self::Number { required, .. }
            | Self::Boolean { required }
            | Self::Array { required, .. }
            | Self::Object { required, .. } => *required = true,
        }
        self
    }

    /// See [`Schema::required`].
    #[must_use]
    pub const fn is_required(&self) -> bool {
        match self {
            Self::String { required, .. }
            | Self::Integer { required, .. }
            | Self::Number { required, .. }
            | Self::Boolean { required }
            | Self::Array { required, .. }
            | Self::Object { required, .. } => *required,
        }
    }

    /// Character lower bound; ignored on non-strings.
    #[must_use]
    pub fn min_length(mut self, len: usize) -> Self {
        if let Self::String { min_length, .. } = &mut self {
            *min_length = Some(len);
        }
        self
    }

    /// Character upper bound; ignored on non-strings.
    #[must_use]
    pub fn max_length(mut self, len: usize) -> Self {
        if let Self::String { max_length, .. } = &mut self {
            *max_length = Some(len);
        }
        self
    }

    /// Inclusive lower bound for integers and numbers.
    #[must_use]
    pub fn minimum(mut self, min: i64) -> Self {
        match &mut self {
            Self::Integer { minimum, .. } => *minimum = Some(min),
            Self::Number { minimum, .. } => *minimum = Some(min as f64),
            _ => {}
        }
        self
    }

    /// Inclusive upper bound for integers and numbers.
    #[must_use]
    pub fn maximum(mut self, max: i64) -> Self {
        match &mut self {
            Self::Integer { maximum, .. } => *maximum = Some(max),
            Self::Number { maximum, .. } => *maximum = Some(max as f64),
            _ => {}
        }
        self
    }

    /// Element-count lower bound; ignored on non-arrays.
    #[must_use]
    pub fn min_items(mut self, min: usize) -> Self {
        if let Self::Array { min_items, .. } = &mut self {
            *min_items = Some(min);
        }
        self
    }

    /// Validates `value`, returning a [`PipelineError::Validation`] listing
    /// every violation.
    pub fn validate(&self, value: &Value) -> Result<(), PipelineError> {
        let violations = self.violations(value);
        if violations.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::validation(violations))
        }
    }

    /// Collects every violation in `value`.
    #[must_use]
    pub fn violations(&self, value: &Value) -> Vec<FieldViolation> {
        let mut out = Vec::new();
        let mut path = Vec::new();
        self.check(value, &mut path, &mut out);
        out
    }

    fn check(&self, value: &Value, path: &mut Vec<PathSegment>, out: &mut Vec<FieldViolation>) {
        if value.is_null() && !self.is_required() {
            return;
        }

        let mut reject = |reason: String| out.push(FieldViolation::new(path.clone(), reason));

        match self {
            Self::String {
                min_length,
                max_length,
                ..
            } => {
                let Some(s) = value.as_str() else {
                    return reject(type_mismatch("string", value));
                };
                let len = s.chars().count();
                if let Some(min) = min_length.filter(|min| len < *min) {
                    reject(format!("String must contain at least {min} character(s)"));
                }
                if let Some(max) = max_length.filter(|max| len > *max) {
                    reject(format!("String must contain at most {max} character(s)"));
                }
            }
            Self::Integer {
                minimum, maximum, ..
            } => {
                let Some(n) = value.as_i64() else {
                    return reject(if value.is_number() {
                        "Expected integer, received float".to_string()
                    } else {
                        type_mismatch("integer", value)
                    });
                };
                if let Some(min) = minimum.filter(|min| n < *min) {
                    reject(format!("Number must be greater than or equal to {min}"));
                }
                if let Some(max) = maximum.filter(|max| n > *max) {
                    reject(format!("Number must be less than or equal to {max}"));
                }
            }
            Self::Number {
                minimum, maximum, ..
            } => {
                let Some(n) = value.as_f64() else {
                    return reject(type_mismatch("number", value));
                };
                if let Some(min) = minimum.filter(|min| n < *min) {
                    reject(format!("Number must be greater than or equal to {min}"));
                }
                if let Some(max) = maximum.filter(|max| n > *max) {
                    reject(format!("Number must be less than or equal to {max}"));
                }
            }
            Self::Boolean { .. } => {
                if !value.is_boolean() {
                    reject(type_mismatch("boolean", value));
                }
            }
            Self::Array {
                items, min_items, ..
            } => {
                let Some(arr) = value.as_array() else {
                    return reject(type_mismatch("array", value));
                };
                if let Some(min) = min_items.filter(|min| arr.len() < *min) {
                    reject(format!("Array must contain at least {min} element(s)"));
                }
                for (index, item) in arr.iter().enumerate() {
                    path.push(PathSegment::Index(index));
                    items.check(item, path, out);
                    path.pop();
                }
            }
            Self::Object { properties, .. } => {
                let Some(obj) = value.as_object() else {
                    return reject(type_mismatch("object", value));
                };
                for (name, schema) in properties {
                    path.push(PathSegment::Key(name.clone()));
                    match obj.get(name) {
                        Some(field) => schema.check(field, path, out),
                        None if schema.is_required() => {
                            out.push(FieldViolation::new(path.clone(), "Required"));
                        }
                        None => {}
                    }
                    path.pop();
                }
            }
        }
    }
}

fn type_mismatch(expected: &str, value: &Value) -> String {
    format!("Expected {expected}, received {}", value_type_name(value))
}

fn value_type_name(value: &Value) -> &'static str {
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

    fn cat_schema() -> Schema {
        Schema::object([
            ("name", Schema::string().min_length(1).required()),
            ("age", Schema::integer().minimum(0).required()),
            ("breed", Schema::string().required()),
            ("nickname", Schema::string()),
        ])
    }

    #[test]
    fn test_valid_body() {
        let body = json!({ "name": "Tom", "age": 3, "breed": "tabby" });
        assert!(cat_schema().violations(&body).is_empty());
        assert!(cat_schema().validate(&body).is_ok());
    }

    #[test]
    fn test_all_missing_fields_reported_in_order() {
        let violations = cat_schema().violations(&json!({}));
        let rendered: Vec<_> = violations.iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            vec!["name: Required", "age: Required", "breed: Required"]
        );
    }

    #[test]
    fn test_type_mismatch_reason() {
        let body = json!({ "name": 5, "age": "three", "breed": "x" });
        let violations = cat_schema().violations(&body);
        assert_eq!(violations[0].reason, "Expected string, received number");
        assert_eq!(violations[1].reason, "Expected integer, received string");
    }

    #[test]
    fn test_bounds() {
        let body = json!({ "name": "", "age": -1, "breed": "x" });
        let violations = cat_schema().violations(&body);
        assert_eq!(violations.len(), 2);
        assert_eq!(violations[0].reason, "String must contain at least 1 character(s)");
        assert_eq!(violations[1].reason, "Number must be greater than or equal to 0");
    }

    #[test]
    fn test_array_paths_start_with_index() {
        let schema = Schema::array(cat_schema());
        let body = json!([{ "name": "Tom", "age": 1, "breed": "x" }, { "name": "Kit", "age": 2 }]);
        let violations = schema.violations(&body);
        assert_eq!(violations.len(), 1);
        assert_eq!(
            violations[0].path,
            vec![PathSegment::Index(1), PathSegment::key("breed")]
        );
        assert_eq!(violations[0].field(), "1.breed");
    }

    #[test]
    fn test_optional_null_accepted() {
        let body = json!({ "name": "Tom", "age": 3, "breed": "x", "nickname": null });
        assert!(cat_schema().violations(&body).is_empty());
    }

    #[test]
    fn test_validate_returns_pipeline_error() {
        let err = cat_schema().validate(&json!({ "name": "Tom" })).unwrap_err();
        match err {
            PipelineError::Validation { violations } => assert_eq!(violations.len(), 2),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_schema_deserializes() {
        let schema: Schema = serde_json::from_value(json!({
            "type": "object",
            "properties": {
                "id": { "type": "integer", "required": true, "minimum": null, "maximum": null }
            }
        }))
        .unwrap();
        assert_eq!(schema.violations(&json!({}))[0].to_string(), "id: Required");
    }
}
