//! Closed parameter schemas for tools.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// JSON type a parameter must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    /// JSON string.
    String,
    /// Any JSON number.
    Number,
    /// JSON number without a fractional part.
    Integer,
    /// JSON boolean.
    Boolean,
    /// JSON array.
    Array,
    /// JSON object.
    Object,
    /// Any JSON value, including null.
    Any,
}

impl ParamType {
    /// Returns true if `value` has this type.
    #[must_use]
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
            Self::Any => true,
        }
    }

    fn from_json_schema(name: &str) -> Option<Self> {
        match name {
            "string" => Some(Self::String),
            "number" => Some(Self::Number),
            "integer" => Some(Self::Integer),
            "boolean" => Some(Self::Boolean),
            "array" => Some(Self::Array),
            "object" => Some(Self::Object),
            _ => None,
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
            Self::Any => "any",
        };
        f.write_str(name)
    }
}

/// Describes a single parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Expected type.
    #[serde(rename = "type")]
    pub ty: ParamType,
    /// Whether the field must be present.
    #[serde(default)]
    pub required: bool,
}

/// A parameter validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParameterError {
    /// A required parameter is absent.
    #[error("missing required parameter '{0}'")]
    Missing(String),

    /// A parameter has the wrong JSON type.
    #[error("parameter '{field}' must be {expected}, got {found}")]
    WrongType {
        /// Parameter name.
        field: String,
        /// Declared type.
        expected: ParamType,
        /// JSON type actually supplied.
        found: &'static str,
    },
}

/// Required keys and expected JSON types for a tool's parameters.
///
/// Keys not named in the schema pass through unchecked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSchema {
    fields: BTreeMap<String, FieldSpec>,
}

impl ParameterSchema {
    /// Creates an empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a required field.
    #[must_use]
    pub fn required(mut self, name: impl Into<String>, ty: ParamType) -> Self {
        self.fields.insert(name.into(), FieldSpec { ty, required: true });
        self
    }

    /// Adds an optional field.
    #[must_use]
    pub fn optional(mut self, name: impl Into<String>, ty: ParamType) -> Self {
        self.fields.insert(name.into(), FieldSpec { ty, required: false });
        self
    }

    /// Builds a schema from a JSON-Schema style object
    /// (`{"properties": {...}, "required": [...]}`).
    ///
    /// Properties with no recognised `type` are accepted as [`ParamType::Any`].
    #[must_use]
    pub fn from_json_schema(schema: &Value) -> Self {
        let required: Vec<&str> = schema
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let mut fields = BTreeMap::new();
        if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
            for (name, meta) in properties {
                let ty = meta
                    .get("type")
                    .and_then(Value::as_str)
                    .and_then(ParamType::from_json_schema)
                    .unwrap_or(ParamType::Any);
                fields.insert(
                    name.clone(),
                    FieldSpec {
                        ty,
                        required: required.contains(&name.as_str()),
                    },
                );
            }
        }
        Self { fields }
    }

    /// Returns the spec for a field.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.get(name)
    }

    /// Returns true if no field is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Checks required keys and types. Fields are checked in name order and
    /// the first violation is returned.
    pub fn validate(&self, parameters: &Map<String, Value>) -> Result<(), ParameterError> {
        for (name, spec) in &self.fields {
            match parameters.get(name) {
                None if spec.required => return Err(ParameterError::Missing(name.clone())),
                None => {}
                Some(value) if !spec.ty.accepts(value) => {
                    return Err(ParameterError::WrongType {
                        field: name.clone(),
                        expected: spec.ty,
                        found: json_type_name(value),
                    });
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

fn json_type_name(value: &Value) -> &'static str {
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

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn search_schema() -> ParameterSchema {
        ParameterSchema::new()
            .required("query", ParamType::String)
            .optional("limit", ParamType::Integer)
    }

    #[test]
    fn test_valid_parameters() {
        let schema = search_schema();
        assert!(schema.validate(&params(json!({"query": "rust"}))).is_ok());
        assert!(schema
            .validate(&params(json!({"query": "rust", "limit": 5, "extra": true})))
            .is_ok());
    }

    #[test]
    fn test_missing_required() {
        let err = search_schema().validate(&params(json!({"limit": 5}))).unwrap_err();
        assert_eq!(err, ParameterError::Missing("query".to_string()));
    }

    #[test]
    fn test_wrong_type() {
        let err = search_schema()
            .validate(&params(json!({"query": "rust", "limit": 2.5})))
            .unwrap_err();
        assert_eq!(err.to_string(), "parameter 'limit' must be integer, got number");
    }

    #[test]
    fn test_from_json_schema() {
        let schema = ParameterSchema::from_json_schema(&json!({
            "type": "object",
            "properties": {
                "title": {"type": "string"},
                "tags": {"type": "array"},
                "meta": {}
            },
            "required": ["title"]
        }));

        assert_eq!(schema.field("title").unwrap().ty, ParamType::String);
        assert!(schema.field("title").unwrap().required);
        assert!(!schema.field("tags").unwrap().required);
        assert_eq!(schema.field("meta").unwrap().ty, ParamType::Any);
    }

    #[test]
    fn test_serde_shape() {
        let schema: ParameterSchema =
            serde_json::from_value(json!({"query": {"type": "string", "required": true}})).unwrap();
        assert_eq!(schema, ParameterSchema::new().required("query", ParamType::String));
    }
}
