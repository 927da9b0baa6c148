//! Structural validation of tool arguments against a JSON schema subset
//!
//! Supported keywords: `type`, `properties`, `required`, `enum`, `items`,
//! `additionalProperties` (as `false` or a schema). Unknown keywords are
//! ignored.

use serde_json::{Map, Value};
use thiserror::Error;

/// Argument validation failure; `path` points at the offending value
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("arguments must be a JSON object, got {0}")]
    NotAnObject(&'static str),

    #[error("{path}: expected {expected}, got {found}")]
    TypeMismatch {
        path: String,
        expected: String,
        found: &'static str,
    },

    #[error("{path}: missing required field '{field}'")]
    MissingField { path: String, field: String },

    #[error("{path}: unexpected field '{field}'")]
    UnexpectedField { path: String, field: String },

    #[error("{path}: {value} is not one of {allowed}")]
    NotInEnum {
        path: String,
        value: String,
        allowed: String,
    },
}

/// Validate tool call arguments. `null` counts as an empty object; the
/// returned value is what the tool should receive.
pub fn validate_arguments(schema: &Value, args: Value) -> Result<Value, SchemaError> {
    let args = match args {
        Value::Null => Value::Object(Map::new()),
        Value::Object(_) => args,
        other => return Err(SchemaError::NotAnObject(kind(&other))),
    };
    validate(schema, &args)?;
    Ok(args)
}

/// Validate any value against a schema
pub fn validate(schema: &Value, value: &Value) -> Result<(), SchemaError> {
    check(schema, value, "$")
}

fn check(schema: &Value, value: &Value, path: &str) -> Result<(), SchemaError> {
    let Some(schema) = schema.as_object() else {
        return Ok(());
    };

    if let Some(expected) = schema.get("type") {
        if !type_matches(expected, value) {
            return Err(SchemaError::TypeMismatch {
                path: path.to_string(),
                expected: describe_type(expected),
                found: kind(value),
            });
        }
    }

    if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
        if !allowed.contains(value) {
            return Err(SchemaError::NotInEnum {
                path: path.to_string(),
                value: value.to_string(),
                allowed: Value::Array(allowed.clone()).to_string(),
            });
        }
    }

    match value {
        Value::Object(fields) => check_object(schema, fields, path),
        Value::Array(items) => {
            if let Some(item_schema) = schema.get("items") {
                for (i, item) in items.iter().enumerate() {
                    check(item_schema, item, &format!("{}[{}]", path, i))?;
                }
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn check_object(
    schema: &Map<String, Value>,
    fields: &Map<String, Value>,
    path: &str,
) -> Result<(), SchemaError> {
    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for field in required.iter().filter_map(Value::as_str) {
            if !fields.contains_key(field) {
                return Err(SchemaError::MissingField {
                    path: path.to_string(),
                    field: field.to_string(),
                });
            }
        }
    }

    let properties = schema.get("properties").and_then(Value::as_object);
    let additional = schema.get("additionalProperties");

    for (name, value) in fields {
        let field_path = format!("{}.{}", path, name);
        match properties.and_then(|p| p.get(name)) {
            Some(field_schema) => check(field_schema, value, &field_path)?,
            None => match additional {
                Some(Value::Bool(false)) => {
                    return Err(SchemaError::UnexpectedField {
                        path: path.to_string(),
                        field: name.clone(),
                    })
                }
                Some(extra @ Value::Object(_)) => check(extra, value, &field_path)?,
                _ => {}
            },
        }
    }
    Ok(())
}

fn type_matches(expected: &Value, value: &Value) -> bool {
    match expected {
        Value::String(name) => matches_named(name, value),
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .any(|name| matches_named(name, value)),
        _ => true,
    }
}

fn matches_named(name: &str, value: &Value) -> bool {
    match name {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        "number" => value.is_number(),
        "integer" => match value {
            Value::Number(n) => {
                n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
            }
            _ => false,
        },
        _ => true,
    }
}

fn describe_type(expected: &Value) -> String {
    match expected {
        Value::String(name) => name.clone(),
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(" or "),
        other => other.to_string(),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
