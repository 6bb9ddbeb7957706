//! Structural schema validation
//!
//! Enforces only `type`, `properties`, and `required` from a declared JSON
//! schema; every other recognized keyword (`format`, `pattern`, `enum`,
//! `minimum`/`maximum`, `items`, `additionalProperties`, ...) is parsed and
//! retained so it round-trips through [`crate::store`], but never evaluated.
//! This mirrors how the teacher's `EngineConfig` validates the handful of
//! fields that affect correctness while leaving purely advisory knobs
//! (thread pool sizing, bucket ratios) unchecked.

#[cfg(test)]
mod tests;

use serde_json::Value;
use thiserror::Error;

use crate::model::Record;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SchemaError {
    #[error("field {field:?}: {message}")]
    Validation { field: String, message: String },
}

/// Validates `row` against `schema`. A `None` schema always passes — tables
/// created without a declared schema accept any JSON-shaped row.
pub fn validate(schema: Option<&Value>, row: &Record) -> Result<(), SchemaError> {
    let Some(schema) = schema else {
        return Ok(());
    };
    validate_object(schema, row, "")
}

fn validate_object(schema: &Value, row: &Record, path: &str) -> Result<(), SchemaError> {
    if let Some(declared_type) = schema.get("type").and_then(Value::as_str)
        && declared_type != "object"
        && declared_type != "array"
    {
        return Err(SchemaError::Validation {
            field: path.to_string(),
            message: format!("expected top-level type {declared_type:?}, got an object"),
        });
    }

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for field in required {
            let Some(name) = field.as_str() else { continue };
            if !row.contains_key(name) {
                return Err(SchemaError::Validation {
                    field: qualify(path, name),
                    message: "required field is missing".to_string(),
                });
            }
        }
    }

    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for (name, sub_schema) in properties {
            let Some(value) = row.get(name) else {
                continue;
            };
            validate_value(sub_schema, value, &qualify(path, name))?;
        }
    }

    Ok(())
}

fn validate_value(schema: &Value, value: &Value, path: &str) -> Result<(), SchemaError> {
    let Some(declared_type) = schema.get("type").and_then(Value::as_str) else {
        return Ok(());
    };

    if !matches_json_type(declared_type, value) {
        return Err(SchemaError::Validation {
            field: path.to_string(),
            message: format!(
                "expected type {declared_type:?}, got {}",
                json_type_name(value)
            ),
        });
    }

    if declared_type == "object"
        && let Some(obj) = value.as_object()
    {
        validate_object(schema, obj, path)?;
    }

    Ok(())
}

fn matches_json_type(declared: &str, value: &Value) -> bool {
    match declared {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array() || value.is_object(),
        "null" => value.is_null(),
        _ => true,
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

fn qualify(path: &str, field: &str) -> String {
    if path.is_empty() {
        field.to_string()
    } else {
        format!("{path}.{field}")
    }
}
