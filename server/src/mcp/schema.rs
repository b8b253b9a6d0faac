//! Tool argument validation
//!
//! Checks call arguments against the declared [`ToolInputSchema`]: required
//! fields, JSON types, enum spellings, numeric bounds and undeclared fields.
//! A failed check is reported before any handler touches the graph.

use serde_json::{Map, Value};

use super::protocol::{PropertySchema, ToolInputSchema};
use crate::error::ToolError;

/// Validate `args` against `schema`, returning the arguments as an object.
///
/// Absent arguments are treated as an empty object.
pub fn validate_arguments(
    schema: &ToolInputSchema,
    args: Option<Value>,
) -> Result<Map<String, Value>, ToolError> {
    let args = match args {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map,
        Some(other) => {
            return Err(ToolError::validation(format!(
                "arguments must be an object, got {}",
                type_name(&other)
            )))
        }
    };

    let empty = Default::default();
    let properties = schema.properties.as_ref().unwrap_or(&empty);

    if let Some(required) = &schema.required {
        for field in required {
            if args.get(field).map_or(true, Value::is_null) {
                return Err(ToolError::validation(format!(
                    "missing required argument '{}'",
                    field
                )));
            }
        }
    }

    for (field, value) in &args {
        match properties.get(field) {
            Some(property) => {
                if !value.is_null() {
                    check_value(field, property, value)?;
                }
            }
            None if !schema.additional_properties => {
                return Err(ToolError::validation(format!(
                    "unknown argument '{}'",
                    field
                )));
            }
            None => {}
        }
    }

    Ok(args)
}

fn check_value(field: &str, property: &PropertySchema, value: &Value) -> Result<(), ToolError> {
    let type_ok = match property.property_type.as_str() {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => true,
    };
    if !type_ok {
        return Err(ToolError::validation(format!(
            "argument '{}' must be of type {}, got {}",
            field,
            property.property_type,
            type_name(value)
        )));
    }

    if let (Some(allowed), Some(text)) = (&property.enum_values, value.as_str()) {
        if !allowed.iter().any(|a| a == text) {
            return Err(ToolError::validation(format!(
                "argument '{}' must be one of: {}",
                field,
                allowed.join(", ")
            )));
        }
    }

    if let Some(number) = value.as_f64() {
        if let Some(min) = property.minimum {
            if number < min {
                return Err(ToolError::validation(format!(
                    "argument '{}' must be >= {}",
                    field, min
                )));
            }
        }
        if let Some(max) = property.maximum {
            if number > max {
                return Err(ToolError::validation(format!(
                    "argument '{}' must be <= {}",
                    field, max
                )));
            }
        }
    }

    if let (Some(items), Some(elements)) = (&property.items, value.as_array()) {
        for (i, element) in elements.iter().enumerate() {
            check_value(&format!("{}[{}]", field, i), items, element)?;
        }
    }

    Ok(())
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
