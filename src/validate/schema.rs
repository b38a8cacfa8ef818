//! Schema-subset validation (spec §4.5 step 1): types, required fields,
//! string length/pattern, numeric min/max, array `minItems`, enum
//! membership, recursing through `properties`.

use regex::Regex;

use crate::model::Value;
use crate::schemagen::Schema;

/// Validates `value` against `schema`, returning one message per violation.
pub fn validate(value: &Value, schema: &Schema) -> Vec<String> {
    let mut errors = Vec::new();
    validate_at(value, schema, "$", &mut errors);
    errors
}

fn validate_at(value: &Value, schema: &Schema, path: &str, errors: &mut Vec<String>) {
    if let Some(ty) = &schema.ty {
        if !type_matches(ty, value) {
            errors.push(format!("{}: expected type '{}', found {}", path, ty, type_name(value)));
            return;
        }
    }

    if let Some(enum_values) = &schema.enum_values {
        let yaml = value.to_yaml();
        if !enum_values.iter().any(|v| v == &yaml) {
            errors.push(format!("{}: value not in enum", path));
        }
    }

    match value {
        Value::String(s) => {
            if let Some(min) = schema.min_length {
                if s.chars().count() < min {
                    errors.push(format!("{}: string shorter than minLength {}", path, min));
                }
            }
            if let Some(max) = schema.max_length {
                if s.chars().count() > max {
                    errors.push(format!("{}: string longer than maxLength {}", path, max));
                }
            }
            if let Some(pattern) = &schema.pattern {
                match Regex::new(pattern) {
                    Ok(re) if !re.is_match(s) => errors.push(format!("{}: does not match pattern '{}'", path, pattern)),
                    Err(_) => errors.push(format!("{}: invalid schema pattern '{}'", path, pattern)),
                    _ => {}
                }
            }
        }
        Value::Int(n) => check_numeric_bounds(*n as f64, schema, path, errors),
        Value::Float(n) => check_numeric_bounds(*n, schema, path, errors),
        Value::List(items) => {
            if let Some(min_items) = schema.min_items {
                if items.len() < min_items {
                    errors.push(format!("{}: array shorter than minItems {}", path, min_items));
                }
            }
            if let Some(item_schema) = &schema.items {
                for (i, item) in items.iter().enumerate() {
                    validate_at(item, item_schema, &format!("{}[{}]", path, i), errors);
                }
            }
        }
        Value::Map(map) => {
            for required in &schema.required {
                if !map.contains_key(required) {
                    errors.push(format!("{}: missing required field '{}'", path, required));
                }
            }
            for (key, prop_schema) in &schema.properties {
                if let Some(child) = map.get(key) {
                    validate_at(child, prop_schema, &format!("{}.{}", path, key), errors);
                }
            }
        }
        _ => {}
    }
}

fn check_numeric_bounds(n: f64, schema: &Schema, path: &str, errors: &mut Vec<String>) {
    if let Some(min) = schema.minimum {
        if n < min {
            errors.push(format!("{}: {} below minimum {}", path, n, min));
        }
    }
    if let Some(max) = schema.maximum {
        if n > max {
            errors.push(format!("{}: {} above maximum {}", path, n, max));
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Int(_) => "integer",
        Value::Float(_) => "number",
        Value::String(_) => "string",
        Value::List(_) => "array",
        Value::Map(_) => "object",
    }
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "integer" => matches!(value, Value::Int(_)),
        "number" => matches!(value, Value::Int(_) | Value::Float(_)),
        "string" => matches!(value, Value::String(_)),
        "boolean" => matches!(value, Value::Bool(_)),
        "array" => matches!(value, Value::List(_)),
        "object" => matches!(value, Value::Map(_)),
        "null" => matches!(value, Value::Null),
        _ => true,
    }
}
