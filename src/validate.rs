//! Argument validation against a tool's compiled input contract.
//!
//! The validator walks the schema directly. It interprets `type` (including
//! unions), `enum`, `properties`, `required`, `items` and
//! `additionalProperties`; every other keyword is accepted without checks.

use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

use crate::registry::ToolDefinition;

/// Arguments that passed validation, ready for dispatch.
pub type ValidatedArguments = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    Required,
    InvalidType,
    InvalidEnumValue,
    UnrecognizedKey,
}

impl ViolationKind {
    pub fn code(self) -> &'static str {
        match self {
            ViolationKind::Required => "required",
            ViolationKind::InvalidType => "invalid_type",
            ViolationKind::InvalidEnumValue => "invalid_enum_value",
            ViolationKind::UnrecognizedKey => "unrecognized_keys",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Dotted path to the offending value; empty at the root.
    pub path: String,
    pub kind: ViolationKind,
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = if self.path.is_empty() { "(root)" } else { &self.path };
        write!(f, "{} ({}): {}", path, self.kind.code(), self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", self.summary())]
pub struct ValidationFailure {
    pub violations: Vec<Violation>,
}

impl ValidationFailure {
    pub fn summary(&self) -> String {
        self.violations
            .iter()
            .map(Violation::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Validate raw caller arguments. Non-object input is treated as `{}`.
pub fn validate(tool: &ToolDefinition, raw: Value) -> Result<ValidatedArguments, ValidationFailure> {
    let mut arguments = match raw {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    apply_defaults(&tool.input_schema, &mut arguments);

    let mut violations = Vec::new();
    let mut path = Vec::new();
    check_object(&tool.input_schema, &arguments, &mut path, &mut violations);

    if violations.is_empty() {
        Ok(arguments)
    } else {
        Err(ValidationFailure { violations })
    }
}

/// Fill absent top-level properties that declare a `default`.
fn apply_defaults(schema: &Value, arguments: &mut Map<String, Value>) {
    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return;
    };
    for (name, property) in properties {
        if let Some(default) = property.get("default") {
            if !arguments.contains_key(name) {
                arguments.insert(name.clone(), default.clone());
            }
        }
    }
}

fn check(schema: &Value, value: &Value, path: &mut Vec<String>, out: &mut Vec<Violation>) {
    let Some(rules) = schema.as_object() else {
        return;
    };

    if let Some(expected) = rules.get("type") {
        if !type_accepts(expected, value) {
            out.push(violation(
                path,
                ViolationKind::InvalidType,
                format!("Expected {}, received {}", describe_type(expected), json_type_name(value)),
            ));
            return;
        }
    }

    if let Some(Value::Array(allowed)) = rules.get("enum") {
        if !allowed.contains(value) {
            out.push(violation(
                path,
                ViolationKind::InvalidEnumValue,
                format!("Invalid enum value. Expected one of {}, received {}", Value::Array(allowed.clone()), value),
            ));
            return;
        }
    }

    match value {
        Value::Object(map) => check_object(schema, map, path, out),
        Value::Array(items) => {
            if let Some(item_schema) = rules.get("items") {
                for (index, item) in items.iter().enumerate() {
                    path.push(index.to_string());
                    check(item_schema, item, path, out);
                    path.pop();
                }
            }
        }
        _ => {}
    }
}

fn check_object(
    schema: &Value,
    map: &Map<String, Value>,
    path: &mut Vec<String>,
    out: &mut Vec<Violation>,
) {
    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for name in required.iter().filter_map(Value::as_str) {
            if !map.contains_key(name) {
                path.push(name.to_string());
                out.push(violation(
                    path,
                    ViolationKind::Required,
                    format!("Required property '{name}' is missing"),
                ));
                path.pop();
            }
        }
    }

    let properties = schema.get("properties").and_then(Value::as_object);
    if let Some(properties) = properties {
        for (name, property_schema) in properties {
            if let Some(value) = map.get(name) {
                path.push(name.clone());
                check(property_schema, value, path, out);
                path.pop();
            }
        }
    }

    let extras = map
        .iter()
        .filter(|(name, _)| properties.is_none_or(|known| !known.contains_key(*name)));
    match schema.get("additionalProperties") {
        Some(Value::Bool(false)) => {
            let unknown: Vec<&str> = extras.map(|(name, _)| name.as_str()).collect();
            if !unknown.is_empty() {
                out.push(violation(
                    path,
                    ViolationKind::UnrecognizedKey,
                    format!("Unrecognized key(s) in object: {}", unknown.join(", ")),
                ));
            }
        }
        Some(extra_schema @ Value::Object(_)) => {
            for (name, value) in extras {
                path.push(name.clone());
                check(extra_schema, value, path, out);
                path.pop();
            }
        }
        _ => {}
    }
}

fn violation(path: &[String], kind: ViolationKind, message: String) -> Violation {
    Violation {
        path: path.join("."),
        kind,
        message,
    }
}

fn type_accepts(expected: &Value, value: &Value) -> bool {
    match expected {
        Value::String(name) => type_name_accepts(name, value),
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .any(|name| type_name_accepts(name, value)),
        _ => true,
    }
}

fn type_name_accepts(name: &str, value: &Value) -> bool {
    match name {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value
            .as_f64()
            .is_some_and(|n| n.fract() == 0.0),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
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
            .join(" | "),
        other => other.to_string(),
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
