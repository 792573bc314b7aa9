//! Translation of OpenAPI schema objects into the JSON Schema used for
//! runtime argument validation.
//!
//! Cycles can only arise through `$ref`, so a reference string is the
//! identity tracked in the visited set. The set holds the references on the
//! current recursion path only: the same component reached through two
//! sibling properties is translated twice, not collapsed.

use serde_json::{Map, Value, json};
use std::collections::HashSet;

use super::diagnostics::{DiagnosticKind, Diagnostics};
use crate::openapi::ApiDescription;

/// Source fields with no validation meaning.
const PRESENTATION_KEYS: &[&str] = &[
    "example",
    "examples",
    "xml",
    "externalDocs",
    "deprecated",
    "readOnly",
    "writeOnly",
    "discriminator",
];

/// Keywords whose value is a single nested schema.
const NESTED_SCHEMA_KEYS: &[&str] = &["items", "additionalProperties", "not"];

/// Keywords whose value is a list of nested schemas.
const SCHEMA_LIST_KEYS: &[&str] = &["allOf", "anyOf", "oneOf"];

pub struct SchemaTranslator<'a> {
    api: &'a ApiDescription,
    diagnostics: &'a mut Diagnostics,
    location: String,
}

impl<'a> SchemaTranslator<'a> {
    pub fn new(api: &'a ApiDescription, diagnostics: &'a mut Diagnostics) -> Self {
        Self {
            api,
            diagnostics,
            location: String::new(),
        }
    }

    /// Set the location reported with diagnostics, e.g. the operation being compiled.
    pub fn set_location(&mut self, location: impl Into<String>) {
        self.location = location.into();
    }

    pub fn diagnostics(&mut self) -> &mut Diagnostics {
        &mut *self.diagnostics
    }

    /// Translate one schema node with a fresh visited set.
    pub fn translate_root(&mut self, node: &Value) -> Value {
        let mut visited = HashSet::new();
        self.translate(node, &mut visited)
    }

    pub fn translate(&mut self, node: &Value, visited: &mut HashSet<String>) -> Value {
        let source = match node {
            Value::Object(source) => source,
            Value::Bool(_) => return node.clone(),
            _ => return open_object(None),
        };

        if let Some(reference) = source.get("$ref").and_then(Value::as_str) {
            let mut translated = self.translate_reference(reference, visited);
            if let (Some(description), Value::Object(target)) =
                (source.get("description"), &mut translated)
            {
                target.insert("description".into(), description.clone());
            }
            return translated;
        }

        let mut target = Map::with_capacity(source.len());
        for (key, value) in source {
            let key_str = key.as_str();
            if PRESENTATION_KEYS.contains(&key_str) || key_str.starts_with("x-") {
                continue;
            }
            let translated = match key_str {
                "nullable" => continue,
                "type" => coerce_type(value),
                "properties" => match value {
                    Value::Object(properties) => Value::Object(
                        properties
                            .iter()
                            .map(|(name, property)| (name.clone(), self.translate(property, visited)))
                            .collect(),
                    ),
                    other => other.clone(),
                },
                k if NESTED_SCHEMA_KEYS.contains(&k) && value.is_object() => {
                    self.translate(value, visited)
                }
                k if SCHEMA_LIST_KEYS.contains(&k) => match value {
                    Value::Array(members) => Value::Array(
                        members
                            .iter()
                            .map(|member| self.translate(member, visited))
                            .collect(),
                    ),
                    other => other.clone(),
                },
                _ => value.clone(),
            };
            target.insert(key.clone(), translated);
        }

        if source.get("nullable").and_then(Value::as_bool) == Some(true) {
            accept_null(&mut target);
        }

        Value::Object(target)
    }

    fn translate_reference(&mut self, reference: &str, visited: &mut HashSet<String>) -> Value {
        if visited.contains(reference) {
            log::debug!("Breaking schema cycle at {reference}");
            return open_object(Some(format!("Recursive reference to {reference}")));
        }

        let api = self.api;
        let Some(target) = api.resolve_pointer(reference) else {
            self.diagnostics.warn(
                DiagnosticKind::UnresolvedReference,
                self.location.clone(),
                format!("unresolved schema reference '{reference}', accepting any object"),
            );
            return open_object(Some(format!("Unresolved reference: {reference}")));
        };

        visited.insert(reference.to_string());
        let translated = self.translate(target, visited);
        visited.remove(reference);
        translated
    }
}

/// Lenient schema used for unresolved and recursive positions.
pub fn open_object(description: Option<String>) -> Value {
    let mut schema = json!({ "type": "object", "additionalProperties": true });
    if let (Some(description), Value::Object(map)) = (description, &mut schema) {
        map.insert("description".into(), Value::String(description));
    }
    schema
}

/// `integer` is widened to `number`; everything else passes through.
fn coerce_type(value: &Value) -> Value {
    match value {
        Value::String(name) if name == "integer" => Value::String("number".into()),
        Value::Array(names) => {
            let mut coerced: Vec<Value> = Vec::with_capacity(names.len());
            for name in names {
                let name = coerce_type(name);
                if !coerced.contains(&name) {
                    coerced.push(name);
                }
            }
            Value::Array(coerced)
        }
        other => other.clone(),
    }
}

fn accept_null(target: &mut Map<String, Value>) {
    let null = Value::String("null".into());
    match target.get_mut("type") {
        Some(Value::Array(types)) => {
            if !types.contains(&null) {
                types.push(null);
            }
        }
        Some(declared) => {
            let original = declared.take();
            *declared = Value::Array(vec![original, null]);
        }
        None => {
            target.insert("type".into(), null);
        }
    }
    if let Some(Value::Array(allowed)) = target.get_mut("enum") {
        if !allowed.contains(&Value::Null) {
            allowed.push(Value::Null);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(components: Value) -> ApiDescription {
        ApiDescription::from_value(json!({
            "openapi": "3.0.3",
            "components": { "schemas": components }
        }))
        .unwrap()
    }

    fn translate(api: &ApiDescription, node: Value) -> (Value, Diagnostics) {
        let mut diagnostics = Diagnostics::new();
        let result = SchemaTranslator::new(api, &mut diagnostics).translate_root(&node);
        (result, diagnostics)
    }

    #[test]
    fn test_integer_becomes_number() {
        let api = api(json!({}));
        let (schema, _) = translate(&api, json!({ "type": "integer", "format": "int64" }));
        assert_eq!(schema, json!({ "type": "number", "format": "int64" }));

        let (schema, _) = translate(&api, json!({ "type": ["integer", "number", "null"] }));
        assert_eq!(schema["type"], json!(["number", "null"]));
    }

    #[test]
    fn test_nullable_unions_with_null() {
        let api = api(json!({}));
        let (schema, _) = translate(&api, json!({ "type": "string", "nullable": true }));
        assert_eq!(schema, json!({ "type": ["string", "null"] }));

        let (schema, _) = translate(&api, json!({ "nullable": true }));
        assert_eq!(schema, json!({ "type": "null" }));

        let (schema, _) = translate(
            &api,
            json!({ "type": "string", "enum": ["a", "b"], "nullable": true }),
        );
        assert_eq!(schema["enum"], json!(["a", "b", null]));
    }

    #[test]
    fn test_presentation_fields_are_stripped() {
        let api = api(json!({}));
        let (schema, _) = translate(
            &api,
            json!({
                "type": "string",
                "example": "x",
                "xml": { "name": "n" },
                "externalDocs": { "url": "https://docs" },
                "deprecated": true,
                "readOnly": true,
                "writeOnly": false,
                "x-internal": 1,
                "minLength": 3
            }),
        );
        assert_eq!(schema, json!({ "type": "string", "minLength": 3 }));
    }

    #[test]
    fn test_direct_self_reference_terminates() {
        let api = api(json!({
            "Node": {
                "type": "object",
                "properties": {
                    "value": { "type": "integer" },
                    "next": { "$ref": "#/components/schemas/Node" }
                }
            }
        }));
        let (schema, diagnostics) = translate(&api, json!({ "$ref": "#/components/schemas/Node" }));
        assert_eq!(schema["properties"]["value"]["type"], "number");
        assert_eq!(schema["properties"]["next"]["type"], "object");
        assert_eq!(schema["properties"]["next"]["additionalProperties"], true);
        assert!(schema["properties"]["next"].get("properties").is_none());
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_mutual_reference_terminates() {
        let api = api(json!({
            "Person": {
                "type": "object",
                "properties": { "employer": { "$ref": "#/components/schemas/Company" } }
            },
            "Company": {
                "type": "object",
                "properties": {
                    "staff": { "type": "array", "items": { "$ref": "#/components/schemas/Person" } }
                }
            }
        }));
        let (schema, _) = translate(&api, json!({ "$ref": "#/components/schemas/Person" }));
        let staff_item = &schema["properties"]["employer"]["properties"]["staff"]["items"];
        assert_eq!(staff_item["type"], "object");
        assert!(
            staff_item["description"]
                .as_str()
                .unwrap()
                .contains("#/components/schemas/Person")
        );
    }

    #[test]
    fn test_sibling_reuse_is_not_treated_as_cycle() {
        let api = api(json!({
            "Address": {
                "type": "object",
                "properties": { "city": { "type": "string" } }
            }
        }));
        let (schema, _) = translate(
            &api,
            json!({
                "type": "object",
                "properties": {
                    "home": { "$ref": "#/components/schemas/Address" },
                    "work": { "$ref": "#/components/schemas/Address" }
                }
            }),
        );
        assert_eq!(schema["properties"]["home"]["properties"]["city"]["type"], "string");
        assert_eq!(schema["properties"]["work"]["properties"]["city"]["type"], "string");
    }

    #[test]
    fn test_unresolved_reference_is_lenient_and_reported() {
        let api = api(json!({}));
        let (schema, diagnostics) =
            translate(&api, json!({ "$ref": "common.yaml#/components/schemas/Thing" }));
        assert_eq!(schema["type"], "object");
        assert!(
            schema["description"]
                .as_str()
                .unwrap()
                .contains("common.yaml#/components/schemas/Thing")
        );
        assert_eq!(diagnostics.count(DiagnosticKind::UnresolvedReference), 1);
    }

    #[test]
    fn test_composition_members_are_translated() {
        let api = api(json!({
            "Base": { "type": "object", "properties": { "id": { "type": "integer" } } }
        }));
        let (schema, _) = translate(
            &api,
            json!({ "allOf": [ { "$ref": "#/components/schemas/Base" }, { "type": "object" } ] }),
        );
        assert_eq!(schema["allOf"][0]["properties"]["id"]["type"], "number");
    }
}
