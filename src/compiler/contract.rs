//! Input contract assembly: one object schema per operation, merging the
//! operation's parameters and its request body.

use serde_json::{Map, Value, json};

use super::schema::SchemaTranslator;
use crate::openapi::{Parameter, RequestBody};

/// Reserved property carrying the request body.
pub const REQUEST_BODY_PROPERTY: &str = "requestBody";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputContract {
    pub properties: Map<String, Value>,
    pub required: Vec<String>,
}

impl InputContract {
    /// The contract as a JSON Schema object. `required` is always present.
    pub fn to_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": Value::Object(self.properties.clone()),
            "required": self.required,
        })
    }

    fn insert(&mut self, name: &str, schema: Value, required: bool) {
        self.properties.insert(name.to_string(), schema);
        let listed = self.required.iter().any(|existing| existing == name);
        if required && !listed {
            self.required.push(name.to_string());
        } else if !required && listed {
            self.required.retain(|existing| existing != name);
        }
    }
}

pub fn assemble(
    parameters: &[Parameter],
    request_body: Option<&RequestBody>,
    translator: &mut SchemaTranslator<'_>,
) -> InputContract {
    let mut contract = InputContract::default();

    for parameter in parameters {
        let mut schema = match parameter.effective_schema() {
            Some(schema) => translator.translate_root(schema),
            None => json!({ "type": "string" }),
        };
        if let (Some(description), Value::Object(map)) = (&parameter.description, &mut schema) {
            map.insert("description".into(), Value::String(description.clone()));
        }
        contract.insert(&parameter.name, schema, parameter.required);
    }

    if let Some(body) = request_body {
        let json_schema = body
            .json_media()
            .and_then(|(_, media)| media.get("schema"))
            .map(|schema| translator.translate_root(schema));

        let mut schema = match json_schema {
            Some(schema) => schema,
            None => {
                let content_type = body.content_type().unwrap_or("unspecified");
                json!({
                    "type": "string",
                    "description": format!("Request body (content type: {content_type})"),
                })
            }
        };
        if let (Some(description), Value::Object(map)) = (&body.description, &mut schema) {
            map.entry("description")
                .or_insert_with(|| Value::String(description.clone()));
        }
        contract.insert(REQUEST_BODY_PROPERTY, schema, body.required);
    }

    contract
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::diagnostics::Diagnostics;
    use crate::openapi::ApiDescription;

    fn empty_api() -> ApiDescription {
        ApiDescription::from_value(json!({ "openapi": "3.0.3" })).unwrap()
    }

    fn param(value: Value) -> Parameter {
        serde_json::from_value(value).unwrap()
    }

    fn body(value: Value) -> RequestBody {
        serde_json::from_value(value).unwrap()
    }

    fn run(parameters: &[Parameter], request_body: Option<&RequestBody>) -> InputContract {
        let api = empty_api();
        let mut diagnostics = Diagnostics::new();
        let mut translator = SchemaTranslator::new(&api, &mut diagnostics);
        assemble(parameters, request_body, &mut translator)
    }

    #[test]
    fn test_parameters_become_properties() {
        let contract = run(
            &[
                param(json!({
                    "name": "id", "in": "path", "required": true,
                    "description": "User id",
                    "schema": { "type": "integer", "description": "inner" }
                })),
                param(json!({ "name": "verbose", "in": "query", "schema": { "type": "boolean" } })),
                param(json!({ "name": "X-Trace", "in": "header" })),
            ],
            None,
        );
        assert_eq!(contract.properties["id"], json!({ "type": "number", "description": "User id" }));
        assert_eq!(contract.properties["verbose"]["type"], "boolean");
        assert_eq!(contract.properties["X-Trace"]["type"], "string");
        assert_eq!(contract.required, vec!["id".to_string()]);
    }

    #[test]
    fn test_json_body_is_installed_under_reserved_name() {
        let request_body = body(json!({
            "required": true,
            "content": { "application/json": { "schema": {
                "type": "object",
                "properties": { "name": { "type": "string" } },
                "required": ["name"]
            } } }
        }));
        let contract = run(&[], Some(&request_body));
        assert_eq!(contract.properties[REQUEST_BODY_PROPERTY]["properties"]["name"]["type"], "string");
        assert_eq!(contract.required, vec![REQUEST_BODY_PROPERTY.to_string()]);
    }

    #[test]
    fn test_non_json_body_becomes_string_placeholder() {
        let request_body = body(json!({
            "content": { "text/csv": { "schema": { "type": "string" } } }
        }));
        let contract = run(&[], Some(&request_body));
        let placeholder = &contract.properties[REQUEST_BODY_PROPERTY];
        assert_eq!(placeholder["type"], "string");
        assert!(placeholder["description"].as_str().unwrap().contains("text/csv"));
        assert!(contract.required.is_empty());
    }

    #[test]
    fn test_json_body_without_schema_becomes_placeholder() {
        let request_body = body(json!({ "content": { "application/json": {} } }));
        let contract = run(&[], Some(&request_body));
        assert_eq!(contract.properties[REQUEST_BODY_PROPERTY]["type"], "string");
    }

    #[test]
    fn test_schema_always_lists_required() {
        let schema = run(&[], None).to_schema();
        assert_eq!(schema, json!({ "type": "object", "properties": {}, "required": [] }));
    }

    #[test]
    fn test_later_declaration_of_same_name_wins() {
        let contract = run(
            &[
                param(json!({ "name": "id", "in": "path", "required": true })),
                param(json!({ "name": "id", "in": "query", "required": false })),
            ],
            None,
        );
        assert_eq!(contract.properties.len(), 1);
        assert!(contract.required.is_empty());
    }
}
