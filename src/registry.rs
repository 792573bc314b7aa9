//! Compiled tool definitions and the read-only registry that holds them.

use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

use crate::openapi::{HttpMethod, Parameter, RequestBody, SecurityScheme};

/// A security scheme bound to a tool, by the name it is declared under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityBinding {
    pub scheme_name: String,
    pub scheme: SecurityScheme,
}

/// One compiled tool. Built once; never mutated afterwards.
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// Object schema with `properties` and `required`.
    pub input_schema: Value,
    pub operation_id: String,
    pub method: HttpMethod,
    pub path_template: String,
    /// Raw parameters, kept so dispatch knows where each field goes.
    pub parameters: Vec<Parameter>,
    pub request_body: Option<RequestBody>,
    /// Alternatives; the first one whose credentials are all available is used.
    pub security: Vec<Vec<SecurityBinding>>,
}

impl ToolDefinition {
    pub fn required_fields(&self) -> impl Iterator<Item = &str> {
        self.input_schema
            .get("required")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
    }

    pub fn listing(&self) -> ToolListing<'_> {
        ToolListing {
            name: &self.name,
            description: &self.description,
            input_schema: &self.input_schema,
        }
    }
}

/// Discovery triple exposed to clients.
#[derive(Debug, Clone, Serialize)]
pub struct ToolListing<'a> {
    pub name: &'a str,
    pub description: &'a str,
    #[serde(rename = "inputSchema")]
    pub input_schema: &'a Value,
}

/// Name -> tool mapping, in compile order.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDefinition>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Names are expected to be unique already; a repeated name keeps the first entry.
    pub fn new(tools: Vec<ToolDefinition>) -> Self {
        let mut registry = Self::default();
        for tool in tools {
            if registry.index.contains_key(&tool.name) {
                log::error!("Duplicate tool name '{}' dropped from registry", tool.name);
                continue;
            }
            registry.index.insert(tool.name.clone(), registry.tools.len());
            registry.tools.push(tool);
        }
        registry
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolDefinition> {
        self.tools.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.iter().map(|tool| tool.name.as_str())
    }

    pub fn listings(&self) -> Vec<ToolListing<'_>> {
        self.tools.iter().map(ToolDefinition::listing).collect()
    }

    /// Keep only the named tools. Names that match nothing are returned.
    pub fn retain_enabled(self, enabled: &HashSet<String>) -> (Self, Vec<String>) {
        let unknown = enabled
            .iter()
            .filter(|name| !self.index.contains_key(name.as_str()))
            .cloned()
            .collect();
        let tools = self
            .tools
            .into_iter()
            .filter(|tool| enabled.contains(&tool.name))
            .collect();
        (Self::new(tools), unknown)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool(name: &str) -> ToolDefinition {
        ToolDefinition {
            name: name.to_string(),
            description: format!("{name} tool"),
            input_schema: json!({ "type": "object", "properties": {}, "required": [] }),
            operation_id: name.to_string(),
            method: HttpMethod::Get,
            path_template: format!("/{name}"),
            parameters: Vec::new(),
            request_body: None,
            security: Vec::new(),
        }
    }

    #[test]
    fn test_lookup_and_order() {
        let registry = ToolRegistry::new(vec![tool("b"), tool("a")]);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("a").unwrap().path_template, "/a");
        assert!(registry.get("c").is_none());
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["b", "a"]);
    }

    #[test]
    fn test_duplicate_keeps_first() {
        let mut second = tool("a");
        second.path_template = "/second".into();
        let registry = ToolRegistry::new(vec![tool("a"), second]);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("a").unwrap().path_template, "/a");
    }

    #[test]
    fn test_listing_serializes_input_schema_key() {
        let registry = ToolRegistry::new(vec![tool("ping")]);
        let listed = serde_json::to_value(registry.listings()).unwrap();
        assert_eq!(listed[0]["name"], "ping");
        assert_eq!(listed[0]["inputSchema"]["type"], "object");
    }

    #[test]
    fn test_retain_enabled_reports_unknown_names() {
        let registry = ToolRegistry::new(vec![tool("a"), tool("b")]);
        let enabled: HashSet<String> = ["b".to_string(), "zzz".to_string()].into();
        let (filtered, unknown) = registry.retain_enabled(&enabled);
        assert_eq!(filtered.names().collect::<Vec<_>>(), vec!["b"]);
        assert_eq!(unknown, vec!["zzz".to_string()]);
    }
}
