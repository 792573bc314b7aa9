//! Typed view over an OpenAPI v3 document.
//!
//! The raw document is kept as a `serde_json::Value` so that local `$ref`
//! pointers can be resolved against it and schema nodes can be carried
//! through untouched. Structural pieces (path items, operations, parameters,
//! request bodies, servers, security schemes) are deserialized on demand.

use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Upper bound on chained `$ref` hops before a reference is treated as unresolved.
const MAX_REF_HOPS: usize = 32;

/// HTTP methods an OpenAPI path item may declare, in canonical iteration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Put,
    Post,
    Delete,
    Options,
    Head,
    Patch,
    Trace,
}

impl HttpMethod {
    pub const ALL: [HttpMethod; 8] = [
        HttpMethod::Get,
        HttpMethod::Put,
        HttpMethod::Post,
        HttpMethod::Delete,
        HttpMethod::Options,
        HttpMethod::Head,
        HttpMethod::Patch,
        HttpMethod::Trace,
    ];

    /// Lower-case form, as used for path item keys.
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "get",
            HttpMethod::Put => "put",
            HttpMethod::Post => "post",
            HttpMethod::Delete => "delete",
            HttpMethod::Options => "options",
            HttpMethod::Head => "head",
            HttpMethod::Patch => "patch",
            HttpMethod::Trace => "trace",
        }
    }

    pub fn to_reqwest(self) -> reqwest::Method {
        match self {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Options => reqwest::Method::OPTIONS,
            HttpMethod::Head => reqwest::Method::HEAD,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Trace => reqwest::Method::TRACE,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str().to_ascii_uppercase())
    }
}

/// Where a parameter lives in the outgoing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
    Path,
    Query,
    Header,
    Cookie,
}

impl fmt::Display for ParameterLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ParameterLocation::Path => "path",
            ParameterLocation::Query => "query",
            ParameterLocation::Header => "header",
            ParameterLocation::Cookie => "cookie",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "in")]
    pub location: ParameterLocation,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub schema: Option<Value>,
    /// Alternative to `schema`: a single-entry media type map.
    #[serde(default)]
    pub content: Option<Map<String, Value>>,
}

impl Parameter {
    /// The parameter's schema, falling back to the schema of its first content entry.
    pub fn effective_schema(&self) -> Option<&Value> {
        self.schema.as_ref().or_else(|| {
            self.content
                .as_ref()
                .and_then(|content| content.values().next())
                .and_then(|media| media.get("schema"))
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequestBody {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub content: Map<String, Value>,
}

impl RequestBody {
    /// The JSON media type entry, preferring `application/json` over other `json` types.
    pub fn json_media(&self) -> Option<(&str, &Value)> {
        if let Some((key, media)) = self.content.get_key_value("application/json") {
            return Some((key.as_str(), media));
        }
        self.content
            .iter()
            .find(|(content_type, _)| is_json_content_type(content_type))
            .map(|(key, media)| (key.as_str(), media))
    }

    /// Content type used on the wire when a body value is sent.
    pub fn content_type(&self) -> Option<&str> {
        self.json_media()
            .map(|(content_type, _)| content_type)
            .or_else(|| self.content.keys().next().map(String::as_str))
    }
}

/// `true` for `application/json`, `application/problem+json`, `text/json` and friends.
pub fn is_json_content_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence.ends_with("/json") || essence.ends_with("+json")
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerVariable {
    pub default: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Server {
    pub url: String,
    #[serde(default)]
    pub variables: BTreeMap<String, ServerVariable>,
}

impl Server {
    /// Server URL with every `{variable}` replaced by its declared default.
    pub fn expanded_url(&self) -> String {
        self.variables
            .iter()
            .fold(self.url.clone(), |url, (name, variable)| {
                url.replace(&format!("{{{name}}}"), &variable.default)
            })
    }
}

/// One alternative of a security requirement: scheme name -> scopes.
pub type SecurityRequirement = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiKeyLocation {
    Header,
    Query,
    Cookie,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum SecurityScheme {
    #[serde(rename = "apiKey")]
    ApiKey {
        name: String,
        #[serde(rename = "in")]
        location: ApiKeyLocation,
    },
    #[serde(rename = "http")]
    Http { scheme: String },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    #[serde(default)]
    pub operation_id: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Raw entries: either inline parameters or `$ref`s.
    #[serde(default)]
    pub parameters: Vec<Value>,
    /// Raw entry: either an inline request body or a `$ref`.
    #[serde(default)]
    pub request_body: Option<Value>,
    #[serde(default)]
    pub security: Option<Vec<SecurityRequirement>>,
    #[serde(default, rename = "x-mcp")]
    pub x_mcp: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathItem {
    #[serde(default)]
    pub parameters: Vec<Value>,
    #[serde(default, rename = "x-mcp")]
    pub x_mcp: Option<bool>,
    #[serde(default)]
    pub get: Option<Operation>,
    #[serde(default)]
    pub put: Option<Operation>,
    #[serde(default)]
    pub post: Option<Operation>,
    #[serde(default)]
    pub delete: Option<Operation>,
    #[serde(default)]
    pub options: Option<Operation>,
    #[serde(default)]
    pub head: Option<Operation>,
    #[serde(default)]
    pub patch: Option<Operation>,
    #[serde(default)]
    pub trace: Option<Operation>,
}

impl PathItem {
    pub fn operation(&self, method: HttpMethod) -> Option<&Operation> {
        match method {
            HttpMethod::Get => self.get.as_ref(),
            HttpMethod::Put => self.put.as_ref(),
            HttpMethod::Post => self.post.as_ref(),
            HttpMethod::Delete => self.delete.as_ref(),
            HttpMethod::Options => self.options.as_ref(),
            HttpMethod::Head => self.head.as_ref(),
            HttpMethod::Patch => self.patch.as_ref(),
            HttpMethod::Trace => self.trace.as_ref(),
        }
    }
}

/// A reference that could not be followed inside the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedRef(pub String);

impl fmt::Display for UnresolvedRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unresolved reference '{}'", self.0)
    }
}

/// A parsed API description. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct ApiDescription {
    root: Value,
}

impl ApiDescription {
    /// Wrap a parsed document. Only the top-level shape is checked here.
    pub fn from_value(root: Value) -> Result<Self, super::LoadError> {
        if !root.is_object() {
            return Err(super::LoadError::NotAnObject);
        }
        if root.get("openapi").is_none() {
            log::warn!("Document has no 'openapi' version field; treating it as OpenAPI 3");
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    pub fn title(&self) -> Option<&str> {
        self.root.pointer("/info/title").and_then(Value::as_str)
    }

    /// Declared servers; malformed entries are dropped.
    pub fn servers(&self) -> Vec<Server> {
        self.root
            .get("servers")
            .and_then(Value::as_array)
            .map(|servers| {
                servers
                    .iter()
                    .filter_map(|server| serde_json::from_value(server.clone()).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Path templates with their raw path items, in declaration order.
    pub fn paths(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.root
            .get("paths")
            .and_then(Value::as_object)
            .into_iter()
            .flat_map(|paths| paths.iter().map(|(path, item)| (path.as_str(), item)))
    }

    /// Root-level `x-mcp` flag.
    pub fn x_mcp(&self) -> Option<bool> {
        self.root.get("x-mcp").and_then(Value::as_bool)
    }

    pub fn global_security(&self) -> Option<Vec<SecurityRequirement>> {
        self.root
            .get("security")
            .and_then(|security| serde_json::from_value(security.clone()).ok())
    }

    pub fn security_scheme(&self, name: &str) -> Option<SecurityScheme> {
        let scheme = self.root.get("components")?.get("securitySchemes")?.get(name)?;
        let scheme = self.resolve(scheme).ok()?;
        serde_json::from_value(scheme.clone()).ok()
    }

    /// Look up a local `#/...` JSON pointer. External references yield `None`.
    pub fn resolve_pointer(&self, reference: &str) -> Option<&Value> {
        let pointer = reference.strip_prefix('#')?;
        if pointer.is_empty() {
            return Some(&self.root);
        }
        let decoded = urlencoding::decode(pointer).ok()?;
        self.root.pointer(&decoded)
    }

    /// Follow `$ref` chains until a non-reference node is reached.
    pub fn resolve<'a>(&'a self, value: &'a Value) -> Result<&'a Value, UnresolvedRef> {
        let mut current = value;
        for _ in 0..MAX_REF_HOPS {
            let Some(reference) = current.get("$ref").and_then(Value::as_str) else {
                return Ok(current);
            };
            current = self
                .resolve_pointer(reference)
                .ok_or_else(|| UnresolvedRef(reference.to_string()))?;
        }
        Err(UnresolvedRef(
            value
                .get("$ref")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> ApiDescription {
        ApiDescription::from_value(value).expect("valid document")
    }

    #[test]
    fn test_resolve_local_pointer() {
        let api = doc(json!({
            "openapi": "3.0.3",
            "components": { "schemas": { "Pet": { "type": "object" } } }
        }));
        assert_eq!(
            api.resolve_pointer("#/components/schemas/Pet"),
            Some(&json!({ "type": "object" }))
        );
        assert!(api.resolve_pointer("other.yaml#/Pet").is_none());
        assert!(api.resolve_pointer("#/components/schemas/Missing").is_none());
    }

    #[test]
    fn test_resolve_follows_chains_and_stops_on_loops() {
        let api = doc(json!({
            "openapi": "3.0.3",
            "components": { "parameters": {
                "A": { "$ref": "#/components/parameters/B" },
                "B": { "name": "id", "in": "path" },
                "Loop": { "$ref": "#/components/parameters/Loop" }
            } }
        }));
        let chained = json!({ "$ref": "#/components/parameters/A" });
        assert_eq!(api.resolve(&chained).unwrap()["name"], "id");

        let looping = json!({ "$ref": "#/components/parameters/Loop" });
        assert!(api.resolve(&looping).is_err());
    }

    #[test]
    fn test_server_variables_expand_to_defaults() {
        let server: Server = serde_json::from_value(json!({
            "url": "https://{region}.example.com/{version}",
            "variables": {
                "region": { "default": "eu" },
                "version": { "default": "v2" }
            }
        }))
        .unwrap();
        assert_eq!(server.expanded_url(), "https://eu.example.com/v2");
    }

    #[test]
    fn test_request_body_prefers_application_json() {
        let body: RequestBody = serde_json::from_value(json!({
            "content": {
                "application/xml": {},
                "application/merge-patch+json": { "schema": { "type": "object" } },
                "application/json": { "schema": { "type": "array" } }
            }
        }))
        .unwrap();
        assert_eq!(body.json_media().unwrap().0, "application/json");
        assert_eq!(body.content_type(), Some("application/json"));
    }

    #[test]
    fn test_security_scheme_parsing() {
        let api = doc(json!({
            "openapi": "3.0.3",
            "components": { "securitySchemes": {
                "key": { "type": "apiKey", "name": "X-Api-Key", "in": "header" },
                "token": { "type": "http", "scheme": "bearer" },
                "oauth": { "type": "oauth2", "flows": {} }
            } }
        }));
        assert_eq!(
            api.security_scheme("key"),
            Some(SecurityScheme::ApiKey {
                name: "X-Api-Key".into(),
                location: ApiKeyLocation::Header
            })
        );
        assert_eq!(
            api.security_scheme("token"),
            Some(SecurityScheme::Http { scheme: "bearer".into() })
        );
        assert_eq!(api.security_scheme("oauth"), Some(SecurityScheme::Unsupported));
        assert_eq!(api.security_scheme("nope"), None);
    }

    #[test]
    fn test_paths_keep_declaration_order() {
        let api = doc(json!({
            "openapi": "3.0.3",
            "paths": { "/b": {}, "/a": {}, "/c": {} }
        }));
        let order: Vec<&str> = api.paths().map(|(path, _)| path).collect();
        assert_eq!(order, vec!["/b", "/a", "/c"]);
    }
}
