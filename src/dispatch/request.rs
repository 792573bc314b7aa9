//! Reassembly of validated arguments into an HTTP request.

use serde_json::{Map, Value};

use super::DispatchError;
use super::security::AppliedCredential;
use crate::compiler::REQUEST_BODY_PROPERTY;
use crate::openapi::{HttpMethod, ParameterLocation, is_json_content_type};
use crate::registry::ToolDefinition;

const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// Everything needed to send one call, before it touches the network.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    pub method: HttpMethod,
    pub url: String,
    pub query: Vec<(String, String)>,
    /// Header names are lower-case.
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    pub bearer: Option<String>,
    pub basic: Option<(String, String)>,
}

impl PreparedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

pub fn prepare(
    tool: &ToolDefinition,
    arguments: &Map<String, Value>,
    base_url: Option<&str>,
    credentials: Vec<AppliedCredential>,
) -> Result<PreparedRequest, DispatchError> {
    let path = substitute_path(tool, arguments)?;

    let mut query = Vec::new();
    let mut headers = vec![("accept".to_string(), DEFAULT_CONTENT_TYPE.to_string())];
    let mut cookies = Vec::new();

    for parameter in &tool.parameters {
        let Some(value) = present(arguments, &parameter.name) else {
            continue;
        };
        match parameter.location {
            ParameterLocation::Path => {}
            ParameterLocation::Query => match value {
                Value::Array(items) => {
                    for item in items.iter().filter(|item| !item.is_null()) {
                        query.push((parameter.name.clone(), render_scalar(item)));
                    }
                }
                other => query.push((parameter.name.clone(), render_scalar(other))),
            },
            ParameterLocation::Header => {
                set_header(&mut headers, &parameter.name.to_ascii_lowercase(), render_scalar(value));
            }
            ParameterLocation::Cookie => {
                cookies.push(format!("{}={}", parameter.name, render_scalar(value)));
            }
        }
    }

    let mut bearer = None;
    let mut basic = None;
    for credential in credentials {
        match credential {
            AppliedCredential::Header { name, value } => {
                set_header(&mut headers, &name.to_ascii_lowercase(), value)
            }
            AppliedCredential::Query { name, value } => query.push((name, value)),
            AppliedCredential::Cookie { name, value } => cookies.push(format!("{name}={value}")),
            AppliedCredential::Bearer(token) => bearer = Some(token),
            AppliedCredential::Basic { username, password } => basic = Some((username, password)),
        }
    }

    if !cookies.is_empty() {
        set_header(&mut headers, "cookie", cookies.join("; "));
    }

    let mut body = None;
    if let Some(request_body) = &tool.request_body {
        if let Some(value) = present(arguments, REQUEST_BODY_PROPERTY) {
            let content_type = request_body.content_type().unwrap_or(DEFAULT_CONTENT_TYPE);
            body = Some(encode_body(value, content_type)?);
            set_header(&mut headers, "content-type", content_type.to_string());
        }
    }

    let url = match base_url {
        Some(base) => format!("{}{}", base.trim_end_matches('/'), path),
        None => path,
    };

    Ok(PreparedRequest {
        method: tool.method,
        url,
        query,
        headers,
        body,
        bearer,
        basic,
    })
}

/// Replace `{name}` placeholders with percent-encoded argument values.
fn substitute_path(tool: &ToolDefinition, arguments: &Map<String, Value>) -> Result<String, DispatchError> {
    let mut path = tool.path_template.clone();
    for parameter in tool
        .parameters
        .iter()
        .filter(|parameter| parameter.location == ParameterLocation::Path)
    {
        if let Some(value) = present(arguments, &parameter.name) {
            let encoded = urlencoding::encode(&render_scalar(value)).into_owned();
            path = path.replace(&format!("{{{}}}", parameter.name), &encoded);
        }
    }

    if has_placeholder(&path) {
        log::error!(
            "Tool '{}' passed validation but path '{}' still has unresolved placeholders",
            tool.name,
            path
        );
        return Err(DispatchError::UnresolvedPlaceholder {
            tool: tool.name.clone(),
            path,
        });
    }
    Ok(path)
}

fn has_placeholder(path: &str) -> bool {
    path.find('{')
        .is_some_and(|open| path[open..].contains('}'))
}

fn present<'a>(arguments: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    arguments.get(name).filter(|value| !value.is_null())
}

fn set_header(headers: &mut Vec<(String, String)>, name: &str, value: String) {
    match headers.iter_mut().find(|(key, _)| key == name) {
        Some(existing) => existing.1 = value,
        None => headers.push((name.to_string(), value)),
    }
}

/// Strings go out verbatim; everything else as compact JSON.
fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn encode_body(value: &Value, content_type: &str) -> Result<Vec<u8>, DispatchError> {
    if is_json_content_type(content_type) {
        return serde_json::to_vec(value)
            .map_err(|e| DispatchError::Request(format!("failed to encode request body: {e}")));
    }
    Ok(render_scalar(value).into_bytes())
}
