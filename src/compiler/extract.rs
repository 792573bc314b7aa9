//! Operation extraction: walks the path/method matrix of an API description
//! and produces one tool definition per included operation.

use serde_json::Value;
use std::collections::HashSet;

use super::contract::assemble;
use super::diagnostics::{DiagnosticKind, Diagnostics};
use super::naming::{NameAllocator, UnnamedOperationPolicy, sanitize_tool_name, synthesize_operation_id};
use super::schema::SchemaTranslator;
use crate::openapi::{
    ApiDescription, HttpMethod, Operation, Parameter, PathItem, RequestBody, SecurityScheme,
};
use crate::registry::{SecurityBinding, ToolDefinition};

#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub unnamed_operations: UnnamedOperationPolicy,
    /// Whether operations without any `x-mcp` flag are included.
    pub include_by_default: bool,
    /// Explicit base URL, overriding the document's servers.
    pub base_url: Option<String>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            unnamed_operations: UnnamedOperationPolicy::default(),
            include_by_default: true,
            base_url: None,
        }
    }
}

pub fn extract(
    api: &ApiDescription,
    options: &CompileOptions,
    diagnostics: &mut Diagnostics,
) -> Vec<ToolDefinition> {
    let mut names = NameAllocator::new();
    let mut counter = 0usize;
    let mut reported_schemes = HashSet::new();
    let mut tools = Vec::new();

    for (path, raw_item) in api.paths() {
        let Some(item) = read_path_item(api, path, raw_item, diagnostics) else {
            continue;
        };
        let shared_parameters = resolve_parameters(api, &item.parameters, path, diagnostics);

        for method in HttpMethod::ALL {
            let Some(operation) = item.operation(method) else {
                continue;
            };
            let location = format!("{method} {path}");

            if !is_included(api.x_mcp(), item.x_mcp, operation.x_mcp, options.include_by_default) {
                log::debug!("Excluding {location} (x-mcp)");
                continue;
            }

            let Some(operation_id) =
                derive_operation_id(operation, method, path, options.unnamed_operations, &mut counter)
            else {
                diagnostics.warn(
                    DiagnosticKind::SkippedOperation,
                    location,
                    "operation has no operationId and no name could be derived; skipping",
                );
                continue;
            };

            let base_name = sanitize_tool_name(&operation_id);
            let name = names.allocate(&base_name);
            if name != base_name {
                log::debug!("Tool name '{base_name}' already taken; {location} registered as '{name}'");
            }

            let own_parameters = resolve_parameters(api, &operation.parameters, &location, diagnostics);
            let parameters = merge_parameters(shared_parameters.clone(), own_parameters);
            let request_body = operation
                .request_body
                .as_ref()
                .and_then(|raw| read_request_body(api, raw, &location, diagnostics));

            let input_schema = {
                let mut translator = SchemaTranslator::new(api, diagnostics);
                translator.set_location(location.clone());
                assemble(&parameters, request_body.as_ref(), &mut translator).to_schema()
            };

            let security = bind_security(api, operation, &location, diagnostics, &mut reported_schemes);

            tools.push(ToolDefinition {
                name,
                description: describe(operation, method, path),
                input_schema,
                operation_id,
                method,
                path_template: path.to_string(),
                parameters,
                request_body,
                security,
            });
        }
    }

    tools
}

fn read_path_item(
    api: &ApiDescription,
    path: &str,
    raw: &Value,
    diagnostics: &mut Diagnostics,
) -> Option<PathItem> {
    let resolved = match api.resolve(raw) {
        Ok(resolved) => resolved,
        Err(unresolved) => {
            diagnostics.warn(DiagnosticKind::UnresolvedReference, path, unresolved.to_string());
            return None;
        }
    };
    match serde_json::from_value(resolved.clone()) {
        Ok(item) => Some(item),
        Err(e) => {
            diagnostics.warn(
                DiagnosticKind::MalformedEntry,
                path,
                format!("path item could not be read, skipping its operations: {e}"),
            );
            None
        }
    }
}

/// Most specific `x-mcp` flag wins: operation, then path item, then document.
fn is_included(
    document: Option<bool>,
    path_item: Option<bool>,
    operation: Option<bool>,
    default: bool,
) -> bool {
    operation.or(path_item).or(document).unwrap_or(default)
}

fn derive_operation_id(
    operation: &Operation,
    method: HttpMethod,
    path: &str,
    policy: UnnamedOperationPolicy,
    counter: &mut usize,
) -> Option<String> {
    let declared = operation
        .operation_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty());

    match (declared, policy) {
        (Some(id), _) => Some(id.to_string()),
        (None, UnnamedOperationPolicy::Synthesize) => {
            Some(synthesize_operation_id(method, path)).filter(|id| !id.is_empty())
        }
        (None, UnnamedOperationPolicy::Skip) => None,
        (None, UnnamedOperationPolicy::Counter) => {
            *counter += 1;
            Some(format!("operation_{counter}"))
        }
    }
}

fn describe(operation: &Operation, method: HttpMethod, path: &str) -> String {
    [&operation.description, &operation.summary]
        .into_iter()
        .flatten()
        .map(|text| text.trim())
        .find(|text| !text.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("Executes {method} {path}"))
}

fn resolve_parameters(
    api: &ApiDescription,
    raw: &[Value],
    location: &str,
    diagnostics: &mut Diagnostics,
) -> Vec<Parameter> {
    let mut parameters = Vec::with_capacity(raw.len());
    for entry in raw {
        let resolved = match api.resolve(entry) {
            Ok(resolved) => resolved,
            Err(unresolved) => {
                diagnostics.warn(
                    DiagnosticKind::UnresolvedReference,
                    location,
                    format!("parameter dropped: {unresolved}"),
                );
                continue;
            }
        };
        match serde_json::from_value::<Parameter>(resolved.clone()) {
            Ok(parameter) => parameters.push(parameter),
            Err(e) => diagnostics.warn(
                DiagnosticKind::MalformedEntry,
                location,
                format!("parameter dropped: {e}"),
            ),
        }
    }
    parameters
}

/// Operation parameters override path-level ones with the same name and location.
fn merge_parameters(mut shared: Vec<Parameter>, own: Vec<Parameter>) -> Vec<Parameter> {
    for parameter in own {
        match shared
            .iter_mut()
            .find(|existing| existing.name == parameter.name && existing.location == parameter.location)
        {
            Some(existing) => *existing = parameter,
            None => shared.push(parameter),
        }
    }
    shared
}

fn read_request_body(
    api: &ApiDescription,
    raw: &Value,
    location: &str,
    diagnostics: &mut Diagnostics,
) -> Option<RequestBody> {
    let resolved = match api.resolve(raw) {
        Ok(resolved) => resolved,
        Err(unresolved) => {
            diagnostics.warn(
                DiagnosticKind::UnresolvedReference,
                location,
                format!("request body dropped: {unresolved}"),
            );
            return None;
        }
    };
    match serde_json::from_value(resolved.clone()) {
        Ok(body) => Some(body),
        Err(e) => {
            diagnostics.warn(
                DiagnosticKind::MalformedEntry,
                location,
                format!("request body dropped: {e}"),
            );
            None
        }
    }
}

fn bind_security(
    api: &ApiDescription,
    operation: &Operation,
    location: &str,
    diagnostics: &mut Diagnostics,
    reported: &mut HashSet<String>,
) -> Vec<Vec<SecurityBinding>> {
    let requirements = operation
        .security
        .clone()
        .or_else(|| api.global_security())
        .unwrap_or_default();

    requirements
        .iter()
        .filter_map(|requirement| {
            let mut bindings = Vec::with_capacity(requirement.len());
            for scheme_name in requirement.keys() {
                match api.security_scheme(scheme_name) {
                    Some(scheme) if is_supported(&scheme) => bindings.push(SecurityBinding {
                        scheme_name: scheme_name.clone(),
                        scheme,
                    }),
                    _ => {
                        if reported.insert(scheme_name.clone()) {
                            diagnostics.warn(
                                DiagnosticKind::UnsupportedSecurityScheme,
                                location,
                                format!(
                                    "security scheme '{scheme_name}' is missing or unsupported; requirements using it are ignored"
                                ),
                            );
                        }
                        return None;
                    }
                }
            }
            Some(bindings)
        })
        .collect()
}

fn is_supported(scheme: &SecurityScheme) -> bool {
    match scheme {
        SecurityScheme::ApiKey { .. } => true,
        SecurityScheme::Http { scheme } => {
            scheme.eq_ignore_ascii_case("bearer") || scheme.eq_ignore_ascii_case("basic")
        }
        SecurityScheme::Unsupported => false,
    }
}
