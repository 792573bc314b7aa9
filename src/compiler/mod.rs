//! Build-time compilation of an API description into a tool registry.

pub mod contract;
pub mod diagnostics;
pub mod extract;
pub mod naming;
pub mod schema;
pub mod servers;

pub use contract::{InputContract, REQUEST_BODY_PROPERTY};
pub use diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
pub use extract::CompileOptions;
pub use naming::UnnamedOperationPolicy;
pub use schema::SchemaTranslator;

use crate::openapi::ApiDescription;
use crate::registry::ToolRegistry;

/// Output of one compilation pass.
#[derive(Debug)]
pub struct Compilation {
    pub registry: ToolRegistry,
    /// Base URL every dispatched path is appended to.
    pub base_url: Option<String>,
    pub diagnostics: Vec<Diagnostic>,
}

pub fn compile(api: &ApiDescription, options: &CompileOptions) -> Compilation {
    let mut diagnostics = Diagnostics::new();
    let base_url = servers::resolve_base_url(
        options.base_url.as_deref(),
        &api.servers(),
        &mut diagnostics,
    );
    let tools = extract::extract(api, options, &mut diagnostics);
    let registry = ToolRegistry::new(tools);

    log::info!(
        "Compiled {} tool(s) from {} with {} warning(s)",
        registry.len(),
        api.title().unwrap_or("API description"),
        diagnostics.len()
    );

    Compilation {
        registry,
        base_url,
        diagnostics: diagnostics.into_vec(),
    }
}
