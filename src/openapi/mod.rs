//! OpenAPI document model and loading.

mod loader;
mod model;

pub use loader::{LoadError, LoadOptions, load, parse};
pub use model::{
    ApiDescription, ApiKeyLocation, HttpMethod, Operation, Parameter, ParameterLocation,
    PathItem, RequestBody, SecurityRequirement, SecurityScheme, Server, ServerVariable,
    UnresolvedRef, is_json_content_type,
};
