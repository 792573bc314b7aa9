//! Compile an OpenAPI 3.x description into MCP tools and serve them.
//!
//! [`compiler::compile`] turns an [`openapi::ApiDescription`] into a
//! [`registry::ToolRegistry`] once at startup. Each call then goes through
//! [`service::ToolService::call`]: validation, HTTP dispatch and
//! normalization into a single text result.

pub mod cli;
pub mod compiler;
pub mod dispatch;
pub mod normalize;
pub mod openapi;
pub mod registry;
pub mod service;
pub mod stdio;
pub mod validate;
