use anyhow::Context;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::compiler::{CompileOptions, UnnamedOperationPolicy};
use crate::dispatch::{DEFAULT_MAX_RESPONSE_BYTES, DispatchConfig};
use crate::normalize::DEFAULT_ERROR_BODY_LIMIT;
use crate::openapi::LoadOptions;

/// Toolset configuration loaded from a JSON file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsetConfig {
    /// List of individual tool names to enable
    pub tools: Vec<String>,
}

impl ToolsetConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read toolset file: {}", path.display()))?;

        let config: ToolsetConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse toolset file as JSON: {}", path.display()))?;

        Ok(config)
    }
}

/// OpenAPI MCP Server - expose every operation of an HTTP API as an MCP tool
///
/// The API description (OpenAPI 3.x, JSON or YAML) is compiled once at
/// startup. Each operation becomes a tool whose arguments are validated
/// before the HTTP request is sent.
#[derive(Parser, Debug)]
#[command(name = "openapi-mcp")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path or http(s) URL of the OpenAPI document
    #[arg(long, value_name = "PATH|URL", env = "OPENAPI_MCP_SPEC")]
    pub spec: String,

    /// Base URL for all requests, overriding the document's `servers`
    #[arg(long, value_name = "URL", env = "OPENAPI_MCP_BASE_URL")]
    pub base_url: Option<String>,

    /// Per-call HTTP timeout in seconds (default: 30)
    /// Can also be set via `OPENAPI_MCP_TIMEOUT_SECS` environment variable
    #[arg(
        long,
        value_name = "SECONDS",
        env = "OPENAPI_MCP_TIMEOUT_SECS",
        default_value = "30"
    )]
    pub timeout: u64,

    /// Characters of an error response body kept in the error message
    #[arg(long, value_name = "CHARS", default_value_t = DEFAULT_ERROR_BODY_LIMIT)]
    pub error_body_limit: usize,

    /// Response bytes kept in memory; the remainder is discarded
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_MAX_RESPONSE_BYTES)]
    pub max_response_bytes: usize,

    /// Extra header sent with every request (can be specified multiple times)
    ///
    /// Example: --header "X-Tenant: acme"
    #[arg(long = "header", value_name = "NAME: VALUE", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// How to name operations that have no operationId
    #[arg(long, value_enum, default_value_t = UnnamedOperationPolicy::Synthesize)]
    pub unnamed_operations: UnnamedOperationPolicy,

    /// Expose operations without an `x-mcp` flag (default)
    #[arg(long, overrides_with = "exclude_by_default")]
    pub include_by_default: bool,

    /// Hide operations unless `x-mcp: true` is set on them, their path or the document
    #[arg(long, overrides_with = "include_by_default")]
    pub exclude_by_default: bool,

    /// Enable specific tools by name (comma-separated)
    ///
    /// Example: --tools getUserById,listUsers
    ///
    /// If not specified, all tools are enabled.
    #[arg(long, value_delimiter = ',', conflicts_with = "tool")]
    pub tools: Option<Vec<String>>,

    /// Enable specific tool by name (can be specified multiple times)
    ///
    /// If not specified, all tools are enabled.
    #[arg(long = "tool", conflicts_with = "tools")]
    pub tool: Vec<String>,

    /// Load tool names from JSON file
    ///
    /// JSON format:
    /// ```json
    /// { "tools": ["getUserById", "listUsers"] }
    /// ```
    #[arg(long, value_name = "PATH", conflicts_with_all = ["tool", "tools"])]
    pub toolset: Option<PathBuf>,

    /// List compiled tool names and exit
    #[arg(long)]
    pub list_tools: bool,

    /// Maximum attempts when fetching a remote OpenAPI document (default: 3)
    #[arg(long, value_name = "COUNT", default_value = "3")]
    pub load_retries: u32,

    /// Initial retry backoff in milliseconds (default: 250)
    /// Backoff doubles on each retry up to 10 seconds maximum
    #[arg(long, value_name = "MILLIS", default_value = "250")]
    pub load_retry_backoff: u64,
}

impl Cli {
    /// Get the set of enabled tool names
    ///
    /// Returns None if no filter specified (enable all tools)
    pub fn enabled_tools(&self) -> anyhow::Result<Option<HashSet<String>>> {
        if let Some(ref path) = self.toolset {
            let config = ToolsetConfig::from_file(path)?;
            return Ok(Some(config.tools.into_iter().collect()));
        }

        if let Some(tools) = &self.tools {
            return Ok(Some(tools.iter().cloned().collect()));
        }

        if !self.tool.is_empty() {
            return Ok(Some(self.tool.iter().cloned().collect()));
        }

        Ok(None)
    }

    pub fn compile_options(&self) -> CompileOptions {
        CompileOptions {
            unnamed_operations: self.unnamed_operations,
            include_by_default: !self.exclude_by_default,
            base_url: self.base_url.clone(),
        }
    }

    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            timeout: Duration::from_secs(self.timeout),
            max_response_bytes: self.max_response_bytes,
            extra_headers: self.headers.clone(),
        }
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            max_attempts: self.load_retries.max(1),
            retry_backoff: Duration::from_millis(self.load_retry_backoff),
            timeout: Duration::from_secs(self.timeout),
        }
    }
}

/// Parse `Name: value` into a header pair.
fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected 'Name: value', got '{raw}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("header name is empty in '{raw}'"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["openapi-mcp", "--spec", "api.yaml"]).unwrap();
        assert_eq!(cli.timeout, 30);
        assert_eq!(cli.error_body_limit, 200);
        assert_eq!(cli.unnamed_operations, UnnamedOperationPolicy::Synthesize);
        assert!(cli.compile_options().include_by_default);
        assert!(cli.enabled_tools().unwrap().is_none());
    }

    #[test]
    fn test_headers_and_filters() {
        let cli = Cli::try_parse_from([
            "openapi-mcp",
            "--spec",
            "api.yaml",
            "--header",
            "X-Tenant: acme",
            "--tools",
            "a,b",
            "--exclude-by-default",
            "--unnamed-operations",
            "skip",
        ])
        .unwrap();
        assert_eq!(cli.dispatch_config().extra_headers, vec![("X-Tenant".to_string(), "acme".to_string())]);
        assert_eq!(
            cli.enabled_tools().unwrap(),
            Some(HashSet::from(["a".to_string(), "b".to_string()]))
        );
        assert!(!cli.compile_options().include_by_default);
        assert_eq!(cli.unnamed_operations, UnnamedOperationPolicy::Skip);
    }

    #[test]
    fn test_malformed_header_is_rejected() {
        assert!(Cli::try_parse_from(["openapi-mcp", "--spec", "x", "--header", "no-colon"]).is_err());
        assert_eq!(parse_header("Authorization: Bearer a:b").unwrap().1, "Bearer a:b");
    }

    #[test]
    fn test_toolset_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, br#"{"tools":["listUsers"]}"#).unwrap();
        let path = file.path().to_str().unwrap().to_string();
        let cli = Cli::try_parse_from(["openapi-mcp", "--spec", "x", "--toolset", &path]).unwrap();
        assert_eq!(
            cli.enabled_tools().unwrap(),
            Some(HashSet::from(["listUsers".to_string()]))
        );
    }
}
