use anyhow::Result;
use rmcp::{
    ErrorData as McpError, RoleServer, ServerHandler, ServiceExt,
    model::{
        CallToolRequestParam, CallToolResult, Content, Implementation, ListToolsResult,
        PaginatedRequestParam, ProtocolVersion, ServerCapabilities, ServerInfo, Tool,
    },
    service::RequestContext,
    transport::stdio,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::session_registry::SessionRegistry;
use crate::registry::ToolDefinition;
use crate::service::{CallOutcome, ToolService};

/// MCP server exposing compiled OpenAPI operations over stdio
///
/// Tool calls are validated and forwarded to the downstream HTTP API by the
/// shared [`ToolService`]. Each call is bound to the session's cancellation
/// token and to the client's per-request token.
pub struct OpenApiMcpServer {
    service: Arc<ToolService>,
    session_cancel: CancellationToken,
    instructions: Option<String>,
}

impl OpenApiMcpServer {
    pub fn new(service: Arc<ToolService>, session_cancel: CancellationToken) -> Self {
        Self {
            service,
            session_cancel,
            instructions: None,
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Run one tool call to completion or cancellation.
    pub async fn execute(
        &self,
        name: &str,
        arguments: serde_json::Value,
        request_cancel: &CancellationToken,
    ) -> CallToolResult {
        let call_cancel = self.session_cancel.child_token();
        let outcome = tokio::select! {
            outcome = self.service.call(name, arguments, &call_cancel) => outcome,
            () = request_cancel.cancelled() => {
                call_cancel.cancel();
                log::info!("Client cancelled call to tool '{name}'");
                return CallToolResult::error(vec![Content::text(
                    "Error: call cancelled before a response arrived",
                )]);
            }
        };
        into_call_result(&outcome)
    }
}

fn into_call_result(outcome: &CallOutcome) -> CallToolResult {
    let content = vec![Content::text(outcome.render())];
    if outcome.is_error() {
        CallToolResult::error(content)
    } else {
        CallToolResult::success(content)
    }
}

fn to_rmcp_tool(tool: &ToolDefinition) -> Tool {
    let schema = match tool.input_schema.clone() {
        serde_json::Value::Object(obj) => Arc::new(obj),
        _ => Arc::new(serde_json::Map::new()),
    };
    Tool {
        name: tool.name.clone().into(),
        title: None,
        description: Some(tool.description.clone().into()),
        input_schema: schema,
        output_schema: None,
        annotations: None,
        icons: None,
        meta: None,
    }
}

/// Serve one stdio connection until the client disconnects or `shutdown` fires.
///
/// The connection is registered in `sessions` for exactly as long as it is
/// being served.
pub async fn serve_stdio(
    service: Arc<ToolService>,
    sessions: SessionRegistry,
    shutdown: CancellationToken,
    instructions: Option<String>,
) -> Result<()> {
    let guard = sessions.register();
    let session_cancel = guard.cancellation();
    log::info!(
        "Starting stdio server for connection {} with {} tool(s)",
        guard.connection_id(),
        service.registry().len()
    );

    let mut server = OpenApiMcpServer::new(service, session_cancel.clone());
    if let Some(instructions) = instructions {
        server = server.with_instructions(instructions);
    }

    let running = server.serve(stdio()).await.inspect_err(|e| {
        log::error!("serving error: {e:?}");
    })?;

    tokio::select! {
        quit = running.waiting() => {
            let reason = quit?;
            log::debug!("Stdio transport closed: {reason:?}");
        }
        () = session_cancel.cancelled() => {
            log::info!("Session cancelled, closing stdio transport");
        }
        () = shutdown.cancelled() => {
            log::info!("Shutdown requested, closing stdio transport");
        }
    }

    drop(guard);
    log::info!("Stdio server stopped");
    Ok(())
}

impl ServerHandler for OpenApiMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(self.instructions.clone().unwrap_or_else(|| {
                "OpenAPI MCP server - each tool calls one operation of the configured HTTP API"
                    .to_string()
            })),
        }
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let args = match request.arguments {
            Some(map) => serde_json::Value::Object(map),
            None => serde_json::Value::Object(serde_json::Map::new()),
        };
        Ok(self.execute(&request.name, args, &context.ct).await)
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        let tools: Vec<Tool> = self.service.registry().iter().map(to_rmcp_tool).collect();
        log::debug!("Serving {} tools", tools.len());
        Ok(ListToolsResult::with_all_items(tools))
    }
}
