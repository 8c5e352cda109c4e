//! MCP server surface: the tool catalog served over rmcp streamable HTTP.

use axum::Router;
use axum::routing::get;
use rmcp::model::{
    CallToolRequestParams, CallToolResult, Content, ListToolsResult, PaginatedRequestParams,
    ServerCapabilities, ServerInfo,
};
use rmcp::service::RequestContext;
use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;
use rmcp::transport::streamable_http_server::{StreamableHttpServerConfig, StreamableHttpService};
use rmcp::{ErrorData as McpError, RoleServer, ServerHandler};
use serde_json::{Map, Value};
use std::sync::Arc;
use zoho_books_http_tools::UpstreamClient;
use zoho_books_openapi_tools::{OpenApiToolsError, ToolCatalog};

const INSTRUCTIONS: &str = "Tools for the Zoho Books API of the connected organization. \
    Each tool maps to one Zoho Books endpoint; path, query and body fields are passed as \
    top-level arguments. Single-record responses are returned as \
    {code, message, <entity>_id, full_data}.";

#[derive(Clone)]
pub struct ZohoBooksServer {
    catalog: Arc<ToolCatalog>,
    client: UpstreamClient,
}

impl ZohoBooksServer {
    #[must_use]
    pub fn new(catalog: Arc<ToolCatalog>, client: UpstreamClient) -> Self {
        Self { catalog, client }
    }

    #[must_use]
    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    /// Run one tool call.
    ///
    /// Unknown tools are protocol errors. Everything that goes wrong after the tool is found
    /// (credentials, transport, bad arguments) is reported as an error result so the calling
    /// agent can read it.
    ///
    /// # Errors
    ///
    /// Returns `invalid_params` for an unknown tool name.
    pub async fn dispatch(
        &self,
        name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> Result<CallToolResult, McpError> {
        if !self.catalog.contains(name) {
            return Err(McpError::invalid_params(
                format!("Tool not found: {name}"),
                None,
            ));
        }
        let arguments = Value::Object(arguments.unwrap_or_default());

        match self.catalog.call_tool(&self.client, name, arguments).await {
            Ok(result) => Ok(result),
            Err(OpenApiToolsError::Upstream(e)) => {
                tracing::warn!(tool = %name, error = %e, "upstream call failed");
                Ok(CallToolResult::error(vec![Content::text(e.to_string())]))
            }
            Err(e) => {
                tracing::warn!(tool = %name, error = %e, "tool call rejected");
                Ok(CallToolResult::error(vec![Content::text(e.to_string())]))
            }
        }
    }
}

impl ServerHandler for ZohoBooksServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(INSTRUCTIONS.into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult {
            meta: None,
            next_cursor: None,
            tools: self.catalog.list_tools(),
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        self.dispatch(request.name.as_ref(), request.arguments).await
    }
}

/// `/mcp` (streamable HTTP) plus `/health`.
pub fn router(server: ZohoBooksServer) -> Router {
    let tools = server.catalog().len();
    let mcp = StreamableHttpService::new(
        move || Ok(server.clone()),
        Arc::new(LocalSessionManager::default()),
        StreamableHttpServerConfig::default(),
    );
    Router::new()
        .route(
            "/health",
            get(move || async move { axum::Json(serde_json::json!({ "status": "ok", "tools": tools })) }),
        )
        .nest_service("/mcp", mcp)
}
