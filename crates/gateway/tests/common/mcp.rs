use anyhow::Context as _;
use rmcp::model::ClientJsonRpcMessage;
use rmcp::transport::streamable_http_client::{
    StreamableHttpClient as _, StreamableHttpPostResponse,
};
use serde_json::{Value, json};
use std::sync::Arc;

/// Minimal MCP client for gateway integration tests, built on rmcp's streamable HTTP plumbing.
pub struct McpSession {
    client: reqwest::Client,
    uri: Arc<str>,
    session_id: Arc<str>,
    next_id: std::sync::atomic::AtomicU64,
}

impl McpSession {
    pub async fn connect(uri: impl Into<Arc<str>>) -> anyhow::Result<Self> {
        let client = reqwest::Client::new();
        let uri: Arc<str> = uri.into();

        let init: ClientJsonRpcMessage = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 0,
            "method": "initialize",
            "params": {
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": { "name": "zoho-books-gateway-tests", "version": "0" }
            }
        }))
        .context("initialize message")?;

        let resp = client
            .post_message(uri.clone(), init, None, None)
            .await
            .context("POST initialize")?;
        let (_msg, session_id) = resp
            .expect_initialized::<reqwest::Error>()
            .await
            .context("expect initialize response")?;
        let session_id = session_id.context("missing Mcp-Session-Id header")?.into();

        let session = Self {
            client,
            uri,
            session_id,
            next_id: std::sync::atomic::AtomicU64::new(1),
        };

        let initialized: ClientJsonRpcMessage = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "method": "notifications/initialized"
        }))
        .context("initialized notification")?;
        session
            .client
            .post_message(
                session.uri.clone(),
                initialized,
                Some(session.session_id.clone()),
                None,
            )
            .await
            .context("POST notifications/initialized")?
            .expect_accepted::<reqwest::Error>()
            .context("expected 202 Accepted")?;

        Ok(session)
    }

    /// Send one request and return the server's JSON-RPC reply as JSON.
    pub async fn request(&self, method: &str, params: Value) -> anyhow::Result<Value> {
        let id = self
            .next_id
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let msg: ClientJsonRpcMessage = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        }))
        .with_context(|| format!("{method} message"))?;

        let resp = self
            .client
            .post_message(self.uri.clone(), msg, Some(self.session_id.clone()), None)
            .await
            .with_context(|| format!("POST {method}"))?;

        let server_msg = read_first_server_message(resp).await?;
        serde_json::to_value(server_msg).context("serialize server message to json")
    }

    pub async fn list_tool_names(&self) -> anyhow::Result<Vec<String>> {
        let reply = self.request("tools/list", json!({})).await?;
        let tools = reply["result"]["tools"]
            .as_array()
            .context("tools/list result has no tools array")?;
        Ok(tools
            .iter()
            .filter_map(|t| t["name"].as_str().map(str::to_string))
            .collect())
    }

    /// `tools/call`, returning `(is_error, first text content)`.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> anyhow::Result<(bool, String)> {
        let reply = self
            .request("tools/call", json!({ "name": name, "arguments": arguments }))
            .await?;
        let result = &reply["result"];
        anyhow::ensure!(!result.is_null(), "tools/call failed: {reply}");
        let is_error = result["isError"].as_bool().unwrap_or(false);
        let text = result["content"][0]["text"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        Ok((is_error, text))
    }
}

async fn read_first_server_message(
    resp: StreamableHttpPostResponse,
) -> anyhow::Result<rmcp::model::ServerJsonRpcMessage> {
    use futures::StreamExt as _;

    match resp {
        StreamableHttpPostResponse::Json(msg, ..) => Ok(msg),
        StreamableHttpPostResponse::Sse(mut stream, ..) => {
            while let Some(evt) = stream.next().await {
                let evt = evt.context("read SSE event")?;
                let payload = evt.data.unwrap_or_default();
                if payload.trim().is_empty() {
                    continue;
                }
                return serde_json::from_str(&payload).context("parse SSE data as JSON-RPC");
            }
            anyhow::bail!("unexpected end of SSE stream")
        }
        StreamableHttpPostResponse::Accepted => anyhow::bail!("unexpected 202 Accepted response"),
    }
}
