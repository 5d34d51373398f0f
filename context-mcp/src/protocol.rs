//! Core MCP protocol handlers: `initialize`, `tools/list`, `shutdown`.

use crate::jsonrpc::{JsonRpcRequest, JsonRpcResponse};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;

pub const SUPPORTED_VERSIONS: &[&str] = &["2025-06-18", "2024-11-05"];

#[derive(Debug, Clone, Serialize)]
pub struct McpTool {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

impl McpTool {
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self { name: name.into(), description: description.into(), input_schema }
    }
}

#[derive(Debug, Serialize)]
pub struct ListToolsResult {
    pub tools: Vec<McpTool>,
}

#[derive(Debug, Serialize)]
struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    protocol_version: String,
    capabilities: Value,
    #[serde(rename = "serverInfo")]
    server_info: Value,
}

/// Negotiate a protocol version against [`SUPPORTED_VERSIONS`] and respond
/// with server capabilities/info. Returns `None` for notifications (no id).
pub async fn handle_initialize(request: JsonRpcRequest) -> Option<JsonRpcResponse> {
    request.id.as_ref()?;

    let requested = request
        .params
        .as_ref()
        .and_then(|p| p.get("protocolVersion"))
        .and_then(Value::as_str);
    let protocol_version = match requested {
        Some(v) if SUPPORTED_VERSIONS.contains(&v) => v.to_string(),
        Some(other) => {
            info!(requested = other, using = SUPPORTED_VERSIONS[0], "unsupported protocol version requested");
            SUPPORTED_VERSIONS[0].to_string()
        }
        None => SUPPORTED_VERSIONS[0].to_string(),
    };

    let result = InitializeResult {
        protocol_version,
        capabilities: json!({ "tools": { "listChanged": false } }),
        server_info: json!({
            "name": "context-retrieval-engine",
            "version": env!("CARGO_PKG_VERSION"),
        }),
    };

    Some(JsonRpcResponse::ok(request.id, serde_json::to_value(result).unwrap_or(Value::Null)))
}

pub async fn handle_list_tools(request: JsonRpcRequest, tools: Vec<McpTool>) -> Option<JsonRpcResponse> {
    request.id.as_ref()?;
    let result = ListToolsResult { tools };
    Some(JsonRpcResponse::ok(request.id, serde_json::to_value(result).unwrap_or(Value::Null)))
}

pub async fn handle_shutdown(request: JsonRpcRequest) -> Option<JsonRpcResponse> {
    request.id.as_ref()?;
    Some(JsonRpcResponse::ok(request.id, Value::Null))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(method: &str, params: Option<Value>) -> JsonRpcRequest {
        JsonRpcRequest {
            jsonrpc: Some("2.0".to_string()),
            id: Some(json!(1)),
            method: method.to_string(),
            params,
        }
    }

    #[tokio::test]
    async fn initialize_negotiates_latest_when_no_version_requested() {
        let resp = handle_initialize(request("initialize", None)).await.unwrap();
        let version = resp.result.unwrap()["protocolVersion"].as_str().unwrap().to_string();
        assert_eq!(version, SUPPORTED_VERSIONS[0]);
    }

    #[tokio::test]
    async fn initialize_falls_back_on_unsupported_version() {
        let params = json!({ "protocolVersion": "1999-01-01" });
        let resp = handle_initialize(request("initialize", Some(params))).await.unwrap();
        let version = resp.result.unwrap()["protocolVersion"].as_str().unwrap().to_string();
        assert_eq!(version, SUPPORTED_VERSIONS[0]);
    }

    #[tokio::test]
    async fn notifications_produce_no_response() {
        let mut req = request("initialize", None);
        req.id = None;
        assert!(handle_initialize(req).await.is_none());
    }
}
