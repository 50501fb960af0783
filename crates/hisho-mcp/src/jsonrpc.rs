//! JSON-RPC 2.0 types for MCP communication.

use crate::error::McpError;
use serde::{Deserialize, Serialize};

/// A JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC 2.0 notification (no id, no response expected).
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: &'static str,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            method: method.into(),
            params,
        }
    }
}

/// Any inbound JSON-RPC message: a response to one of our requests, or a
/// server-initiated request/notification.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcMessage {
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl JsonRpcMessage {
    /// The correlation id if this is a response to one of our requests.
    ///
    /// Our ids are integers; some servers echo them back as strings.
    pub fn response_id(&self) -> Option<u64> {
        if self.method.is_some() {
            return None;
        }
        correlation_id(self.id.as_ref()?)
    }

    /// Turn a response into the value or error it carries.
    pub fn into_result(self) -> Result<serde_json::Value, McpError> {
        match self.error {
            Some(err) => Err(McpError::JsonRpc {
                code: err.code,
                message: err.message,
                data: err.data,
            }),
            None => Ok(self.result.unwrap_or(serde_json::Value::Null)),
        }
    }
}

/// The response id of a raw message that did not fit [`JsonRpcMessage`].
pub fn raw_response_id(value: &serde_json::Value) -> Option<u64> {
    if value.get("method").is_some() {
        return None;
    }
    correlation_id(value.get("id")?)
}

fn correlation_id(id: &serde_json::Value) -> Option<u64> {
    match id {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
