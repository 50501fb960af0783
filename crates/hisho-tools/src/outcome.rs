//! Classified results of tool invocations.

use crate::normalize::normalize_content;
use hisho_auth::AuthFailure;
use hisho_mcp::{McpError, McpToolResult, looks_like_auth_failure};
use serde_json::json;

/// How a tool invocation ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The tool ran; its normalized result.
    Ok(serde_json::Value),
    /// The tool or the request was rejected on its merits.
    ToolError(String),
    /// The server rejected our credentials.
    AuthExpired(String),
    /// The channel could not carry the request.
    TransportFailed(String),
    /// No response within the call timeout. The operation may or may not
    /// have happened.
    Timeout { timeout_ms: u64 },
}

impl Outcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Ok(_))
    }

    /// Outcomes that end the turn instead of being shown to the model.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Outcome::AuthExpired(_) | Outcome::TransportFailed(_))
    }

    /// The payload handed back to the model and whether it is an error.
    pub fn to_tool_output(&self) -> (serde_json::Value, bool) {
        match self {
            Outcome::Ok(value) => (value.clone(), false),
            Outcome::ToolError(detail) => (json!({"error": detail}), true),
            Outcome::AuthExpired(detail) => (
                json!({"error": format!("Authorization expired: {detail}")}),
                true,
            ),
            Outcome::TransportFailed(detail) => (
                json!({"error": format!("Tool server unreachable: {detail}")}),
                true,
            ),
            Outcome::Timeout { timeout_ms } => (
                json!({"error": format!(
                    "No response within {timeout_ms}ms; the operation may or may not have completed"
                )}),
                true,
            ),
        }
    }

    /// Classify a `tools/call` response.
    pub fn from_result(result: &McpToolResult) -> Self {
        if result.is_error {
            let detail = result.joined_text();
            if looks_like_auth_failure(&detail) {
                return Outcome::AuthExpired(detail);
            }
            return Outcome::ToolError(detail);
        }
        let value = normalize_content(result);
        if reports_reconnect_required(&value) {
            return Outcome::AuthExpired("tool server requires reconnection".to_string());
        }
        Outcome::Ok(value)
    }
}

/// Some servers report a revoked upstream grant as a normal result.
fn reports_reconnect_required(value: &serde_json::Value) -> bool {
    value.get("status").and_then(|s| s.as_str()) == Some("reconnect_required")
}

/// Classify a failed call.
pub fn classify_error(error: &McpError) -> Outcome {
    if error.is_auth_failure() {
        return Outcome::AuthExpired(error.to_string());
    }
    match error {
        McpError::Timeout { timeout_ms, .. } => Outcome::Timeout {
            timeout_ms: *timeout_ms,
        },
        McpError::JsonRpc { message, .. } => Outcome::ToolError(message.clone()),
        McpError::Protocol(detail) => Outcome::ToolError(detail.clone()),
        McpError::Json(e) => Outcome::ToolError(e.to_string()),
        McpError::NotReady
        | McpError::HandshakeTimeout { .. }
        | McpError::Stream(_)
        | McpError::Closed
        | McpError::Http { .. }
        | McpError::Network(_)
        | McpError::Auth(_) => Outcome::TransportFailed(error.to_string()),
    }
}

/// One routed call: what the model asked for, what was sent, how it ended.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub abstract_name: String,
    /// `None` when the request never reached the server.
    pub concrete_name: Option<String>,
    pub arguments: serde_json::Value,
    pub outcome: Outcome,
}
