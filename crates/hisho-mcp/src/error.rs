//! Error types for the tool channel.

use hisho_auth::{AuthError, AuthFailure};
use thiserror::Error;

/// Lower-cased fragments that identify an auth-class rejection in free text.
const AUTH_SIGNATURES: &[&str] = &[
    "unauthorized",
    "unauthenticated",
    "forbidden",
    "invalid_token",
    "invalid_grant",
    "invalid credentials",
    "token expired",
    "expired token",
    "token has expired",
    "reconnect_required",
];

/// Errors from tool channel communication.
#[derive(Debug, Error)]
pub enum McpError {
    #[error("Tool channel is not connected")]
    NotReady,

    #[error("No endpoint announcement within {timeout_ms}ms")]
    HandshakeTimeout { timeout_ms: u64 },

    #[error("Tool event stream failed: {0}")]
    Stream(String),

    #[error("Tool channel closed")]
    Closed,

    #[error("Tool server returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("JSON-RPC error (code {code}): {message}")]
    JsonRpc {
        code: i64,
        message: String,
        data: Option<serde_json::Value>,
    },

    #[error("MCP protocol error: {0}")]
    Protocol(String),

    #[error("'{method}' timed out after {timeout_ms}ms")]
    Timeout { method: String, timeout_ms: u64 },

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AuthFailure for McpError {
    fn is_auth_failure(&self) -> bool {
        match self {
            McpError::Http { status, .. } => matches!(status, 401 | 403),
            McpError::Auth(e) => e.is_auth_failure(),
            McpError::JsonRpc { message, data, .. } => {
                looks_like_auth_failure(message)
                    || data
                        .as_ref()
                        .and_then(|d| d.get("status"))
                        .and_then(|s| s.as_u64())
                        .is_some_and(|s| s == 401 || s == 403)
            }
            _ => false,
        }
    }
}

/// True if `text` carries the signature of an authentication/authorization
/// failure (as opposed to a request rejected on its merits).
pub fn looks_like_auth_failure(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    AUTH_SIGNATURES.iter().any(|sig| lower.contains(sig))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_401_and_403_are_auth_failures() {
        for status in [401, 403] {
            let err = McpError::Http {
                status,
                message: String::new(),
            };
            assert!(err.is_auth_failure());
        }
        let err = McpError::Http {
            status: 500,
            message: "boom".into(),
        };
        assert!(!err.is_auth_failure());
    }

    #[test]
    fn jsonrpc_auth_signature_detected() {
        let err = McpError::JsonRpc {
            code: -32000,
            message: "Request had invalid authentication credentials: UNAUTHENTICATED".into(),
            data: None,
        };
        assert!(err.is_auth_failure());

        let err = McpError::JsonRpc {
            code: -32602,
            message: "Invalid params: date must be YYYY-MM-DD".into(),
            data: None,
        };
        assert!(!err.is_auth_failure());
    }

    #[test]
    fn jsonrpc_status_in_data_detected() {
        let err = McpError::JsonRpc {
            code: -32000,
            message: "upstream error".into(),
            data: Some(serde_json::json!({"status": 403})),
        };
        assert!(err.is_auth_failure());
    }

    #[test]
    fn transport_errors_are_not_auth_failures() {
        assert!(!McpError::Closed.is_auth_failure());
        assert!(!McpError::NotReady.is_auth_failure());
        assert!(
            !McpError::Timeout {
                method: "tools/call".into(),
                timeout_ms: 10
            }
            .is_auth_failure()
        );
    }
}
