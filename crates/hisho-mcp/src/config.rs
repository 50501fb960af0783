//! Configuration for the tool server connection.

use serde::{Deserialize, Serialize};

pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 10_000;

fn default_handshake_timeout() -> u64 {
    DEFAULT_HANDSHAKE_TIMEOUT_MS
}

fn default_call_timeout() -> u64 {
    DEFAULT_CALL_TIMEOUT_MS
}

fn default_token_in_query() -> bool {
    true
}

/// Connection settings for one SSE tool server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpConfig {
    /// URL of the event stream that announces the submission endpoint.
    pub announce_url: String,
    /// Also pass the bearer token as a `token` query parameter on the stream
    /// request, for servers behind proxies that cannot see headers there.
    #[serde(default = "default_token_in_query")]
    pub token_in_query: bool,
    /// How long to wait for the `endpoint` event after opening the stream.
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_ms: u64,
    /// Upper bound on a single request, POST included.
    #[serde(default = "default_call_timeout")]
    pub call_timeout_ms: u64,
}

impl McpConfig {
    pub fn new(announce_url: impl Into<String>) -> Self {
        Self {
            announce_url: announce_url.into(),
            token_in_query: default_token_in_query(),
            handshake_timeout_ms: DEFAULT_HANDSHAKE_TIMEOUT_MS,
            call_timeout_ms: DEFAULT_CALL_TIMEOUT_MS,
        }
    }
}
