use crate::error::McpError;
use std::future::Future;
use std::pin::Pin;

pub type RpcFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, McpError>> + Send + 'a>>;

/// A JSON-RPC request/response transport.
///
/// Dyn-compatible so the MCP client can sit on top of the SSE channel in
/// production and on scripted transports in tests.
pub trait RpcTransport: Send + Sync {
    /// Send a request and wait for its correlated response.
    fn send<'a>(
        &'a self,
        method: &'a str,
        params: Option<serde_json::Value>,
    ) -> RpcFuture<'a, serde_json::Value>;

    /// Send a notification; no response is expected.
    fn notify<'a>(
        &'a self,
        method: &'a str,
        params: Option<serde_json::Value>,
    ) -> RpcFuture<'a, ()>;
}
