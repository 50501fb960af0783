//! MCP (Model Context Protocol) client for Hisho over the SSE transport.
//!
//! The tool server announces a submission URL on a long-lived event stream;
//! JSON-RPC requests are POSTed to that URL and their responses come back on
//! the stream, matched to the caller by correlation id.

pub mod channel;
pub mod client;
pub mod config;
pub mod error;
pub mod jsonrpc;
mod transport;

pub use channel::SseChannel;
pub use client::{McpClient, McpToolContent, McpToolInfo, McpToolResult, ServerInfo};
pub use config::McpConfig;
pub use error::{McpError, looks_like_auth_failure};
pub use transport::{RpcFuture, RpcTransport};
