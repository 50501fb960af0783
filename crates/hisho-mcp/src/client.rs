//! MCP client: the initialize handshake plus tools/list and tools/call.

use crate::error::McpError;
use crate::transport::RpcTransport;
use serde::Deserialize;
use std::sync::Arc;

pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// What the server reported about itself during `initialize`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
    pub protocol_version: String,
}

/// A tool as advertised by `tools/list`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpToolInfo {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "empty_schema")]
    pub input_schema: serde_json::Value,
}

fn empty_schema() -> serde_json::Value {
    serde_json::json!({"type": "object"})
}

/// One content part of a `tools/call` result.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum McpToolContent {
    Text {
        text: String,
    },
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    Resource {
        resource: serde_json::Value,
    },
    #[serde(other)]
    Unknown,
}

/// The result of `tools/call`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpToolResult {
    #[serde(default)]
    pub content: Vec<McpToolContent>,
    #[serde(default)]
    pub is_error: bool,
}

impl McpToolResult {
    /// All text parts joined with newlines; other part kinds are skipped.
    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .filter_map(|c| match c {
                McpToolContent::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Deserialize)]
struct ToolsListResult {
    #[serde(default)]
    tools: Vec<McpToolInfo>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct InitializeResult {
    #[serde(default)]
    protocol_version: String,
    #[serde(default)]
    server_info: Option<ImplementationInfo>,
}

#[derive(Deserialize, Default)]
struct ImplementationInfo {
    #[serde(default)]
    name: String,
    #[serde(default)]
    version: String,
}

/// An MCP client over any [`RpcTransport`].
pub struct McpClient {
    transport: Arc<dyn RpcTransport>,
}

impl McpClient {
    pub fn new(transport: Arc<dyn RpcTransport>) -> Self {
        Self { transport }
    }

    /// Run the MCP handshake: `initialize`, then `notifications/initialized`.
    pub async fn initialize(&self) -> Result<ServerInfo, McpError> {
        let params = serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": "hisho",
                "version": env!("CARGO_PKG_VERSION"),
            }
        });
        let result = self.transport.send("initialize", Some(params)).await?;
        let init: InitializeResult = if result.is_null() {
            InitializeResult::default()
        } else {
            serde_json::from_value(result)?
        };
        let implementation = init.server_info.unwrap_or_default();

        self.transport
            .notify("notifications/initialized", None)
            .await?;

        let info = ServerInfo {
            name: implementation.name,
            version: implementation.version,
            protocol_version: init.protocol_version,
        };
        tracing::info!(
            "Tool server initialized: {} {} (protocol {})",
            info.name,
            info.version,
            info.protocol_version
        );
        Ok(info)
    }

    pub async fn list_tools(&self) -> Result<Vec<McpToolInfo>, McpError> {
        let result = self.transport.send("tools/list", None).await?;
        let list: ToolsListResult = serde_json::from_value(result)
            .map_err(|e| McpError::Protocol(format!("invalid tools/list result: {e}")))?;
        Ok(list.tools)
    }

    pub async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<McpToolResult, McpError> {
        let params = serde_json::json!({
            "name": name,
            "arguments": arguments,
        });
        let result = self.transport.send("tools/call", Some(params)).await?;
        serde_json::from_value(result)
            .map_err(|e| McpError::Protocol(format!("invalid tools/call result: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::RpcFuture;
    use std::sync::Mutex;

    /// Returns canned results per method and records every message.
    #[derive(Default)]
    struct ScriptedTransport {
        responses: Mutex<Vec<(String, serde_json::Value)>>,
        log: Mutex<Vec<(String, Option<serde_json::Value>)>>,
    }

    impl ScriptedTransport {
        fn respond(self, method: &str, value: serde_json::Value) -> Self {
            self.responses
                .lock()
                .unwrap()
                .push((method.to_string(), value));
            self
        }
    }

    impl RpcTransport for ScriptedTransport {
        fn send<'a>(
            &'a self,
            method: &'a str,
            params: Option<serde_json::Value>,
        ) -> RpcFuture<'a, serde_json::Value> {
            Box::pin(async move {
                self.log.lock().unwrap().push((method.to_string(), params));
                let responses = self.responses.lock().unwrap();
                responses
                    .iter()
                    .find(|(m, _)| m == method)
                    .map(|(_, v)| v.clone())
                    .ok_or(McpError::JsonRpc {
                        code: -32601,
                        message: format!("Method not found: {method}"),
                        data: None,
                    })
            })
        }

        fn notify<'a>(
            &'a self,
            method: &'a str,
            params: Option<serde_json::Value>,
        ) -> RpcFuture<'a, ()> {
            Box::pin(async move {
                self.log.lock().unwrap().push((method.to_string(), params));
                Ok(())
            })
        }
    }

    #[tokio::test]
    async fn initialize_sends_handshake_then_notification() {
        let transport = Arc::new(ScriptedTransport::default().respond(
            "initialize",
            serde_json::json!({
                "protocolVersion": "2024-11-05",
                "serverInfo": {"name": "workspace-tools", "version": "1.2.0"},
                "capabilities": {"tools": {}}
            }),
        ));
        let client = McpClient::new(transport.clone());

        let info = client.initialize().await.unwrap();
        assert_eq!(info.name, "workspace-tools");
        assert_eq!(info.version, "1.2.0");
        assert_eq!(info.protocol_version, "2024-11-05");

        let log = transport.log.lock().unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].0, "initialize");
        let params = log[0].1.as_ref().unwrap();
        assert_eq!(params["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(params["clientInfo"]["name"], "hisho");
        assert_eq!(log[1].0, "notifications/initialized");
    }

    #[tokio::test]
    async fn list_tools_parses_entries() {
        let transport = Arc::new(ScriptedTransport::default().respond(
            "tools/list",
            serde_json::json!({"tools": [
                {"name": "list_events", "description": "List calendar events",
                 "inputSchema": {"type": "object", "properties": {"date": {"type": "string"}}}},
                {"name": "get_user_profile"}
            ]}),
        ));
        let client = McpClient::new(transport);
        let tools = client.list_tools().await.unwrap();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].name, "list_events");
        assert_eq!(tools[0].input_schema["properties"]["date"]["type"], "string");
        assert!(tools[1].description.is_none());
        assert_eq!(tools[1].input_schema["type"], "object");
    }

    #[tokio::test]
    async fn call_tool_parses_mixed_content() {
        let transport = Arc::new(ScriptedTransport::default().respond(
            "tools/call",
            serde_json::json!({
                "content": [
                    {"type": "text", "text": "[{\"summary\":"},
                    {"type": "image", "data": "AAAA", "mimeType": "image/png"},
                    {"type": "audio", "data": "..."},
                    {"type": "text", "text": "\"Standup\"}]"}
                ],
                "isError": false
            }),
        ));
        let client = McpClient::new(transport.clone());
        let result = client
            .call_tool("list_events", serde_json::json!({"date": "2024-05-15"}))
            .await
            .unwrap();

        assert!(!result.is_error);
        assert_eq!(result.content[2], McpToolContent::Unknown);
        assert_eq!(result.joined_text(), "[{\"summary\":\n\"Standup\"}]");

        let log = transport.log.lock().unwrap();
        let params = log[0].1.as_ref().unwrap();
        assert_eq!(params["name"], "list_events");
        assert_eq!(params["arguments"]["date"], "2024-05-15");
    }

    #[tokio::test]
    async fn call_tool_error_flag() {
        let transport = Arc::new(ScriptedTransport::default().respond(
            "tools/call",
            serde_json::json!({
                "content": [{"type": "text", "text": "Invalid date"}],
                "isError": true
            }),
        ));
        let client = McpClient::new(transport);
        let result = client
            .call_tool("list_events", serde_json::json!({}))
            .await
            .unwrap();
        assert!(result.is_error);
        assert_eq!(result.joined_text(), "Invalid date");
    }

    #[tokio::test]
    async fn jsonrpc_errors_propagate() {
        let client = McpClient::new(Arc::new(ScriptedTransport::default()));
        let err = client.list_tools().await.unwrap_err();
        assert!(matches!(err, McpError::JsonRpc { code: -32601, .. }));
    }
}
