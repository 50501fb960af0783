//! Routes abstract tool requests to remote procedures.

use crate::abstract_tool::AbstractTool;
use crate::error::ToolError;
use crate::mapping::{ProcedureNames, Resolver};
use crate::operation::{Operation, OperationKind};
use crate::outcome::{Outcome, ToolInvocation, classify_error};
use hisho_mcp::{McpClient, McpToolInfo};
use hisho_types::ToolDefinition;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Dispatches model tool calls to the tool server.
pub struct ToolRouter {
    client: Arc<McpClient>,
    mappings: BTreeMap<AbstractTool, Arc<dyn Resolver>>,
    default_arguments: serde_json::Map<String, serde_json::Value>,
}

impl ToolRouter {
    /// A router with no abstract tools registered.
    pub fn new(client: Arc<McpClient>) -> Self {
        Self {
            client,
            mappings: BTreeMap::new(),
            default_arguments: serde_json::Map::new(),
        }
    }

    /// A router offering every abstract tool, resolved through `names`.
    pub fn with_procedure_names(client: Arc<McpClient>, names: ProcedureNames) -> Self {
        let mut router = Self::new(client);
        let resolver: Arc<dyn Resolver> = Arc::new(names);
        for tool in AbstractTool::ALL {
            router.register_mapping(tool, Arc::clone(&resolver));
        }
        router
    }

    /// Offer `tool` to the model, resolving its operations with `resolver`.
    pub fn register_mapping(&mut self, tool: AbstractTool, resolver: Arc<dyn Resolver>) {
        self.mappings.insert(tool, resolver);
    }

    /// Arguments added to every call unless the call already sets them
    /// (e.g. `tenant_id`).
    pub fn set_default_arguments(&mut self, arguments: serde_json::Map<String, serde_json::Value>) {
        self.default_arguments = arguments;
    }

    /// Function declarations for the registered abstract tools.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.mappings.keys().map(|t| t.definition()).collect()
    }

    /// The concrete procedure name for `operation`, if one is mapped.
    pub fn resolve(&self, operation: &Operation) -> Option<String> {
        let kind = operation.kind();
        self.mappings.get(&kind.abstract_tool())?.resolve(kind)
    }

    /// Handle a model tool call by abstract name.
    ///
    /// Never fails: unknown tools and bad arguments come back as
    /// [`Outcome::ToolError`] so the model can correct itself.
    pub async fn invoke(&self, abstract_name: &str, args: serde_json::Value) -> ToolInvocation {
        let parsed = AbstractTool::from_name(abstract_name)
            .filter(|t| self.mappings.contains_key(t))
            .ok_or_else(|| ToolError::UnknownTool {
                name: abstract_name.to_string(),
            })
            .and_then(|tool| tool.parse(args.clone()));

        match parsed {
            Ok(operation) => self.dispatch(abstract_name, &operation).await,
            Err(e) => {
                tracing::warn!("Rejected tool call {abstract_name}: {e}");
                ToolInvocation {
                    abstract_name: abstract_name.to_string(),
                    concrete_name: None,
                    arguments: args,
                    outcome: Outcome::ToolError(e.to_string()),
                }
            }
        }
    }

    /// Run a typed operation directly.
    pub async fn invoke_operation(&self, operation: &Operation) -> ToolInvocation {
        let abstract_name = operation.kind().abstract_tool().name();
        self.dispatch(abstract_name, operation).await
    }

    /// Concrete names the server does not advertise, sorted.
    pub fn verify_against(&self, advertised: &[McpToolInfo]) -> Vec<String> {
        let available: HashSet<&str> = advertised.iter().map(|t| t.name.as_str()).collect();
        let mut missing: Vec<String> = self
            .mappings
            .iter()
            .flat_map(|(tool, resolver)| {
                OperationKind::ALL
                    .into_iter()
                    .filter(move |k| k.abstract_tool() == *tool)
                    .filter_map(move |k| resolver.resolve(k))
            })
            .filter(|name| !available.contains(name.as_str()))
            .collect();
        missing.sort();
        missing.dedup();
        for name in &missing {
            tracing::warn!("Tool server does not advertise mapped procedure '{name}'");
        }
        missing
    }

    async fn dispatch(&self, abstract_name: &str, operation: &Operation) -> ToolInvocation {
        let mut arguments = operation.arguments();
        for (key, value) in &self.default_arguments {
            arguments
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        let arguments = serde_json::Value::Object(arguments);

        let Some(concrete) = self.resolve(operation) else {
            let e = ToolError::Unmapped {
                operation: operation.kind().to_string(),
            };
            tracing::warn!("{e}");
            return ToolInvocation {
                abstract_name: abstract_name.to_string(),
                concrete_name: None,
                arguments,
                outcome: Outcome::ToolError(e.to_string()),
            };
        };

        tracing::debug!("{abstract_name} ({}) -> {concrete}", operation.kind());
        let outcome = match self.client.call_tool(&concrete, arguments.clone()).await {
            Ok(result) => Outcome::from_result(&result),
            Err(e) => {
                tracing::warn!("{concrete} failed: {e}");
                classify_error(&e)
            }
        };

        ToolInvocation {
            abstract_name: abstract_name.to_string(),
            concrete_name: Some(concrete),
            arguments,
            outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::ListEventsArgs;
    use hisho_mcp::{McpError, RpcFuture, RpcTransport};
    use serde_json::{Value, json};
    use std::sync::Mutex;

    /// Answers `tools/call` by procedure name and records the arguments.
    struct FakeToolServer {
        calls: Mutex<Vec<(String, Value)>>,
        answer: Box<dyn Fn(&str) -> Result<Value, McpError> + Send + Sync>,
    }

    impl FakeToolServer {
        fn new(answer: impl Fn(&str) -> Result<Value, McpError> + Send + Sync + 'static) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                answer: Box::new(answer),
            })
        }
    }

    impl RpcTransport for FakeToolServer {
        fn send<'a>(&'a self, method: &'a str, params: Option<Value>) -> RpcFuture<'a, Value> {
            Box::pin(async move {
                assert_eq!(method, "tools/call");
                let params = params.unwrap_or_default();
                let name = params["name"].as_str().unwrap_or_default().to_string();
                self.calls
                    .lock()
                    .unwrap()
                    .push((name.clone(), params["arguments"].clone()));
                (self.answer)(&name)
            })
        }

        fn notify<'a>(&'a self, _method: &'a str, _params: Option<Value>) -> RpcFuture<'a, ()> {
            Box::pin(async { Ok(()) })
        }
    }

    fn text(value: &str) -> Result<Value, McpError> {
        Ok(json!({"content": [{"type": "text", "text": value}], "isError": false}))
    }

    fn router(server: &Arc<FakeToolServer>) -> ToolRouter {
        let client = Arc::new(McpClient::new(server.clone()));
        ToolRouter::with_procedure_names(client, ProcedureNames::default())
    }

    #[tokio::test]
    async fn calendar_list_routes_to_list_events() {
        let server = FakeToolServer::new(|_| text(r#"{"events":[{"title":"Standup"}]}"#));
        let router = router(&server);

        let invocation = router
            .invoke("manage_calendar", json!({"action": "list", "date": "2024-05-15"}))
            .await;

        assert_eq!(invocation.concrete_name.as_deref(), Some("list_events"));
        match &invocation.outcome {
            Outcome::Ok(value) => assert_eq!(value["events"][0]["title"], "Standup"),
            other => panic!("expected Ok, got {other:?}"),
        }
        let calls = server.calls.lock().unwrap();
        assert_eq!(calls[0].0, "list_events");
        assert_eq!(calls[0].1["date"], "2024-05-15");
        assert!(calls[0].1.get("action").is_none());
    }

    #[tokio::test]
    async fn default_arguments_are_merged_without_overriding() {
        let server = FakeToolServer::new(|_| text("ok"));
        let mut router = router(&server);
        let mut defaults = serde_json::Map::new();
        defaults.insert("tenant_id".into(), json!("tenant-7"));
        defaults.insert("maxResults".into(), json!(5));
        router.set_default_arguments(defaults);

        router
            .invoke("manage_gmail", json!({"action": "search", "query": "is:unread", "maxResults": 20}))
            .await;

        let calls = server.calls.lock().unwrap();
        assert_eq!(calls[0].0, "search_threads");
        assert_eq!(calls[0].1["tenant_id"], "tenant-7");
        assert_eq!(calls[0].1["maxResults"], 20);
        assert_eq!(calls[0].1["query"], "is:unread");
    }

    #[tokio::test]
    async fn unknown_tool_is_a_tool_error_and_sends_nothing() {
        let server = FakeToolServer::new(|_| text("ok"));
        let router = router(&server);

        let invocation = router.invoke("delete_account", json!({})).await;
        assert!(matches!(invocation.outcome, Outcome::ToolError(ref m) if m.contains("delete_account")));
        assert!(invocation.concrete_name.is_none());
        assert!(server.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn bad_arguments_are_a_tool_error() {
        let server = FakeToolServer::new(|_| text("ok"));
        let router = router(&server);
        let invocation = router
            .invoke("manage_gmail", json!({"action": "get_detail"}))
            .await;
        assert!(matches!(invocation.outcome, Outcome::ToolError(_)));
        assert!(server.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unmapped_operation_is_a_tool_error() {
        let server = FakeToolServer::new(|_| text("ok"));
        let client = Arc::new(McpClient::new(server.clone()));
        let names = ProcedureNames::default().without(OperationKind::SendMail);
        let router = ToolRouter::with_procedure_names(client, names);

        let invocation = router
            .invoke(
                "manage_gmail",
                json!({"action": "send", "to": "a@example.com", "subject": "Hi", "body": "..."}),
            )
            .await;
        assert!(matches!(invocation.outcome, Outcome::ToolError(ref m) if m.contains("send_mail")));
        assert!(server.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn custom_resolver_for_one_tool() {
        let server = FakeToolServer::new(|_| text(r#"{"name":"Sato"}"#));
        let client = Arc::new(McpClient::new(server.clone()));
        let mut router = ToolRouter::new(client);
        router.register_mapping(
            AbstractTool::GetProfile,
            Arc::new(|_: OperationKind| Some("people.me".to_string())),
        );

        assert_eq!(router.definitions().len(), 1);
        let invocation = router.invoke_operation(&Operation::GetProfile).await;
        assert_eq!(invocation.abstract_name, "get_profile");
        assert_eq!(invocation.concrete_name.as_deref(), Some("people.me"));

        // Calendar was never registered.
        let invocation = router.invoke("manage_calendar", json!({"action": "list"})).await;
        assert!(matches!(invocation.outcome, Outcome::ToolError(_)));
    }

    #[tokio::test]
    async fn auth_rejection_is_classified() {
        let server = FakeToolServer::new(|_| {
            Err(McpError::Http {
                status: 401,
                message: "Unauthorized".into(),
            })
        });
        let router = router(&server);
        let invocation = router
            .invoke_operation(&Operation::ListEvents(ListEventsArgs::default()))
            .await;
        assert!(matches!(invocation.outcome, Outcome::AuthExpired(_)));
        assert!(invocation.outcome.is_fatal());
    }

    #[tokio::test]
    async fn timeout_is_reported_as_timeout() {
        let server = FakeToolServer::new(|_| {
            Err(McpError::Timeout {
                method: "tools/call".into(),
                timeout_ms: 10_000,
            })
        });
        let router = router(&server);
        let invocation = router.invoke("get_profile", json!({})).await;
        assert_eq!(invocation.outcome, Outcome::Timeout { timeout_ms: 10_000 });
    }

    #[test]
    fn verify_reports_unadvertised_procedures() {
        let server = FakeToolServer::new(|_| text("ok"));
        let router = router(&server);
        let advertised: Vec<McpToolInfo> = [
            "get_user_profile",
            "list_events",
            "search_threads",
            "gmail.createDraft",
            "gmail.sendDraft",
        ]
        .into_iter()
        .map(|name| McpToolInfo {
            name: name.to_string(),
            description: None,
            input_schema: json!({"type": "object"}),
        })
        .collect();

        let missing = router.verify_against(&advertised);
        assert_eq!(missing, vec!["create_event", "get_message", "send_message"]);
    }

    #[test]
    fn definitions_are_ordered() {
        let server = FakeToolServer::new(|_| text("ok"));
        let names: Vec<String> = router(&server)
            .definitions()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["manage_calendar", "manage_gmail", "get_profile"]);
    }
}
