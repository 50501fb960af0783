//! A secretary session: the tool channel, router and conversation for one
//! user, wired together.

use crate::conversation::{Conversation, ReplyStream};
use crate::error::{channel_error, outcome_error};
use crate::event::ToolActivity;
use crate::prompt::build_system_prompt;
use crate::turn::{DEFAULT_MAX_TOOL_ROUNDS, TurnLoop};
use chrono::NaiveDate;
use hisho_auth::CredentialManager;
use hisho_mcp::{McpClient, McpConfig, McpToolInfo, RpcTransport, ServerInfo, SseChannel};
use hisho_tools::{ListEventsArgs, Operation, Outcome, ProcedureNames, SearchMailArgs, ToolRouter};
use hisho_types::HishoError;
use hisho_types::provider::Provider;
use std::sync::Arc;

/// Unread mail listed on the dashboard.
const DASHBOARD_MAIL_QUERY: &str = "is:unread";
const DASHBOARD_MAIL_LIMIT: u32 = 10;

/// Everything a [`Secretary`] needs besides its provider and credentials.
#[derive(Debug, Clone)]
pub struct SecretaryConfig {
    pub model: String,
    pub mcp: McpConfig,
    /// Replaces the built-in system prompt.
    pub system_prompt: Option<String>,
    pub user_name: Option<String>,
    pub temperature: Option<f32>,
    pub max_tool_rounds: usize,
    pub procedure_names: ProcedureNames,
    /// Added to every tool call that does not set them itself.
    pub default_arguments: serde_json::Map<String, serde_json::Value>,
}

impl SecretaryConfig {
    pub fn new(model: impl Into<String>, mcp: McpConfig) -> Self {
        Self {
            model: model.into(),
            mcp,
            system_prompt: None,
            user_name: None,
            temperature: None,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            procedure_names: ProcedureNames::default(),
            default_arguments: serde_json::Map::new(),
        }
    }
}

/// What the tool server looked like after the handshake.
#[derive(Debug, Clone)]
pub struct StartReport {
    pub server: ServerInfo,
    pub tools: Vec<McpToolInfo>,
    /// Mapped procedures the server does not advertise.
    pub missing_procedures: Vec<String>,
}

/// The day's events and unread mail, fetched together.
#[derive(Debug, Clone)]
pub struct Dashboard {
    pub date: NaiveDate,
    pub events: Outcome,
    pub unread_mail: Outcome,
}

/// One user's session with the secretary.
pub struct Secretary {
    credentials: CredentialManager,
    channel: Arc<SseChannel>,
    client: Arc<McpClient>,
    router: Arc<ToolRouter>,
    conversation: Conversation,
}

impl Secretary {
    pub fn new(
        config: SecretaryConfig,
        provider: Arc<dyn Provider>,
        credentials: CredentialManager,
    ) -> Self {
        let channel = Arc::new(SseChannel::new(config.mcp, credentials.clone()));
        let transport: Arc<dyn RpcTransport> = channel.clone();
        let client = Arc::new(McpClient::new(transport));

        let mut router =
            ToolRouter::with_procedure_names(Arc::clone(&client), config.procedure_names);
        router.set_default_arguments(config.default_arguments);
        let router = Arc::new(router);

        let mut turn_loop = TurnLoop::new(provider, Arc::clone(&router), config.model);
        turn_loop.set_system_prompt(build_system_prompt(
            config.system_prompt.as_deref(),
            config.user_name.as_deref(),
            chrono::Local::now().date_naive(),
        ));
        turn_loop.set_max_tool_rounds(config.max_tool_rounds);
        if let Some(temperature) = config.temperature {
            turn_loop.set_temperature(temperature);
        }

        Self {
            credentials,
            channel,
            client,
            router,
            conversation: Conversation::new(turn_loop),
        }
    }

    /// Connect to the tool server, run the MCP handshake and check that
    /// every mapped procedure is advertised.
    pub async fn start(&self) -> Result<StartReport, HishoError> {
        self.channel.connect().await.map_err(channel_error)?;
        self.handshake().await
    }

    /// Drop the current session and start a fresh one.
    pub async fn reconnect(&self) -> Result<StartReport, HishoError> {
        self.channel.reconnect().await.map_err(channel_error)?;
        self.handshake().await
    }

    pub fn disconnect(&self) {
        self.channel.disconnect();
    }

    /// Disconnect and forget the cached credential.
    pub async fn sign_out(&self) {
        self.disconnect();
        self.credentials.clear().await;
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_ready()
    }

    pub fn submit(&self, text: impl Into<String>) -> ReplyStream {
        self.conversation.submit(text)
    }

    pub fn on_tool_activity(&mut self, hook: impl Fn(ToolActivity) + Send + Sync + 'static) {
        self.conversation.on_tool_activity(hook);
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Tools currently advertised by the server.
    pub async fn tools(&self) -> Result<Vec<McpToolInfo>, HishoError> {
        self.client.list_tools().await.map_err(channel_error)
    }

    /// Fetch the day's events and unread mail concurrently.
    pub async fn dashboard(&self, date: NaiveDate) -> Result<Dashboard, HishoError> {
        prefetch_dashboard(&self.router, date).await
    }

    async fn handshake(&self) -> Result<StartReport, HishoError> {
        let server = self.client.initialize().await.map_err(channel_error)?;
        let tools = self.client.list_tools().await.map_err(channel_error)?;
        let missing_procedures = self.router.verify_against(&tools);
        Ok(StartReport {
            server,
            tools,
            missing_procedures,
        })
    }
}

/// Both requests are in flight at once. Tool errors are kept in the
/// dashboard; auth and transport failures fail the whole prefetch.
pub(crate) async fn prefetch_dashboard(
    router: &ToolRouter,
    date: NaiveDate,
) -> Result<Dashboard, HishoError> {
    let events = Operation::ListEvents(ListEventsArgs {
        date: Some(date.format("%Y-%m-%d").to_string()),
        max_results: None,
    });
    let unread = Operation::SearchMail(SearchMailArgs {
        query: Some(DASHBOARD_MAIL_QUERY.to_string()),
        max_results: Some(DASHBOARD_MAIL_LIMIT),
    });

    let (events, unread) = tokio::join!(
        router.invoke_operation(&events),
        router.invoke_operation(&unread)
    );

    for invocation in [&events, &unread] {
        if let Some(error) = outcome_error(&invocation.outcome) {
            return Err(error);
        }
    }

    Ok(Dashboard {
        date,
        events: events.outcome,
        unread_mail: unread.outcome,
    })
}
