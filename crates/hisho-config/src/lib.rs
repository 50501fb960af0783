//! Layered TOML configuration for Hisho.
//!
//! Reads configuration from multiple sources with precedence:
//! CLI flags > env vars > `~/.hisho/config.toml` > defaults

use chrono::{DateTime, Utc};
use hisho_auth::{
    Credential, CredentialStore, DEFAULT_SAFETY_MARGIN_SECS, OAuthClientConfig, OAuthRefreshStore,
    StaticCredentialStore,
};
use hisho_core::{DEFAULT_MAX_TOOL_ROUNDS, SecretaryConfig};
use hisho_mcp::McpConfig;
use hisho_tools::{OperationKind, ProcedureNames};
use hisho_types::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The default generation model.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Resolved configuration for a Hisho session.
#[derive(Debug, Clone)]
pub struct HishoConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub temperature: Option<f32>,
    pub mcp: McpConfig,
    pub auth: AuthSettings,
    pub max_tool_rounds: usize,
    pub user_name: Option<String>,
    pub system_prompt: Option<String>,
    pub procedure_names: ProcedureNames,
    pub default_arguments: serde_json::Map<String, serde_json::Value>,
    pub config_dir: PathBuf,
}

/// Settings that can be read from a TOML config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsFile {
    #[serde(default)]
    pub generation: GenerationSettings,
    #[serde(default)]
    pub mcp: McpSettings,
    #[serde(default)]
    pub auth: AuthSettings,
    #[serde(default)]
    pub agent: AgentSettings,
    #[serde(default)]
    pub tools: ToolsSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationSettings {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpSettings {
    pub announce_url: Option<String>,
    pub token_in_query: Option<bool>,
    pub handshake_timeout_ms: Option<u64>,
    pub call_timeout_ms: Option<u64>,
}

/// Credentials for the tool server.
///
/// With a refresh token, token endpoint and client id the grant is refreshed
/// through OAuth; otherwise the access token is used as-is.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AuthSettings {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_endpoint: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub safety_margin_secs: Option<i64>,
}

impl std::fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSettings")
            .field("has_access_token", &self.access_token.is_some())
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("token_endpoint", &self.token_endpoint)
            .field("client_id", &self.client_id)
            .field("safety_margin_secs", &self.safety_margin_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentSettings {
    pub max_tool_rounds: Option<usize>,
    pub user_name: Option<String>,
    pub system_prompt: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsSettings {
    /// Procedure name overrides keyed by operation (`list_events = "calendar.list"`).
    /// An empty name unmaps the operation.
    #[serde(default)]
    pub names: BTreeMap<String, String>,
    /// Arguments added to every tool call, e.g. `tenant_id`.
    #[serde(default)]
    pub default_arguments: serde_json::Map<String, serde_json::Value>,
}

/// CLI overrides that take highest precedence.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub mcp_url: Option<String>,
    pub max_tool_rounds: Option<usize>,
}

impl HishoConfig {
    /// Load configuration from all sources, applying precedence rules.
    ///
    /// Precedence (highest to lowest):
    /// 1. CLI flags
    /// 2. Environment variables
    /// 3. Config file (~/.hisho/config.toml)
    /// 4. Defaults
    pub fn load(overrides: CliOverrides) -> Result<Self, ConfigError> {
        let config_dir = config_dir();
        let settings = load_settings_file(&config_dir.join("config.toml"))?;
        Self::resolve(settings, |key| std::env::var(key).ok(), overrides, config_dir)
    }

    /// Merge already-read settings with the environment (as `env`) and CLI
    /// overrides.
    pub fn resolve(
        settings: SettingsFile,
        env: impl Fn(&str) -> Option<String>,
        overrides: CliOverrides,
        config_dir: PathBuf,
    ) -> Result<Self, ConfigError> {
        let SettingsFile {
            generation,
            mcp,
            mut auth,
            agent,
            tools,
        } = settings;

        // Resolve API key: CLI > env > config file
        let api_key = overrides
            .api_key
            .or_else(|| env("HISHO_API_KEY"))
            .or_else(|| env("GEMINI_API_KEY"))
            .or(generation.api_key)
            .ok_or_else(|| ConfigError::MissingKey {
                key: "generation.api_key (set HISHO_API_KEY or add to ~/.hisho/config.toml)"
                    .into(),
            })?;

        let model = overrides
            .model
            .or_else(|| env("HISHO_MODEL"))
            .or(generation.model)
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let base_url = generation
            .base_url
            .unwrap_or_else(|| hisho_api::DEFAULT_BASE_URL.to_string());

        if let Some(t) = generation.temperature.filter(|t| !(0.0..=2.0).contains(t)) {
            return Err(ConfigError::InvalidValue {
                key: "generation.temperature".into(),
                message: format!("{t} is outside 0.0..=2.0"),
            });
        }

        let announce_url = overrides
            .mcp_url
            .or_else(|| env("HISHO_MCP_URL"))
            .or(mcp.announce_url)
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingKey {
                key: "mcp.announce_url (set HISHO_MCP_URL or add to ~/.hisho/config.toml)".into(),
            })?;
        let mut mcp_config = McpConfig::new(announce_url);
        if let Some(v) = mcp.token_in_query {
            mcp_config.token_in_query = v;
        }
        if let Some(v) = mcp.handshake_timeout_ms {
            mcp_config.handshake_timeout_ms = v;
        }
        if let Some(v) = mcp.call_timeout_ms {
            mcp_config.call_timeout_ms = v;
        }

        if let Some(token) = env("HISHO_ACCESS_TOKEN") {
            auth.access_token = Some(token);
        }
        if let Some(token) = env("HISHO_REFRESH_TOKEN") {
            auth.refresh_token = Some(token);
        }

        let max_tool_rounds = overrides
            .max_tool_rounds
            .or(agent.max_tool_rounds)
            .unwrap_or(DEFAULT_MAX_TOOL_ROUNDS);

        let procedure_names = procedure_names(&tools.names)?;

        Ok(HishoConfig {
            api_key,
            model,
            base_url,
            temperature: generation.temperature,
            mcp: mcp_config,
            auth,
            max_tool_rounds,
            user_name: agent.user_name,
            system_prompt: agent.system_prompt,
            procedure_names,
            default_arguments: tools.default_arguments,
            config_dir,
        })
    }
}

impl HishoConfig {
    /// Session settings for a [`Secretary`](hisho_core::Secretary).
    pub fn secretary_config(&self) -> SecretaryConfig {
        let mut config = SecretaryConfig::new(self.model.clone(), self.mcp.clone());
        config.system_prompt = self.system_prompt.clone();
        config.user_name = self.user_name.clone();
        config.temperature = self.temperature;
        config.max_tool_rounds = self.max_tool_rounds;
        config.procedure_names = self.procedure_names.clone();
        config.default_arguments = self.default_arguments.clone();
        config
    }
}

impl AuthSettings {
    /// Build the credential store these settings describe.
    pub fn credential_store(&self) -> Result<Arc<dyn CredentialStore>, ConfigError> {
        if let (Some(refresh_token), Some(token_endpoint), Some(client_id)) = (
            &self.refresh_token,
            &self.token_endpoint,
            &self.client_id,
        ) {
            // Without a known expiry the first use refreshes.
            let initial = Credential::new(
                self.access_token.clone().unwrap_or_default(),
                Some(refresh_token.clone()),
                DateTime::<Utc>::MIN_UTC,
            );
            let store = OAuthRefreshStore::new(
                OAuthClientConfig {
                    token_endpoint: token_endpoint.clone(),
                    client_id: client_id.clone(),
                    client_secret: self.client_secret.clone(),
                },
                Some(initial),
            );
            return Ok(Arc::new(store));
        }

        if self.refresh_token.is_some() {
            tracing::warn!(
                "auth.refresh_token is set without token_endpoint and client_id; it will not be used"
            );
        }

        match &self.access_token {
            Some(token) => Ok(Arc::new(StaticCredentialStore::token(token.clone()))),
            None => Err(ConfigError::MissingKey {
                key: "auth.access_token (set HISHO_ACCESS_TOKEN or add to ~/.hisho/config.toml)"
                    .into(),
            }),
        }
    }

    pub fn safety_margin(&self) -> chrono::Duration {
        chrono::Duration::seconds(
            self.safety_margin_secs
                .unwrap_or(DEFAULT_SAFETY_MARGIN_SECS)
                .max(0),
        )
    }
}

/// Apply `[tools.names]` overrides to the default procedure table.
fn procedure_names(overrides: &BTreeMap<String, String>) -> Result<ProcedureNames, ConfigError> {
    let mut names = ProcedureNames::default();
    for (key, name) in overrides {
        let kind: OperationKind = key.parse().map_err(|_| ConfigError::InvalidValue {
            key: format!("tools.names.{key}"),
            message: "not a known operation".into(),
        })?;
        names = if name.trim().is_empty() {
            names.without(kind)
        } else {
            names.with(kind, name.trim())
        };
    }
    Ok(names)
}

/// Get the Hisho config directory path (~/.hisho/).
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("HISHO_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    dirs_next::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".hisho")
}

/// Load and parse a TOML settings file. A missing file yields defaults.
pub fn load_settings_file(path: &Path) -> Result<SettingsFile, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SettingsFile::default()),
        Err(e) => {
            tracing::warn!("Failed to read {}: {}", path.display(), e);
            Ok(SettingsFile::default())
        }
    }
}
