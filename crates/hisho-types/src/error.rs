//! Error hierarchy for Hisho.

use thiserror::Error;

/// Top-level error type surfaced by a conversation turn.
#[derive(Debug, Error)]
pub enum HishoError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The tool server or the credential backend rejected our credentials.
    #[error("Re-authentication required: {0}")]
    ReauthenticationRequired(String),

    /// The tool channel never became ready or was closed mid-flight.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("A turn is already in progress for this conversation")]
    TurnInProgress,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl HishoError {
    /// Short, non-technical text suitable for showing to the end user.
    pub fn user_message(&self) -> &'static str {
        match self {
            HishoError::ReauthenticationRequired(_) => {
                "Your connection to the workspace has expired. Please reconnect your account."
            }
            HishoError::Transport(_) | HishoError::Api(_) | HishoError::Protocol(_) => {
                "Something went wrong while talking to the service. Please try again."
            }
            HishoError::TurnInProgress => "Please wait for the current reply to finish.",
            HishoError::Cancelled => "Cancelled.",
            HishoError::Config(_) | HishoError::Other(_) => {
                "Something went wrong. Please try again."
            }
        }
    }
}

/// Errors from the generation endpoint.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    #[error("Bad request: {message}")]
    BadRequest { message: String },

    #[error("Rate limited (retry after {retry_after_ms:?}ms)")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Model overloaded")]
    Overloaded,

    #[error("Server error: {status} {message}")]
    Server { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Stream parse error: {0}")]
    StreamParse(String),

    #[error("Request timeout")]
    Timeout,
}

/// Errors from configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file parse error at {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Missing required configuration: {key}")]
    MissingKey { key: String },

    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}
