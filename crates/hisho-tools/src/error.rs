use thiserror::Error;

/// Failures that happen before anything is sent to the tool server.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ToolError {
    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },

    #[error("Invalid arguments for {tool}: {message}")]
    InvalidArguments { tool: String, message: String },

    #[error("No remote procedure is mapped for {operation}")]
    Unmapped { operation: String },

    #[error("Unknown operation: {0}")]
    UnknownOperation(String),
}
