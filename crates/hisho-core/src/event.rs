//! Events and results produced while a turn runs.

use hisho_tools::ToolInvocation;
use hisho_types::Usage;

/// Events emitted by the turn loop as it runs.
#[derive(Debug, Clone)]
pub enum TurnEvent {
    /// A text delta from the model.
    TextDelta(String),
    /// A requested tool is about to run.
    ToolStart {
        id: String,
        name: String,
        args: serde_json::Value,
    },
    /// A tool finished (successfully or not).
    ToolEnd {
        id: String,
        invocation: ToolInvocation,
    },
    /// Usage of one generation request.
    Usage(Usage),
    /// The model kept requesting tools after the round limit.
    Truncated { rounds: usize },
    /// The model produced its final answer.
    Done,
    /// The turn was cancelled.
    Cancelled,
}

/// What a completed turn produced.
#[derive(Debug, Clone, Default)]
pub struct TurnOutcome {
    /// All text the model produced during the turn.
    pub text: String,
    /// True if the turn stopped at the tool round limit.
    pub truncated: bool,
    /// Tool rounds executed.
    pub tool_rounds: usize,
    pub usage: Usage,
    pub invocations: Vec<ToolInvocation>,
}

/// What a reply stream yields.
#[derive(Debug, Clone)]
pub enum ReplyFragment {
    Text(String),
    /// Last item of a successful turn.
    Finished { truncated: bool, usage: Usage },
}

/// Tool activity reported to an optional observer.
#[derive(Debug, Clone)]
pub enum ToolActivity {
    Started {
        name: String,
        args: serde_json::Value,
    },
    Finished(ToolInvocation),
}
