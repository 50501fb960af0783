//! Turn loop orchestration and conversation sessions for Hisho.

mod conversation;
mod error;
mod event;
mod prompt;
mod secretary;
mod turn;

pub use conversation::{Conversation, ReplyStream, ToolActivityHook};
pub use error::channel_error;
pub use event::{ReplyFragment, ToolActivity, TurnEvent, TurnOutcome};
pub use prompt::{DEFAULT_SYSTEM_PROMPT, build_system_prompt};
pub use secretary::{Dashboard, Secretary, SecretaryConfig, StartReport};
pub use turn::{DEFAULT_MAX_TOOL_ROUNDS, TurnLoop};
