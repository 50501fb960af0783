//! Tool router for Hisho.
//!
//! The model sees a few coarse abstract tools (`manage_calendar`,
//! `manage_gmail`, `get_profile`). Each request is parsed into a typed
//! [`Operation`], resolved to the tool server's concrete procedure name and
//! sent over MCP. Results are normalized and classified into an [`Outcome`].

mod abstract_tool;
mod error;
mod mapping;
mod normalize;
mod operation;
mod outcome;
mod router;

pub use abstract_tool::AbstractTool;
pub use error::ToolError;
pub use mapping::{ProcedureNames, Resolver};
pub use normalize::normalize_content;
pub use operation::{
    CreateDraftArgs, CreateEventArgs, ListEventsArgs, Operation, OperationKind, ReadMailArgs,
    SearchMailArgs, SendDraftArgs, SendMailArgs,
};
pub use outcome::{Outcome, ToolInvocation, classify_error};
pub use router::ToolRouter;
