//! The closed set of operations the router can perform.

use crate::abstract_tool::AbstractTool;
use crate::error::ToolError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListEventsArgs {
    /// Day to list, `YYYY-MM-DD`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_results: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventArgs {
    pub title: String,
    pub date: String,
    /// Start time, `HH:MM`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchMailArgs {
    /// Gmail search syntax, e.g. `is:unread newer_than:1d`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_results: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadMailArgs {
    pub message_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendMailArgs {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateDraftArgs {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendDraftArgs {
    pub draft_id: String,
}

/// One concrete thing the secretary can do, with typed arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    ListEvents(ListEventsArgs),
    CreateEvent(CreateEventArgs),
    SearchMail(SearchMailArgs),
    ReadMail(ReadMailArgs),
    SendMail(SendMailArgs),
    CreateDraft(CreateDraftArgs),
    SendDraft(SendDraftArgs),
    GetProfile,
}

/// Fieldless discriminant of [`Operation`]; the key resolvers map from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    ListEvents,
    CreateEvent,
    SearchMail,
    ReadMail,
    SendMail,
    CreateDraft,
    SendDraft,
    GetProfile,
}

impl OperationKind {
    pub const ALL: [OperationKind; 8] = [
        OperationKind::ListEvents,
        OperationKind::CreateEvent,
        OperationKind::SearchMail,
        OperationKind::ReadMail,
        OperationKind::SendMail,
        OperationKind::CreateDraft,
        OperationKind::SendDraft,
        OperationKind::GetProfile,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::ListEvents => "list_events",
            OperationKind::CreateEvent => "create_event",
            OperationKind::SearchMail => "search_mail",
            OperationKind::ReadMail => "read_mail",
            OperationKind::SendMail => "send_mail",
            OperationKind::CreateDraft => "create_draft",
            OperationKind::SendDraft => "send_draft",
            OperationKind::GetProfile => "get_profile",
        }
    }

    /// The abstract tool this operation is reached through.
    pub fn abstract_tool(self) -> AbstractTool {
        match self {
            OperationKind::ListEvents | OperationKind::CreateEvent => AbstractTool::ManageCalendar,
            OperationKind::SearchMail
            | OperationKind::ReadMail
            | OperationKind::SendMail
            | OperationKind::CreateDraft
            | OperationKind::SendDraft => AbstractTool::ManageGmail,
            OperationKind::GetProfile => AbstractTool::GetProfile,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OperationKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ToolError::UnknownOperation(s.to_string()))
    }
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::ListEvents(_) => OperationKind::ListEvents,
            Operation::CreateEvent(_) => OperationKind::CreateEvent,
            Operation::SearchMail(_) => OperationKind::SearchMail,
            Operation::ReadMail(_) => OperationKind::ReadMail,
            Operation::SendMail(_) => OperationKind::SendMail,
            Operation::CreateDraft(_) => OperationKind::CreateDraft,
            Operation::SendDraft(_) => OperationKind::SendDraft,
            Operation::GetProfile => OperationKind::GetProfile,
        }
    }

    /// The argument object sent as `tools/call` arguments.
    pub fn arguments(&self) -> serde_json::Map<String, serde_json::Value> {
        let value = match self {
            Operation::ListEvents(args) => serde_json::to_value(args),
            Operation::CreateEvent(args) => serde_json::to_value(args),
            Operation::SearchMail(args) => serde_json::to_value(args),
            Operation::ReadMail(args) => serde_json::to_value(args),
            Operation::SendMail(args) => serde_json::to_value(args),
            Operation::CreateDraft(args) => serde_json::to_value(args),
            Operation::SendDraft(args) => serde_json::to_value(args),
            Operation::GetProfile => return serde_json::Map::new(),
        };
        match value {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        }
    }
}
