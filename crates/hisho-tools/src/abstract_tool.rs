//! The coarse tools the model is offered, and how their requests parse into
//! operations.

use crate::error::ToolError;
use crate::operation::{
    CreateDraftArgs, CreateEventArgs, ListEventsArgs, Operation, ReadMailArgs, SearchMailArgs,
    SendDraftArgs, SendMailArgs,
};
use hisho_types::ToolDefinition;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AbstractTool {
    ManageCalendar,
    ManageGmail,
    GetProfile,
}

#[derive(Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum CalendarRequest {
    List(ListEventsArgs),
    Create(CreateEventArgs),
}

#[derive(Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum GmailRequest {
    Search(SearchMailArgs),
    GetDetail(ReadMailArgs),
    Send(SendMailArgs),
    CreateDraft(CreateDraftArgs),
    SendDraft(SendDraftArgs),
}

impl AbstractTool {
    pub const ALL: [AbstractTool; 3] = [
        AbstractTool::ManageCalendar,
        AbstractTool::ManageGmail,
        AbstractTool::GetProfile,
    ];

    pub fn name(self) -> &'static str {
        match self {
            AbstractTool::ManageCalendar => "manage_calendar",
            AbstractTool::ManageGmail => "manage_gmail",
            AbstractTool::GetProfile => "get_profile",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }

    /// Parse a model-supplied argument object into a typed operation.
    pub fn parse(self, args: serde_json::Value) -> Result<Operation, ToolError> {
        let invalid = |e: serde_json::Error| ToolError::InvalidArguments {
            tool: self.name().to_string(),
            message: e.to_string(),
        };
        match self {
            AbstractTool::ManageCalendar => {
                Ok(match serde_json::from_value(args).map_err(invalid)? {
                    CalendarRequest::List(a) => Operation::ListEvents(a),
                    CalendarRequest::Create(a) => Operation::CreateEvent(a),
                })
            }
            AbstractTool::ManageGmail => Ok(match serde_json::from_value(args).map_err(invalid)? {
                GmailRequest::Search(a) => Operation::SearchMail(a),
                GmailRequest::GetDetail(a) => Operation::ReadMail(a),
                GmailRequest::Send(a) => Operation::SendMail(a),
                GmailRequest::CreateDraft(a) => Operation::CreateDraft(a),
                GmailRequest::SendDraft(a) => Operation::SendDraft(a),
            }),
            AbstractTool::GetProfile => Ok(Operation::GetProfile),
        }
    }

    pub fn definition(self) -> ToolDefinition {
        let (description, input_schema) = match self {
            AbstractTool::ManageCalendar => (
                "Read or add events on the user's calendar. \
                 action=list lists the events of one day; action=create adds an event.",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "action": {"type": "string", "enum": ["list", "create"]},
                        "date": {"type": "string", "description": "Day in YYYY-MM-DD format"},
                        "maxResults": {"type": "integer", "description": "Maximum number of events to list"},
                        "title": {"type": "string", "description": "Title of the event to create"},
                        "time": {"type": "string", "description": "Start time in HH:MM format"},
                        "durationMinutes": {"type": "integer"},
                        "description": {"type": "string"}
                    },
                    "required": ["action"]
                }),
            ),
            AbstractTool::ManageGmail => (
                "Search, read and send the user's mail. \
                 Use create_draft and send_draft when the user wants to review before sending.",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "action": {
                            "type": "string",
                            "enum": ["search", "get_detail", "send", "create_draft", "send_draft"]
                        },
                        "query": {"type": "string", "description": "Gmail search query, e.g. is:unread"},
                        "maxResults": {"type": "integer"},
                        "messageId": {"type": "string", "description": "Message to read (get_detail)"},
                        "draftId": {"type": "string", "description": "Draft to send (send_draft)"},
                        "to": {"type": "string"},
                        "subject": {"type": "string"},
                        "body": {"type": "string"}
                    },
                    "required": ["action"]
                }),
            ),
            AbstractTool::GetProfile => (
                "Get the signed-in user's name and email address.",
                serde_json::json!({"type": "object", "properties": {}}),
            ),
        };
        ToolDefinition {
            name: self.name().to_string(),
            description: description.to_string(),
            input_schema,
        }
    }
}
