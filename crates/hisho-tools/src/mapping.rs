//! Resolution of operations to the tool server's procedure names.

use crate::operation::OperationKind;
use std::collections::HashMap;

/// Maps an operation to the concrete remote procedure that performs it.
///
/// Returning `None` means the provider has no procedure for that operation.
pub trait Resolver: Send + Sync {
    fn resolve(&self, kind: OperationKind) -> Option<String>;
}

impl<F> Resolver for F
where
    F: Fn(OperationKind) -> Option<String> + Send + Sync,
{
    fn resolve(&self, kind: OperationKind) -> Option<String> {
        self(kind)
    }
}

/// A table of procedure names, starting from the workspace server's names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcedureNames {
    names: HashMap<OperationKind, String>,
}

impl ProcedureNames {
    /// A table with no entries.
    pub fn empty() -> Self {
        Self {
            names: HashMap::new(),
        }
    }

    /// Replace (or add) the procedure name for one operation.
    pub fn with(mut self, kind: OperationKind, name: impl Into<String>) -> Self {
        self.names.insert(kind, name.into());
        self
    }

    /// Stop mapping an operation.
    pub fn without(mut self, kind: OperationKind) -> Self {
        self.names.remove(&kind);
        self
    }

    pub fn get(&self, kind: OperationKind) -> Option<&str> {
        self.names.get(&kind).map(String::as_str)
    }
}

impl Default for ProcedureNames {
    fn default() -> Self {
        Self::empty()
            .with(OperationKind::ListEvents, "list_events")
            .with(OperationKind::CreateEvent, "create_event")
            .with(OperationKind::SearchMail, "search_threads")
            .with(OperationKind::ReadMail, "get_message")
            .with(OperationKind::SendMail, "send_message")
            .with(OperationKind::CreateDraft, "gmail.createDraft")
            .with(OperationKind::SendDraft, "gmail.sendDraft")
            .with(OperationKind::GetProfile, "get_user_profile")
    }
}

impl Resolver for ProcedureNames {
    fn resolve(&self, kind: OperationKind) -> Option<String> {
        self.get(kind).map(str::to_string)
    }
}
