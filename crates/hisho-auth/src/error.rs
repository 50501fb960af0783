//! Error types for credential handling.

use thiserror::Error;

/// Errors from acquiring or refreshing a credential.
///
/// `Clone` because one refresh result is handed to every caller that was
/// waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("No credentials available; sign in first")]
    NoSession,

    #[error("Re-authentication required: {reason}")]
    ReauthenticationRequired { reason: String },

    #[error("Token endpoint request failed: {0}")]
    Http(String),

    #[error("Invalid token endpoint response: {0}")]
    InvalidResponse(String),
}

/// Errors that can say whether the remote side rejected our credentials.
pub trait AuthFailure {
    fn is_auth_failure(&self) -> bool;
}

impl AuthFailure for AuthError {
    fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            AuthError::NoSession | AuthError::ReauthenticationRequired { .. }
        )
    }
}
