use hisho_auth::AuthFailure;
use hisho_mcp::McpError;
use hisho_tools::Outcome;
use hisho_types::HishoError;

/// Map a tool channel failure to the error surfaced to the user.
pub fn channel_error(error: McpError) -> HishoError {
    if error.is_auth_failure() {
        return HishoError::ReauthenticationRequired(error.to_string());
    }
    match error {
        McpError::JsonRpc { .. } | McpError::Protocol(_) | McpError::Json(_) => {
            HishoError::Protocol(error.to_string())
        }
        other => HishoError::Transport(other.to_string()),
    }
}

/// The error that ends a turn for a fatal tool outcome, if it is one.
pub(crate) fn outcome_error(outcome: &Outcome) -> Option<HishoError> {
    if !outcome.is_fatal() {
        return None;
    }
    match outcome {
        Outcome::AuthExpired(detail) => Some(HishoError::ReauthenticationRequired(detail.clone())),
        Outcome::TransportFailed(detail) => Some(HishoError::Transport(detail.clone())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hisho_auth::AuthError;

    #[test]
    fn channel_errors_map_by_class() {
        assert!(matches!(
            channel_error(McpError::Http {
                status: 401,
                message: "Unauthorized".into()
            }),
            HishoError::ReauthenticationRequired(_)
        ));
        assert!(matches!(
            channel_error(McpError::Auth(AuthError::NoSession)),
            HishoError::ReauthenticationRequired(_)
        ));
        assert!(matches!(
            channel_error(McpError::HandshakeTimeout { timeout_ms: 10 }),
            HishoError::Transport(_)
        ));
        assert!(matches!(
            channel_error(McpError::Protocol("bad result".into())),
            HishoError::Protocol(_)
        ));
    }

    #[test]
    fn only_auth_and_transport_outcomes_are_fatal() {
        assert!(matches!(
            outcome_error(&Outcome::AuthExpired("revoked".into())),
            Some(HishoError::ReauthenticationRequired(_))
        ));
        assert!(matches!(
            outcome_error(&Outcome::TransportFailed("closed".into())),
            Some(HishoError::Transport(_))
        ));
        assert!(outcome_error(&Outcome::ToolError("bad date".into())).is_none());
        assert!(outcome_error(&Outcome::Timeout { timeout_ms: 10 }).is_none());
        assert!(outcome_error(&Outcome::Ok(serde_json::json!([]))).is_none());
    }

    #[test]
    fn outcome_errors_follow_the_fatal_classification() {
        let outcomes = [
            Outcome::Ok(serde_json::json!({})),
            Outcome::ToolError("bad date".into()),
            Outcome::AuthExpired("revoked".into()),
            Outcome::TransportFailed("closed".into()),
            Outcome::Timeout { timeout_ms: 10 },
        ];
        for outcome in &outcomes {
            assert_eq!(outcome_error(outcome).is_some(), outcome.is_fatal(), "{outcome:?}");
        }
    }
}
