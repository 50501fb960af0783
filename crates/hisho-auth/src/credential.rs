use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A bearer credential as handed out by a [`crate::CredentialStore`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            expires_at,
        }
    }

    /// Build a credential from an OAuth `expires_in` (seconds from `now`).
    pub fn expiring_in(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_in_secs: i64,
        now: DateTime<Utc>,
    ) -> Self {
        Self::new(
            access_token,
            refresh_token,
            now + Duration::seconds(expires_in_secs.max(0)),
        )
    }

    /// A token that never expires on its own (e.g. a static API token).
    pub fn non_expiring(access_token: impl Into<String>) -> Self {
        Self::new(access_token, None, DateTime::<Utc>::MAX_UTC)
    }

    /// True once `now` is within `margin` of the expiry.
    pub fn needs_refresh(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        match now.checked_add_signed(margin) {
            Some(deadline) => self.expires_at <= deadline,
            None => true,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
