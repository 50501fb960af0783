//! Credential store collaborators.
//!
//! The store owns the credential; the manager only caches what the store
//! hands out and asks it to refresh.

use crate::credential::Credential;
use crate::error::AuthError;
use chrono::Utc;
use serde::Deserialize;
use std::future::Future;
use std::pin::Pin;
use tokio::sync::Mutex;

/// Access tokens without an `expires_in` are assumed to live this long.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

pub type CredentialFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Credential, AuthError>> + Send + 'a>>;

/// Source of bearer credentials.
pub trait CredentialStore: Send + Sync {
    /// Return the current session credential.
    fn get_session(&self) -> CredentialFuture<'_>;

    /// Exchange `current` for a fresh credential.
    fn refresh_session<'a>(&'a self, current: &'a Credential) -> CredentialFuture<'a>;
}

/// A fixed token that cannot be refreshed.
pub struct StaticCredentialStore {
    credential: Credential,
}

impl StaticCredentialStore {
    pub fn new(credential: Credential) -> Self {
        Self { credential }
    }

    pub fn token(access_token: impl Into<String>) -> Self {
        Self::new(Credential::non_expiring(access_token))
    }
}

impl CredentialStore for StaticCredentialStore {
    fn get_session(&self) -> CredentialFuture<'_> {
        let credential = self.credential.clone();
        Box::pin(async move { Ok(credential) })
    }

    fn refresh_session<'a>(&'a self, _current: &'a Credential) -> CredentialFuture<'a> {
        Box::pin(async {
            Err(AuthError::ReauthenticationRequired {
                reason: "static token cannot be refreshed".to_string(),
            })
        })
    }
}

/// OAuth client settings for [`OAuthRefreshStore`].
#[derive(Debug, Clone)]
pub struct OAuthClientConfig {
    pub token_endpoint: String,
    pub client_id: String,
    pub client_secret: Option<String>,
}

/// Refreshes an OAuth 2.0 grant against a token endpoint.
pub struct OAuthRefreshStore {
    http: reqwest::Client,
    config: OAuthClientConfig,
    current: Mutex<Option<Credential>>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

impl OAuthRefreshStore {
    pub fn new(config: OAuthClientConfig, initial: Option<Credential>) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            current: Mutex::new(initial),
        }
    }

    async fn request_refresh(&self, refresh_token: &str) -> Result<TokenResponse, AuthError> {
        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
        ];
        if let Some(secret) = self.config.client_secret.as_deref() {
            form.push(("client_secret", secret));
        }

        let response = self
            .http
            .post(&self.config.token_endpoint)
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::ReauthenticationRequired {
                reason: format!("token endpoint returned {status}: {body}"),
            });
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))
    }
}

impl CredentialStore for OAuthRefreshStore {
    fn get_session(&self) -> CredentialFuture<'_> {
        Box::pin(async move { self.current.lock().await.clone().ok_or(AuthError::NoSession) })
    }

    fn refresh_session<'a>(&'a self, current: &'a Credential) -> CredentialFuture<'a> {
        Box::pin(async move {
            let refresh_token = current.refresh_token.as_deref().ok_or_else(|| {
                AuthError::ReauthenticationRequired {
                    reason: "no refresh token on the current grant".to_string(),
                }
            })?;

            let token = self.request_refresh(refresh_token).await?;
            let fresh = Credential::expiring_in(
                token.access_token,
                // Providers usually omit the refresh token on refresh; keep ours
                token.refresh_token.or_else(|| current.refresh_token.clone()),
                token.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS),
                Utc::now(),
            );

            tracing::debug!("OAuth grant refreshed; expires at {}", fresh.expires_at);
            *self.current.lock().await = Some(fresh.clone());
            Ok(fresh)
        })
    }
}
