//! The credential manager: cached bearer token plus single-flight refresh.

use crate::credential::Credential;
use crate::error::{AuthError, AuthFailure};
use crate::store::CredentialStore;
use chrono::{DateTime, Duration, Utc};
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Tokens are refreshed once they are this close to expiry.
pub const DEFAULT_SAFETY_MARGIN_SECS: i64 = 60;

type Acquisition = Shared<BoxFuture<'static, Result<Credential, AuthError>>>;

/// Hands out valid bearer tokens, refreshing them through a [`CredentialStore`].
///
/// Cheap to clone; clones share the cache and the in-flight refresh.
#[derive(Clone)]
pub struct CredentialManager {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn CredentialStore>,
    safety_margin: Duration,
    cached: Mutex<Option<Credential>>,
    inflight: Mutex<Option<Acquisition>>,
}

impl CredentialManager {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self::with_safety_margin(store, Duration::seconds(DEFAULT_SAFETY_MARGIN_SECS))
    }

    pub fn with_safety_margin(store: Arc<dyn CredentialStore>, safety_margin: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                safety_margin,
                cached: Mutex::new(None),
                inflight: Mutex::new(None),
            }),
        }
    }

    /// Return a token that is not within the safety margin of expiry.
    ///
    /// If a refresh is needed and one is already running, this awaits that
    /// refresh instead of starting another.
    pub async fn get_valid_token(&self) -> Result<String, AuthError> {
        if let Some(credential) = self.fresh_cached(Utc::now()).await {
            return Ok(credential.access_token);
        }

        let acquisition = {
            let mut inflight = self.inner.inflight.lock().await;
            match inflight.as_ref() {
                Some(running) => running.clone(),
                None => {
                    let started = acquire(Arc::clone(&self.inner)).boxed().shared();
                    *inflight = Some(started.clone());
                    started
                }
            }
        };

        acquisition.await.map(|c| c.access_token)
    }

    /// Run `operation` with a valid token.
    ///
    /// If the operation fails because the remote rejected the token, the
    /// token is invalidated, refreshed once and the operation retried once.
    /// A second rejection is returned to the caller as-is.
    pub async fn with_valid_token<T, E, F, Fut>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: AuthFailure + From<AuthError>,
    {
        let token = self.get_valid_token().await?;
        match operation(token.clone()).await {
            Err(e) if e.is_auth_failure() => {
                tracing::warn!("Bearer token rejected; refreshing once before retrying");
                self.invalidate_token(&token).await;
                let fresh = self.get_valid_token().await?;
                operation(fresh).await
            }
            other => other,
        }
    }

    /// Force a refresh on next use.
    pub async fn invalidate(&self) {
        if let Some(credential) = self.inner.cached.lock().await.as_mut() {
            credential.expires_at = DateTime::<Utc>::MIN_UTC;
        }
    }

    /// Drop the cached credential entirely (sign-out).
    pub async fn clear(&self) {
        *self.inner.cached.lock().await = None;
    }

    /// Invalidate only if `token` is still the cached one, so a burst of
    /// rejections for the same stale token triggers a single refresh.
    async fn invalidate_token(&self, token: &str) {
        let mut cached = self.inner.cached.lock().await;
        if let Some(credential) = cached.as_mut() {
            if credential.access_token == token {
                credential.expires_at = DateTime::<Utc>::MIN_UTC;
            }
        }
    }

    async fn fresh_cached(&self, now: DateTime<Utc>) -> Option<Credential> {
        self.inner
            .cached
            .lock()
            .await
            .as_ref()
            .filter(|c| !c.needs_refresh(now, self.inner.safety_margin))
            .cloned()
    }
}

/// The shared acquisition: load or refresh, then release the in-flight slot.
async fn acquire(inner: Arc<Inner>) -> Result<Credential, AuthError> {
    let result = load_or_refresh(&inner).await;
    *inner.inflight.lock().await = None;
    result
}

async fn load_or_refresh(inner: &Inner) -> Result<Credential, AuthError> {
    let cached = inner.cached.lock().await.clone();
    let current = match cached {
        Some(credential) => credential,
        None => inner.store.get_session().await?,
    };

    if !current.needs_refresh(Utc::now(), inner.safety_margin) {
        *inner.cached.lock().await = Some(current.clone());
        return Ok(current);
    }

    tracing::debug!("Access token expires at {}; refreshing", current.expires_at);
    match inner.store.refresh_session(&current).await {
        Ok(fresh) => {
            tracing::info!("Access token refreshed; valid until {}", fresh.expires_at);
            *inner.cached.lock().await = Some(fresh.clone());
            Ok(fresh)
        }
        Err(e) => {
            tracing::warn!("Token refresh failed: {e}");
            *inner.cached.lock().await = None;
            Err(match e {
                AuthError::ReauthenticationRequired { .. } => e,
                other => AuthError::ReauthenticationRequired {
                    reason: other.to_string(),
                },
            })
        }
    }
}
