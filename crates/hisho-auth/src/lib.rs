//! Credential management for Hisho.
//!
//! A [`CredentialManager`] caches the bearer token handed out by a
//! [`CredentialStore`] and refreshes it shortly before it expires. Concurrent
//! callers share a single in-flight refresh.

mod credential;
mod error;
mod manager;
mod store;

pub use credential::Credential;
pub use error::{AuthError, AuthFailure};
pub use manager::{CredentialManager, DEFAULT_SAFETY_MARGIN_SECS};
pub use store::{
    CredentialFuture, CredentialStore, OAuthClientConfig, OAuthRefreshStore, StaticCredentialStore,
};
