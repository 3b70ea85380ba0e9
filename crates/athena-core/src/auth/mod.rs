//! Access-token acquisition for the classification service.
//!
//! A [`TokenSource`] performs the network exchange; the [`CredentialCache`]
//! sits in front of it, serves cached tokens while they are fresh and makes
//! sure at most one refresh is in flight at any time.

pub mod cache;
pub mod oauth;

pub use cache::{AccessToken, CredentialCache};
pub use oauth::{OAuthTokenSource, StaticTokenSource};

use async_trait::async_trait;
use std::time::Duration;

use crate::error::CredentialError;

/// A token as handed out by the issuer, before the cache stamps it.
#[derive(Clone)]
pub struct IssuedToken {
    pub access_token: String,
    /// Lifetime from the moment of issue
    pub expires_in: Duration,
    /// Authorization scheme, usually `Bearer`
    pub scheme: String,
}

impl std::fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedToken")
            .field("access_token", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .field("scheme", &self.scheme)
            .finish()
    }
}

/// Something that can issue a fresh access token.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Fetch a new token. Called only by the cache, one call at a time.
    async fn fetch(&self) -> Result<IssuedToken, CredentialError>;
}
