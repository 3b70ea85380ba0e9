//! Single-flight credential cache.
//!
//! The cache holds at most one token and at most one pending refresh. The
//! first caller to find the token stale installs a shared refresh future;
//! every caller arriving while it runs awaits that same future, so one
//! expiry window costs exactly one network call. The refresh future writes
//! its own result back, so it completes even if the caller that started it
//! goes away.
//!
//! Once less than a quarter of a token's lifetime remains, the next caller
//! still gets the cached token immediately but also kicks off a background
//! refresh through the same single-flight slot. A failed background refresh
//! is logged and forgotten; the old token keeps being served until it
//! reaches the refresh margin.

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::{IssuedToken, OAuthTokenSource, StaticTokenSource, TokenSource};
use crate::config::{resolve_secret, AuthConfig};
use crate::error::CredentialError;

/// A cached access token. Callers always receive their own copy.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    value: String,
    scheme: String,
    issued_at: Instant,
    expires_at: Instant,
}

impl AccessToken {
    fn stamp(issued: IssuedToken, now: Instant) -> Result<Self, CredentialError> {
        let expires_at = now.checked_add(issued.expires_in).ok_or_else(|| {
            CredentialError::InvalidResponse(format!(
                "expires_in of {}s is out of range",
                issued.expires_in.as_secs()
            ))
        })?;
        Ok(Self {
            value: issued.access_token,
            scheme: issued.scheme,
            issued_at: now,
            expires_at,
        })
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    /// Time left before expiry (zero once expired).
    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }

    /// Value for an `authorization` header.
    pub fn authorization(&self) -> String {
        format!("{} {}", self.scheme, self.value)
    }

    fn is_fresh(&self, margin: Duration, now: Instant) -> bool {
        match self.expires_at.checked_sub(margin) {
            Some(usable_until) => now < usable_until,
            None => false,
        }
    }

    /// Less than a quarter of the issued lifetime is left.
    fn is_old(&self, now: Instant) -> bool {
        let lifetime = self.expires_at.saturating_duration_since(self.issued_at);
        self.expires_at.saturating_duration_since(now) < lifetime / 4
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"<redacted>")
            .field("scheme", &self.scheme)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

type RefreshFuture = Shared<BoxFuture<'static, Result<AccessToken, CredentialError>>>;

#[derive(Default)]
struct CacheState {
    token: Option<AccessToken>,
    in_flight: Option<RefreshFuture>,
}

/// Session-scoped token cache shared by every call a client makes.
pub struct CredentialCache {
    source: Arc<dyn TokenSource>,
    refresh_margin: Duration,
    state: Arc<Mutex<CacheState>>,
}

impl CredentialCache {
    pub fn new(source: Arc<dyn TokenSource>, refresh_margin: Duration) -> Self {
        Self {
            source,
            refresh_margin,
            state: Arc::new(Mutex::new(CacheState::default())),
        }
    }

    /// Build a cache from the `[auth]` config section.
    ///
    /// A configured static token wins over the OAuth flow. `${VAR}`
    /// references are expanded; an unset variable counts as missing.
    pub fn from_config(config: &AuthConfig) -> Result<Self, CredentialError> {
        let margin = Duration::from_secs(config.refresh_margin_secs);

        if let Some(token) = config.static_token.as_deref().and_then(resolve_secret) {
            tracing::debug!("Using static access token");
            return Ok(Self::new(Arc::new(StaticTokenSource::new(token)?), margin));
        }

        let client_id =
            resolve_secret(&config.client_id).ok_or(CredentialError::MissingCredentials("client_id"))?;
        let client_secret = resolve_secret(&config.client_secret)
            .ok_or(CredentialError::MissingCredentials("client_secret"))?;
        let source = OAuthTokenSource::new(
            client_id,
            client_secret,
            config.auth_url.clone(),
            config.audience.clone(),
        )?;
        Ok(Self::new(Arc::new(source), margin))
    }

    pub fn refresh_margin(&self) -> Duration {
        self.refresh_margin
    }

    /// Return a token that is valid for at least the refresh margin.
    ///
    /// Serves the cached token without I/O while it is fresh, starting a
    /// background refresh when it is getting old. Otherwise joins the
    /// pending refresh, starting one if none is running. A failed refresh
    /// is reported to every waiter and is not remembered.
    pub async fn get_token(&self) -> Result<AccessToken, CredentialError> {
        let refresh = {
            let mut state = self.state.lock();
            let now = Instant::now();
            let cached = state
                .token
                .as_ref()
                .filter(|token| token.is_fresh(self.refresh_margin, now))
                .cloned();
            if let Some(token) = cached {
                if token.is_old(now) && state.in_flight.is_none() {
                    self.refresh_in_background(&mut state);
                }
                return Ok(token);
            }
            match &state.in_flight {
                Some(pending) => pending.clone(),
                None => {
                    let pending = self.start_refresh();
                    state.in_flight = Some(pending.clone());
                    pending
                }
            }
        };
        refresh.await
    }

    /// Authorization metadata value: `"{scheme} {token}"`.
    pub async fn authorization(&self) -> Result<String, CredentialError> {
        Ok(self.get_token().await?.authorization())
    }

    /// Drop the cached token so the next call refreshes.
    pub fn invalidate(&self) {
        self.state.lock().token = None;
        tracing::debug!("Access token invalidated");
    }

    fn refresh_in_background(&self, state: &mut CacheState) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        tracing::debug!("Access token is past 75% of its lifetime, refreshing in the background");

        let pending = self.start_refresh();
        state.in_flight = Some(pending.clone());
        runtime.spawn(async move {
            // The refresh logs its own failure and the next caller retries
            let _ = pending.await;
        });
    }

    fn start_refresh(&self) -> RefreshFuture {
        let source = Arc::clone(&self.source);
        let state = Arc::clone(&self.state);
        let margin = self.refresh_margin;

        async move {
            // A panicking source must still release the slot below
            let fetch = fetch_token(source, margin);
            let result = match AssertUnwindSafe(fetch).catch_unwind().await {
                Ok(result) => result,
                Err(_) => Err(CredentialError::InvalidResponse(
                    "token source panicked".to_string(),
                )),
            };

            let mut state = state.lock();
            state.in_flight = None;
            match &result {
                Ok(token) => {
                    tracing::debug!("Access token refreshed, valid for {:?}", token.remaining());
                    state.token = Some(token.clone());
                }
                Err(e) => tracing::warn!("Access token refresh failed: {}", e),
            }
            result
        }
        .boxed()
        .shared()
    }
}

async fn fetch_token(
    source: Arc<dyn TokenSource>,
    margin: Duration,
) -> Result<AccessToken, CredentialError> {
    tracing::debug!("Refreshing access token via {}", source.name());
    let issued = source.fetch().await?;
    let now = Instant::now();
    let token = AccessToken::stamp(issued, now)?;
    if token.is_fresh(margin, now) {
        Ok(token)
    } else {
        Err(CredentialError::TokenExpired)
    }
}
