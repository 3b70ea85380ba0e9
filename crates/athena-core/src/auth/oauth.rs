//! OAuth client-credentials token source.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{IssuedToken, TokenSource};
use crate::error::CredentialError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_EXPIRES_IN: u64 = 3600;
const DEFAULT_SCHEME: &str = "Bearer";

/// Exchanges a client id and secret for an access token.
pub struct OAuthTokenSource {
    client_id: String,
    client_secret: String,
    auth_url: String,
    audience: String,
    client: reqwest::Client,
}

impl OAuthTokenSource {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        auth_url: impl Into<String>,
        audience: impl Into<String>,
    ) -> Result<Self, CredentialError> {
        let client_id = client_id.into();
        let client_secret = client_secret.into();
        if client_id.is_empty() {
            return Err(CredentialError::MissingCredentials("client_id"));
        }
        if client_secret.is_empty() {
            return Err(CredentialError::MissingCredentials("client_secret"));
        }

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| CredentialError::Http(e.to_string()))?;

        Ok(Self {
            client_id,
            client_secret,
            auth_url: auth_url.into(),
            audience: audience.into(),
            client,
        })
    }
}

// --- Request / response types ---

#[derive(Serialize)]
struct TokenRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    audience: &'a str,
    grant_type: &'static str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
    token_type: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: Option<String>,
    error_description: Option<String>,
}

impl TokenResponse {
    fn into_issued(self) -> Result<IssuedToken, CredentialError> {
        let access_token = self
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| CredentialError::InvalidResponse("missing access_token".to_string()))?;
        let scheme = self
            .token_type
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| DEFAULT_SCHEME.to_string());
        Ok(IssuedToken {
            access_token,
            expires_in: Duration::from_secs(self.expires_in.unwrap_or(DEFAULT_EXPIRES_IN)),
            scheme,
        })
    }
}

#[async_trait]
impl TokenSource for OAuthTokenSource {
    fn name(&self) -> &str {
        "oauth"
    }

    async fn fetch(&self) -> Result<IssuedToken, CredentialError> {
        tracing::debug!("Requesting access token from {}", self.auth_url);

        let body = TokenRequest {
            client_id: &self.client_id,
            client_secret: &self.client_secret,
            audience: &self.audience,
            grant_type: "client_credentials",
        };

        let resp = self
            .client
            .post(&self.auth_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| CredentialError::Http(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&text)
                .ok()
                .and_then(|e| e.error_description.or(e.error));
            return Err(CredentialError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| CredentialError::InvalidResponse(e.to_string()))?;
        token.into_issued()
    }
}

/// A pre-issued token with no refresh flow.
pub struct StaticTokenSource {
    token: String,
    scheme: String,
}

impl StaticTokenSource {
    /// How long the cache treats a static token as valid before re-reading it.
    pub const LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

    pub fn new(token: impl Into<String>) -> Result<Self, CredentialError> {
        let token = token.into();
        if token.is_empty() {
            return Err(CredentialError::MissingCredentials("static_token"));
        }
        Ok(Self {
            token,
            scheme: DEFAULT_SCHEME.to_string(),
        })
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch(&self) -> Result<IssuedToken, CredentialError> {
        Ok(IssuedToken {
            access_token: self.token.clone(),
            expires_in: Self::LIFETIME,
            scheme: self.scheme.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve a single canned HTTP response and return the request body.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/oauth/token", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            let body_start = loop {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                if let Some(pos) = request.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos + 4;
                }
            };
            let headers = String::from_utf8_lossy(&request[..body_start]).to_lowercase();
            let length: usize = headers
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .map(|v| v.trim().parse().unwrap())
                .unwrap_or(0);
            while request.len() < body_start + length {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
            }

            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&request[body_start..]).to_string()
        });
        (url, handle)
    }

    #[test]
    fn test_empty_credentials_rejected() {
        assert_eq!(
            OAuthTokenSource::new("", "secret", "http://x", "aud").err(),
            Some(CredentialError::MissingCredentials("client_id"))
        );
        assert_eq!(
            OAuthTokenSource::new("id", "", "http://x", "aud").err(),
            Some(CredentialError::MissingCredentials("client_secret"))
        );
    }

    #[tokio::test]
    async fn test_fetch_parses_token_and_sends_grant() {
        let (url, server) = serve_once(
            "200 OK",
            r#"{"access_token":"abc","expires_in":120,"token_type":" bearer "}"#,
        )
        .await;
        let source = OAuthTokenSource::new("id", "secret", url, "aud").unwrap();

        let token = source.fetch().await.unwrap();
        assert_eq!(token.access_token, "abc");
        assert_eq!(token.expires_in, Duration::from_secs(120));
        assert_eq!(token.scheme, "bearer");

        let sent: serde_json::Value = serde_json::from_str(&server.await.unwrap()).unwrap();
        assert_eq!(sent["grant_type"], "client_credentials");
        assert_eq!(sent["client_id"], "id");
        assert_eq!(sent["audience"], "aud");
    }

    #[tokio::test]
    async fn test_fetch_applies_defaults() {
        let (url, _server) = serve_once("200 OK", r#"{"access_token":"abc"}"#).await;
        let source = OAuthTokenSource::new("id", "secret", url, "aud").unwrap();

        let token = source.fetch().await.unwrap();
        assert_eq!(token.expires_in, Duration::from_secs(3600));
        assert_eq!(token.scheme, "Bearer");
    }

    #[tokio::test]
    async fn test_rejection_carries_description() {
        let (url, _server) = serve_once(
            "401 Unauthorized",
            r#"{"error":"access_denied","error_description":"Unauthorized"}"#,
        )
        .await;
        let source = OAuthTokenSource::new("id", "secret", url, "aud").unwrap();

        let err = source.fetch().await.unwrap_err();
        assert_eq!(
            err,
            CredentialError::Rejected {
                status: 401,
                message: Some("Unauthorized".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn test_missing_access_token_is_invalid_response() {
        let (url, _server) = serve_once("200 OK", r#"{"expires_in":60}"#).await;
        let source = OAuthTokenSource::new("id", "secret", url, "aud").unwrap();

        assert!(matches!(
            source.fetch().await,
            Err(CredentialError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_static_source() {
        let source = StaticTokenSource::new("pre-issued").unwrap();
        let token = source.fetch().await.unwrap();
        assert_eq!(token.access_token, "pre-issued");
        assert!(StaticTokenSource::new("").is_err());
    }
}
