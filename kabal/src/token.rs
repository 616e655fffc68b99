//! Bearer token providers.
//!
//! [`KabalClient`](crate::KabalClient) asks its provider for a token on every call
//! and never stores one itself. Whether a provider caches is its own business:
//! [`ClientCredentialsTokenProvider`] reuses a token until shortly before it expires.

use crate::error::TokenError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Tokens are refreshed this long before they expire.
const EXPIRY_LEEWAY: Duration = Duration::from_secs(60);

/// Supplies bearer tokens for outgoing requests.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Get a token valid for at least the next request.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError`] if no token can be obtained.
    async fn token(&self) -> Result<String, TokenError>;
}

/// Always returns the same token.
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    /// Create a provider returning `token`.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn token(&self) -> Result<String, TokenError> {
        Ok(self.token.clone())
    }
}

/// OAuth2 client-credentials settings.
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    /// Token endpoint URL.
    pub token_endpoint: String,
    /// Client id.
    pub client_id: String,
    /// Client secret.
    pub client_secret: String,
    /// Scope to request, e.g. `api://prod-gcp.klage.kabal-api/.default`.
    pub scope: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug)]
struct CachedToken {
    token: String,
    refresh_at: Instant,
}

/// Fetches tokens with the client-credentials grant and caches them.
pub struct ClientCredentialsTokenProvider {
    client: Client,
    credentials: ClientCredentials,
    cached: Mutex<Option<CachedToken>>,
}

impl ClientCredentialsTokenProvider {
    /// Create a provider using its own HTTP client.
    #[must_use]
    pub fn new(credentials: ClientCredentials) -> Self {
        Self::with_client(Client::new(), credentials)
    }

    /// Create a provider sharing an existing HTTP client.
    #[must_use]
    pub fn with_client(client: Client, credentials: ClientCredentials) -> Self {
        Self {
            client,
            credentials,
            cached: Mutex::new(None),
        }
    }

    async fn fetch(&self) -> Result<TokenResponse, TokenError> {
        let response = self
            .client
            .post(&self.credentials.token_endpoint)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("scope", self.credentials.scope.as_str()),
            ])
            .send()
            .await
            .map_err(|e| TokenError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(TokenError::Endpoint {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| TokenError::ResponseParseFailed(e.to_string()))
    }
}

#[async_trait]
impl TokenProvider for ClientCredentialsTokenProvider {
    async fn token(&self) -> Result<String, TokenError> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.token.clone());
            }
        }

        let response = self.fetch().await?;
        let lifetime = Duration::from_secs(response.expires_in).saturating_sub(EXPIRY_LEEWAY);
        tracing::debug!(scope = %self.credentials.scope, expires_in = response.expires_in, "Fetched new token");

        *cached = Some(CachedToken {
            token: response.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });
        Ok(response.access_token)
    }
}

impl std::fmt::Debug for ClientCredentialsTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentialsTokenProvider")
            .field("token_endpoint", &self.credentials.token_endpoint)
            .field("client_id", &self.credentials.client_id)
            .field("scope", &self.credentials.scope)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)] // Test code
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn credentials(server: &MockServer) -> ClientCredentials {
        ClientCredentials {
            token_endpoint: format!("{}/token", server.uri()),
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            scope: "api://kabal/.default".to_string(),
        }
    }

    #[tokio::test]
    async fn static_provider_returns_token() {
        let provider = StaticTokenProvider::new("token");
        assert_eq!(provider.token().await.unwrap(), "token");
    }

    #[tokio::test]
    async fn client_credentials_token_is_cached() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "abc",
                "expires_in": 3600,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = ClientCredentialsTokenProvider::new(credentials(&server));

        assert_eq!(provider.token().await.unwrap(), "abc");
        assert_eq!(provider.token().await.unwrap(), "abc");
    }

    #[tokio::test]
    async fn short_lived_token_is_refetched() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "abc",
                "expires_in": 30
            })))
            .expect(2)
            .mount(&server)
            .await;

        let provider = ClientCredentialsTokenProvider::new(credentials(&server));

        provider.token().await.unwrap();
        provider.token().await.unwrap();
    }

    #[tokio::test]
    async fn endpoint_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid_client"))
            .mount(&server)
            .await;

        let provider = ClientCredentialsTokenProvider::new(credentials(&server));

        match provider.token().await {
            Err(TokenError::Endpoint { status, message }) => {
                assert_eq!(status, 401);
                assert_eq!(message, "invalid_client");
            }
            other => panic!("expected endpoint error, got {other:?}"),
        }
    }
}
