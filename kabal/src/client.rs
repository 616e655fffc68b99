//! Kabal API client implementation

use crate::{
    error::KabalError,
    token::TokenProvider,
    types::{CaseSubmission, SubmitCase},
};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, header};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Path of the case forwarding endpoint, relative to the base URL.
pub const OVERSENDELSE_PATH: &str = "/api/oversendelse/v4/sak";

/// Result of forwarding one case.
///
/// Expected failures (rejections, transport errors, missing tokens) are a
/// [`Failed`](DeliveryOutcome::Failed) value rather than an `Err`.
#[derive(Debug)]
pub enum DeliveryOutcome {
    /// Kabal accepted the case.
    Delivered(StatusCode),
    /// The case was not accepted.
    Failed(KabalError),
}

impl DeliveryOutcome {
    /// Whether the case was accepted.
    #[must_use]
    pub const fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered(_))
    }
}

/// Forwards cases to the appeals body.
///
/// The behov handler depends on this trait rather than on [`KabalClient`] so
/// tests can swap in a recording double.
#[async_trait]
pub trait CaseSubmitter: Send + Sync {
    /// Forward one case. One call performs at most one HTTP request.
    async fn submit(&self, case: SubmitCase) -> DeliveryOutcome;
}

/// Kabal API client
#[derive(Clone)]
pub struct KabalClient {
    client: Client,
    base_url: String,
    token_provider: Arc<dyn TokenProvider>,
}

impl KabalClient {
    /// Create a client with a default HTTP client
    #[must_use]
    pub fn new(base_url: impl Into<String>, token_provider: Arc<dyn TokenProvider>) -> Self {
        Self::with_http_client(Client::new(), base_url, token_provider)
    }

    /// Create a client whose requests time out after `timeout`
    ///
    /// # Errors
    ///
    /// Returns `KabalError::RequestFailed` if the HTTP client cannot be built
    pub fn with_timeout(
        base_url: impl Into<String>,
        token_provider: Arc<dyn TokenProvider>,
        timeout: Duration,
    ) -> Result<Self, KabalError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| KabalError::RequestFailed(e.to_string()))?;
        Ok(Self::with_http_client(client, base_url, token_provider))
    }

    /// Create a client on top of an existing HTTP client
    #[must_use]
    pub fn with_http_client(
        client: Client,
        base_url: impl Into<String>,
        token_provider: Arc<dyn TokenProvider>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token_provider,
        }
    }

    /// Base URL requests are sent to
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send(&self, body: &CaseSubmission) -> Result<StatusCode, KabalError> {
        let token = self.token_provider.token().await?;

        let response = self
            .client
            .post(format!("{}{OVERSENDELSE_PATH}", self.base_url))
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::CONTENT_TYPE, "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| KabalError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(status);
        }

        let body = response.text().await.unwrap_or_default();
        Err(KabalError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl CaseSubmitter for KabalClient {
    async fn submit(&self, case: SubmitCase) -> DeliveryOutcome {
        let behandling_id = case.behandling_id.clone();
        let case_type = case.case_type;
        let body = CaseSubmission::from(case);

        let started = Instant::now();
        let result = self.send(&body).await;
        metrics::histogram!("kabal_request_duration_seconds").record(started.elapsed().as_secs_f64());

        match result {
            Ok(status) => {
                tracing::debug!(
                    behandling_id = %behandling_id,
                    case_type = %case_type,
                    status = status.as_u16(),
                    "Case forwarded to Kabal"
                );
                DeliveryOutcome::Delivered(status)
            }
            Err(e) => {
                tracing::error!(
                    behandling_id = %behandling_id,
                    error = %e,
                    "Call to Kabal failed for klagebehandling {behandling_id}"
                );
                DeliveryOutcome::Failed(e)
            }
        }
    }
}

impl std::fmt::Debug for KabalClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KabalClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::StaticTokenProvider;

    #[test]
    fn test_base_url_is_normalized() {
        let client = KabalClient::new(
            "http://kabal-api/",
            Arc::new(StaticTokenProvider::new("token")),
        );
        assert_eq!(client.base_url(), "http://kabal-api");
    }

    #[test]
    fn test_outcome_is_delivered() {
        assert!(DeliveryOutcome::Delivered(StatusCode::OK).is_delivered());

        let failed = DeliveryOutcome::Failed(KabalError::Rejected {
            status: 400,
            body: String::new(),
        });
        assert!(!failed.is_delivered());
    }
}
