//! OpenRouter completion client.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use chatline_core::{
    ClientConfig, CompletionError, CompletionRequest, CompletionResponse, CompletionService,
    CredentialProvider,
};
use secrecy::ExposeSecret;

use super::protocol::{ChatCompletionBody, ErrorBody};

/// [`CompletionService`] backed by the OpenRouter chat completions API.
///
/// The credential is looked up on every call, so a key saved or reset by
/// the user takes effect on the next request.
pub struct OpenRouterClient {
    http: reqwest::Client,
    config: ClientConfig,
    credentials: Arc<dyn CredentialProvider>,
}

impl fmt::Debug for OpenRouterClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenRouterClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl OpenRouterClient {
    /// Create a new client.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(
        config: ClientConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, CompletionError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| CompletionError::request_failed(format!("HTTP client setup failed: {e}")))?;

        Ok(Self {
            http,
            config,
            credentials,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }
}

#[async_trait]
impl CompletionService for OpenRouterClient {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, CompletionError> {
        let Some(api_key) = self.credentials.credential() else {
            tracing::warn!("completion requested without an API key");
            return Err(CompletionError::MissingCredential);
        };

        let url = self.config.completions_url();
        let body = ChatCompletionBody::from_request(&request);

        tracing::debug!(
            model = %request.model,
            messages = request.messages.len(),
            structured = request.response_format.is_some(),
            "sending completion request"
        );

        let mut rb = self
            .http
            .post(&url)
            .bearer_auth(api_key.expose_secret())
            .header("X-Title", &self.config.app_title)
            .json(&body);
        if let Some(referer) = &self.config.referer {
            rb = rb.header("HTTP-Referer", referer);
        }

        let response = rb.send().await.map_err(|e| {
            tracing::error!("Completion request failed: {e}");
            CompletionError::request_failed(format!("Request failed: {e}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            let reason = ErrorBody::reason(&raw)
                .unwrap_or_else(|| format!("Failed to send message (HTTP {status})"));
            tracing::warn!(%status, "completion service rejected request: {reason}");
            return Err(CompletionError::request_failed(reason));
        }

        let parsed: CompletionResponse = response.json().await.map_err(|e| {
            tracing::warn!("Malformed completion response: {e}");
            CompletionError::request_failed(format!("Malformed response: {e}"))
        })?;

        if parsed.choices.is_empty() {
            return Err(CompletionError::request_failed("Response contained no choices"));
        }

        Ok(parsed)
    }
}
