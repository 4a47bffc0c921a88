//! Generic client for OpenAI-compatible APIs.

use crate::openai_compat::{ChatResponse, conversions};
use async_trait::async_trait;
use novelist_core::{GenerateRequest, GenerateResponse, LlmConfig};
use novelist_error::{CompletionError, CompletionErrorKind};
use novelist_interface::CompletionDriver;
use reqwest::{Client, StatusCode};
use tracing::{debug, error, instrument};

/// Client for any OpenAI-compatible chat completions endpoint.
///
/// Each call to [`generate`](CompletionDriver::generate) performs exactly
/// one HTTP request and classifies failures for the retry layer.
#[derive(Debug, Clone)]
pub struct OpenAICompatibleClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAICompatibleClient {
    /// Creates a client from endpoint settings and an explicit credential.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    #[instrument(skip(api_key, llm), fields(model = %llm.model, url = %llm.base_url))]
    pub fn new(api_key: impl Into<String>, llm: &LlmConfig) -> Result<Self, CompletionError> {
        let client = Client::builder()
            .timeout(llm.request_timeout())
            .build()
            .map_err(|e| {
                CompletionError::new(CompletionErrorKind::Network(format!(
                    "Failed to build HTTP client: {}",
                    e
                )))
            })?;

        debug!("Created OpenAI-compatible client");

        Ok(Self {
            client,
            api_key: api_key.into(),
            model: llm.model.clone(),
            base_url: llm.base_url.clone(),
        })
    }

    /// Creates a client reading the credential from the environment
    /// variable named by `llm.api_key_env`.
    ///
    /// # Errors
    ///
    /// Returns `MissingCredential` if the variable is unset or empty.
    pub fn from_env(llm: &LlmConfig) -> Result<Self, CompletionError> {
        let api_key = std::env::var(&llm.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                CompletionError::new(CompletionErrorKind::MissingCredential(
                    llm.api_key_env.clone(),
                ))
            })?;
        Self::new(api_key, llm)
    }
}

/// Maps a non-success HTTP status to a completion failure.
fn classify_status(status: StatusCode, body: String) -> CompletionErrorKind {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => CompletionErrorKind::Unauthorized(body),
        StatusCode::TOO_MANY_REQUESTS => CompletionErrorKind::RateLimited(body),
        _ => CompletionErrorKind::Http {
            status: status.as_u16(),
            message: body,
        },
    }
}

/// Maps a transport-level reqwest failure to a completion failure.
fn classify_transport(err: &reqwest::Error) -> CompletionErrorKind {
    if err.is_timeout() {
        CompletionErrorKind::Timeout(err.to_string())
    } else if err.is_decode() || err.is_body() {
        CompletionErrorKind::MalformedResponse(err.to_string())
    } else {
        CompletionErrorKind::Network(err.to_string())
    }
}

#[async_trait]
impl CompletionDriver for OpenAICompatibleClient {
    #[instrument(skip(self, request), fields(model = %self.model))]
    async fn generate(
        &self,
        request: &GenerateRequest,
    ) -> Result<GenerateResponse, CompletionError> {
        let chat_request = conversions::to_chat_request(request, &self.model)?;

        debug!(
            message_count = chat_request.messages().len(),
            "Sending request"
        );

        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .json(&chat_request)
            .send()
            .await
            .map_err(|e| {
                error!(error = ?e, "HTTP request failed");
                CompletionError::new(classify_transport(&e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!(status = %status, error = %error_text, "API error");
            return Err(CompletionError::new(classify_status(status, error_text)));
        }

        let chat_response: ChatResponse = response.json().await.map_err(|e| {
            error!(error = ?e, "Failed to parse response");
            CompletionError::new(match classify_transport(&e) {
                CompletionErrorKind::Network(message) => {
                    CompletionErrorKind::MalformedResponse(message)
                }
                other => other,
            })
        })?;

        debug!(choices = chat_response.choices.len(), "Received response");

        conversions::from_chat_response(&chat_response)
    }

    fn provider_name(&self) -> &'static str {
        "openai-compatible"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use novelist_error::FailureClass;

    #[test]
    fn test_status_classification() {
        let kind = classify_status(StatusCode::UNAUTHORIZED, "bad key".into());
        assert_eq!(kind.failure_class(), FailureClass::Fatal);

        let kind = classify_status(StatusCode::TOO_MANY_REQUESTS, "slow down".into());
        assert_eq!(kind.failure_class(), FailureClass::Transient);

        let kind = classify_status(StatusCode::BAD_GATEWAY, String::new());
        assert_eq!(kind.failure_class(), FailureClass::Transient);

        let kind = classify_status(StatusCode::NOT_FOUND, "no such model".into());
        assert_eq!(kind.failure_class(), FailureClass::Fatal);
    }

    #[test]
    fn test_missing_credential() {
        let llm = LlmConfig {
            api_key_env: "NOVELIST_TEST_KEY_THAT_IS_NEVER_SET".into(),
            ..LlmConfig::default()
        };
        let err = OpenAICompatibleClient::from_env(&llm).unwrap_err();
        assert!(matches!(err.kind, CompletionErrorKind::MissingCredential(_)));
    }
}
