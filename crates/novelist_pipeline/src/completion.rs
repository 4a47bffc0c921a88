//! Completion client shared by every pipeline stage.

use novelist_core::{CompletionOptions, GenerateRequest, NovelistConfig, RetryConfig};
use novelist_error::{CompletionError, CompletionErrorKind};
use novelist_interface::CompletionDriver;
use novelist_rate_limit::{RateLimiter, retry_with_backoff};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

/// Prompt in, text out, with rate limiting and retries.
///
/// Wraps a [`CompletionDriver`] so that every call is bounded in prompt
/// length, waits for the rate limiter before each attempt, retries transient
/// failures through the shared backoff utility, and stops when the run is
/// cancelled. Cloning is cheap; clones share the driver, limiter and token.
#[derive(Clone)]
pub struct CompletionClient {
    driver: Arc<dyn CompletionDriver>,
    limiter: RateLimiter,
    retry: RetryConfig,
    max_prompt_chars: usize,
    defaults: CompletionOptions,
    token: CancellationToken,
}

impl std::fmt::Debug for CompletionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionClient")
            .field("provider", &self.driver.provider_name())
            .field("model", &self.driver.model_name())
            .field("limiter", &self.limiter)
            .field("retry", &self.retry)
            .field("max_prompt_chars", &self.max_prompt_chars)
            .finish()
    }
}

impl CompletionClient {
    /// Client configured from the run configuration.
    pub fn new(
        driver: Arc<dyn CompletionDriver>,
        config: &NovelistConfig,
        token: CancellationToken,
    ) -> Self {
        let defaults = CompletionOptions {
            model: Some(config.llm.model.clone()),
            max_tokens: Some(config.llm.max_output_tokens),
            temperature: Some(config.llm.temperature),
            system: None,
        };
        Self {
            driver,
            limiter: RateLimiter::new(&config.rate_limit),
            retry: config.retry.clone(),
            max_prompt_chars: config.llm.max_prompt_chars,
            defaults,
            token,
        }
    }

    /// Sends `system` as the system prompt of every call.
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        let system = system.into();
        self.defaults.system = (!system.trim().is_empty()).then_some(system);
        self
    }

    /// Default options with the given temperature.
    pub fn options(&self, temperature: f32) -> CompletionOptions {
        self.defaults.clone().with_temperature(temperature)
    }

    /// Model that calls are sent to.
    pub fn model_name(&self) -> &str {
        self.defaults
            .model
            .as_deref()
            .unwrap_or_else(|| self.driver.model_name())
    }

    /// Cancellation token observed by every call.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Generates text for `prompt`.
    ///
    /// # Errors
    ///
    /// - `PromptTooLong` when the prompt exceeds the configured bound
    /// - `RetriesExhausted` when every attempt failed transiently
    /// - `Cancelled` when the run was cancelled
    /// - any fatal driver error, unchanged
    #[instrument(skip(self, prompt, options), fields(prompt_chars = tracing::field::Empty))]
    pub async fn complete(
        &self,
        label: &str,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<String, CompletionError> {
        let len = prompt.chars().count();
        tracing::Span::current().record("prompt_chars", len);
        if len > self.max_prompt_chars {
            return Err(CompletionError::new(CompletionErrorKind::PromptTooLong {
                len,
                max: self.max_prompt_chars,
            }));
        }

        let request = GenerateRequest::from_prompt(prompt, options);
        let response = retry_with_backoff(label, &self.retry, &self.token, || {
            let request = &request;
            async move {
                let _permit = self.limiter.acquire().await?;
                self.driver.generate(request).await
            }
        })
        .await?;

        if let Some(usage) = response.usage {
            debug!(
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                "Completion finished"
            );
        }
        Ok(response.text)
    }
}
