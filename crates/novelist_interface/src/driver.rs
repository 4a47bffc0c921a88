//! Completion driver trait.

use async_trait::async_trait;
use novelist_core::{GenerateRequest, GenerateResponse};
use novelist_error::CompletionError;

/// A single request/response call against an LLM completion endpoint.
///
/// Implementations perform exactly one outbound call per invocation and
/// classify failures through [`CompletionError`]. Retry, backoff and rate
/// limiting are layered on top by the pipeline.
#[async_trait]
pub trait CompletionDriver: Send + Sync {
    /// Generate a completion for the request.
    async fn generate(&self, request: &GenerateRequest)
    -> Result<GenerateResponse, CompletionError>;

    /// Provider name for logging.
    fn provider_name(&self) -> &'static str;

    /// Model used when the request does not name one.
    fn model_name(&self) -> &str;
}
